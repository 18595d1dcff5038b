//! Source aggregation for one anime episode.
//!
//! Collects HLS candidates, optional WebTorrent candidates and a static embed
//! fallback into one list. Loads never fail outward: a failed transport leaves
//! its list empty and records a display message instead.
//!
//! Every load takes a request token from a monotonic counter. When a response
//! arrives after a newer load for the same list has started, it is dropped, so
//! the last selection always wins.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::config::TransportConfig;
use crate::models::{SourceKind, VideoSource};
use crate::stream::StreamProvider;

pub const HLS_ERROR: &str = "Failed to load streaming sources";
pub const TORRENT_ERROR: &str = "Failed to load torrent sources";
const EMBED_FALLBACK_URL: &str = "https://www.youtube.com/watch?v=VQGCKyvzIM4";

pub fn embed_fallback() -> Vec<VideoSource> {
    vec![VideoSource::new(SourceKind::Embed, EMBED_FALLBACK_URL)
        .with_quality("1080p")
        .with_label("YouTube")]
}

pub fn torrent_query(title: &str, episode: &str) -> String {
    format!("{} Episode {}", title, episode)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceSnapshot {
    pub hls: Vec<VideoSource>,
    pub torrent: Vec<VideoSource>,
    pub embed: Vec<VideoSource>,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl SourceSnapshot {
    /// HLS first, then torrents, then embeds.
    pub fn sources(&self) -> Vec<VideoSource> {
        self.hls
            .iter()
            .chain(&self.torrent)
            .chain(&self.embed)
            .cloned()
            .collect()
    }
}

#[derive(Debug, Default)]
struct Inner {
    snapshot: SourceSnapshot,
    in_flight: u32,
}

pub struct AnimeSources {
    provider: Arc<dyn StreamProvider>,
    transport: TransportConfig,
    state: Mutex<Inner>,
    hls_token: AtomicU64,
    torrent_token: AtomicU64,
}

impl AnimeSources {
    pub fn new(provider: Arc<dyn StreamProvider>, transport: TransportConfig) -> Self {
        Self {
            provider,
            transport,
            state: Mutex::new(Inner::default()),
            hls_token: AtomicU64::new(0),
            torrent_token: AtomicU64::new(0),
        }
    }

    pub async fn snapshot(&self) -> SourceSnapshot {
        self.state.lock().await.snapshot.clone()
    }

    async fn begin(&self) {
        let mut guard = self.state.lock().await;
        guard.in_flight += 1;
        guard.snapshot.is_loading = true;
        guard.snapshot.error = None;
    }

    /// Closes one in-flight load. Returns false when `token` is stale, in
    /// which case the caller must not publish its result.
    fn finish(inner: &mut Inner, current: &AtomicU64, token: u64) -> bool {
        inner.in_flight = inner.in_flight.saturating_sub(1);
        inner.snapshot.is_loading = inner.in_flight > 0;
        current.load(Ordering::SeqCst) == token
    }

    pub async fn fetch_hls_sources(&self, anime_id: &str, episode: &str) {
        let token = self.hls_token.fetch_add(1, Ordering::SeqCst) + 1;
        self.begin().await;

        let result = self.provider.hls_sources(anime_id, episode).await;

        let mut guard = self.state.lock().await;
        if !Self::finish(&mut guard, &self.hls_token, token) {
            debug!(anime_id, episode, token, "Dropping stale HLS response");
            return;
        }
        match result {
            Ok(sources) => guard.snapshot.hls = sources,
            Err(e) => {
                error!("Error fetching HLS sources: {:#}", e);
                guard.snapshot.error = Some(HLS_ERROR.to_string());
                guard.snapshot.hls.clear();
            }
        }
    }

    pub async fn search_torrent_sources(&self, query: &str) {
        let token = self.torrent_token.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.transport.webtorrent_enabled {
            self.state.lock().await.snapshot.torrent.clear();
            return;
        }
        self.begin().await;

        let result = self.provider.search_torrents(query).await;

        let mut guard = self.state.lock().await;
        if !Self::finish(&mut guard, &self.torrent_token, token) {
            debug!(query, token, "Dropping stale torrent response");
            return;
        }
        match result {
            Ok(torrents) => {
                guard.snapshot.torrent = torrents.iter().map(VideoSource::from).collect();
            }
            Err(e) => {
                error!("Error searching torrents: {:#}", e);
                guard.snapshot.error = Some(TORRENT_ERROR.to_string());
                guard.snapshot.torrent.clear();
            }
        }
    }

    /// Load everything for one episode and return the resulting snapshot.
    pub async fn get_all_sources(
        &self,
        anime_id: &str,
        episode: &str,
        title: Option<&str>,
    ) -> SourceSnapshot {
        let torrents = async {
            match title {
                Some(title) if self.transport.webtorrent_enabled => {
                    self.search_torrent_sources(&torrent_query(title, episode))
                        .await
                }
                _ => {
                    // Invalidate any torrent search still in flight.
                    self.torrent_token.fetch_add(1, Ordering::SeqCst);
                    self.state.lock().await.snapshot.torrent.clear();
                }
            }
        };
        tokio::join!(self.fetch_hls_sources(anime_id, episode), torrents);

        let mut guard = self.state.lock().await;
        guard.snapshot.embed = embed_fallback();
        guard.snapshot.clone()
    }
}

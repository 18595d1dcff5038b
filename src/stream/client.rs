use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::StreamProvider;
use crate::models::{TorrentSource, VideoSource};

/// Talks to a running server's `/api/stream/*` endpoints.
#[derive(Debug, Clone)]
pub struct HttpStreams {
    client: Client,
    base_url: String,
}

impl HttpStreams {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let user_agent = format!("anistream/{}", env!("CARGO_PKG_VERSION"));
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .user_agent(user_agent)
            .build()
            .context("Failed to build stream HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str, what: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let res = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("{} request failed", what))?;

        let status = res.status();
        let bytes = res
            .bytes()
            .await
            .with_context(|| format!("Failed to read {} body", what))?;
        if !status.is_success() {
            return Err(anyhow!(
                "{} HTTP error (status {}): {}",
                what,
                status,
                String::from_utf8_lossy(&bytes)
            ));
        }
        serde_json::from_slice(&bytes).with_context(|| format!("Failed to parse {} JSON", what))
    }
}

#[async_trait]
impl StreamProvider for HttpStreams {
    async fn hls_sources(&self, anime_id: &str, episode: &str) -> Result<Vec<VideoSource>> {
        #[derive(Deserialize)]
        struct Response {
            sources: Option<Vec<VideoSource>>,
        }

        let path = format!(
            "/api/stream/hls?id={}&episode={}",
            urlencoding::encode(anime_id),
            urlencoding::encode(episode)
        );
        let parsed: Response = self.get_json(&path, "HLS sources").await?;
        Ok(parsed.sources.unwrap_or_default())
    }

    async fn search_torrents(&self, query: &str) -> Result<Vec<TorrentSource>> {
        #[derive(Deserialize)]
        struct Response {
            torrents: Option<Vec<TorrentSource>>,
        }

        let path = format!("/api/stream/torrent?query={}", urlencoding::encode(query));
        let parsed: Response = self.get_json(&path, "Torrent search").await?;
        Ok(parsed.torrents.unwrap_or_default())
    }
}

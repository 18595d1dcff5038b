//! Playback session for one list of sources.
//!
//! The session owns which source is active and where playback stands:
//! `Loading -> Ready | Error`, and `Error -> Loading` on retry or when another
//! source is picked. The embedding UI feeds player callbacks back in; each
//! load is tagged with a token and callbacks for an older token are ignored.

use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::TransportConfig;
use crate::models::{SourceKind, VideoSource};
use crate::stream::proxy::proxy_url;

pub const WEBTORRENT_DISABLED: &str =
    "WebTorrent is disabled in this version. Please select another source.";
pub const WEBTORRENT_UNSUPPORTED: &str =
    "WebTorrent streaming is not supported in this browser. Try another source.";
pub const HLS_UNSUPPORTED: &str = "HLS is not supported in this browser. Try another source.";
pub const PLAYBACK_FAILED: &str = "Failed to play video. Try another source.";
pub const NO_SOURCES: &str = "No video sources available.";

/// Embeds report no readiness of their own; they count as ready after this.
pub const EMBED_READY_DELAY: Duration = Duration::from_secs(2);
pub const PLAYBACK_RATES: [f64; 6] = [0.5, 0.75, 1.0, 1.25, 1.5, 2.0];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "lowercase")]
pub enum PlayerState {
    Loading,
    Ready,
    Error(String),
}

/// What the caller must do to finish a load.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadPlan {
    /// The load already failed; the session is in the error state.
    Fail(String),
    /// Hand `url` to the player and report back via `on_ready` / `on_error`.
    AwaitPlayer { token: u64, url: String },
    /// Call `on_ready(token)` once `delay` has elapsed.
    AwaitDelay { token: u64, url: String, delay: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerFailure {
    Playback,
    HlsUnsupported,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Controls {
    pub playing: bool,
    pub volume: f64,
    pub muted: bool,
    /// Fraction of the media played, 0..=1.
    pub played: f64,
    pub playback_rate: f64,
}

impl Default for Controls {
    fn default() -> Self {
        Self {
            playing: false,
            volume: 0.7,
            muted: false,
            played: 0.0,
            playback_rate: 1.0,
        }
    }
}

/// URL the player should load for `source`, routing referer-locked HLS
/// streams through the proxy at `origin`.
pub fn playback_url(source: &VideoSource, origin: &str) -> String {
    match (source.kind, source.required_referer()) {
        (SourceKind::Hls, Some(referer)) => proxy_url(origin, &source.url, Some(referer)),
        _ => source.url.clone(),
    }
}

/// `M:SS`, or `H:MM:SS` from one hour up.
pub fn format_time(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    let (hh, mm, ss) = (total / 3600, (total % 3600) / 60, total % 60);
    if hh > 0 {
        format!("{}:{:02}:{:02}", hh, mm, ss)
    } else {
        format!("{}:{:02}", mm, ss)
    }
}

#[derive(Debug, Clone)]
pub struct PlaybackSession {
    sources: Vec<VideoSource>,
    active: Option<VideoSource>,
    state: PlayerState,
    token: u64,
    transport: TransportConfig,
    origin: String,
    controls: Controls,
    qualities: Vec<String>,
}

impl PlaybackSession {
    pub fn new(sources: Vec<VideoSource>, transport: TransportConfig, origin: impl Into<String>) -> Self {
        let usable: Vec<VideoSource> = sources
            .iter()
            .filter(|s| s.kind != SourceKind::WebTorrent || transport.webtorrent_enabled)
            .cloned()
            .collect();
        let active = usable
            .iter()
            .find(|s| s.kind != SourceKind::WebTorrent)
            .or_else(|| usable.first())
            .or_else(|| sources.first())
            .cloned();

        Self {
            sources: usable,
            active,
            state: PlayerState::Loading,
            token: 0,
            transport,
            origin: origin.into(),
            controls: Controls::default(),
            qualities: Vec::new(),
        }
    }

    pub fn with_autoplay(mut self, autoplay: bool) -> Self {
        self.controls.playing = autoplay;
        self
    }

    /// Sources offered in the picker.
    pub fn sources(&self) -> &[VideoSource] {
        &self.sources
    }

    pub fn active(&self) -> Option<&VideoSource> {
        self.active.as_ref()
    }

    pub fn state(&self) -> &PlayerState {
        &self.state
    }

    pub fn controls(&self) -> &Controls {
        &self.controls
    }

    pub fn qualities(&self) -> &[String] {
        &self.qualities
    }

    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn is_loading(&self) -> bool {
        self.state == PlayerState::Loading
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            PlayerState::Error(message) => Some(message),
            _ => None,
        }
    }

    /// Seek, volume and rate controls are inert while loading or failed.
    pub fn controls_enabled(&self) -> bool {
        self.state == PlayerState::Ready
    }

    pub fn playback_url(&self) -> Option<String> {
        self.active.as_ref().map(|s| playback_url(s, &self.origin))
    }

    /// Sources other than the active one, for the "try another source" menu.
    pub fn alternatives(&self) -> Vec<&VideoSource> {
        let active_url = self.active.as_ref().map(|s| s.url.as_str());
        self.sources
            .iter()
            .filter(|s| Some(s.url.as_str()) != active_url)
            .collect()
    }

    /// Begin loading the active source.
    pub fn start(&mut self) -> LoadPlan {
        self.token += 1;
        self.state = PlayerState::Loading;
        self.qualities.clear();

        let Some(source) = self.active.clone() else {
            return self.fail(NO_SOURCES);
        };

        if source.kind == SourceKind::WebTorrent && !self.transport.webtorrent_enabled {
            return self.fail(WEBTORRENT_DISABLED);
        }

        let url = playback_url(&source, &self.origin);
        debug!(token = self.token, kind = source.kind.as_str(), %url, "Loading source");
        match source.kind {
            SourceKind::Embed => LoadPlan::AwaitDelay {
                token: self.token,
                url,
                delay: EMBED_READY_DELAY,
            },
            SourceKind::Hls | SourceKind::WebTorrent => LoadPlan::AwaitPlayer {
                token: self.token,
                url,
            },
        }
    }

    fn fail(&mut self, message: &str) -> LoadPlan {
        self.state = PlayerState::Error(message.to_string());
        LoadPlan::Fail(message.to_string())
    }

    /// Switch to `source` and start loading it. Playback restarts from zero.
    pub fn select_source(&mut self, source: VideoSource) -> LoadPlan {
        self.active = Some(source);
        self.controls.played = 0.0;
        self.controls.playing = true;
        self.start()
    }

    /// Leave the error state by loading the active source again.
    pub fn retry(&mut self) -> Option<LoadPlan> {
        match self.state {
            PlayerState::Error(_) => Some(self.start()),
            _ => None,
        }
    }

    fn is_current(&self, token: u64, event: &str) -> bool {
        if token != self.token || self.state != PlayerState::Loading {
            debug!(token, current = self.token, event, "Ignoring stale player event");
            return false;
        }
        true
    }

    pub fn on_ready(&mut self, token: u64) -> bool {
        if !self.is_current(token, "ready") {
            return false;
        }
        self.state = PlayerState::Ready;
        true
    }

    /// HLS manifest parsed: record the advertised rendition heights and go ready.
    pub fn on_manifest_parsed(&mut self, token: u64, heights: &[u32]) -> bool {
        if !self.is_current(token, "manifest") {
            return false;
        }
        self.qualities = heights.iter().map(|h| format!("{}p", h)).collect();
        self.state = PlayerState::Ready;
        true
    }

    pub fn on_error(&mut self, token: u64, failure: PlayerFailure) -> bool {
        if !self.is_current(token, "error") {
            return false;
        }
        let message = match (self.active.as_ref().map(|s| s.kind), failure) {
            (Some(SourceKind::WebTorrent), _) => WEBTORRENT_UNSUPPORTED,
            (Some(SourceKind::Hls), PlayerFailure::HlsUnsupported) => HLS_UNSUPPORTED,
            _ => PLAYBACK_FAILED,
        };
        warn!("Player error on token {}: {}", token, message);
        self.state = PlayerState::Error(message.to_string());
        true
    }

    pub fn toggle_play(&mut self) {
        self.controls.playing = !self.controls.playing;
    }

    pub fn toggle_mute(&mut self) {
        self.controls.muted = !self.controls.muted;
    }

    pub fn set_volume(&mut self, volume: f64) {
        let volume = volume.clamp(0.0, 1.0);
        self.controls.volume = volume;
        if volume > 0.0 && self.controls.muted {
            self.controls.muted = false;
        }
    }

    pub fn seek(&mut self, fraction: f64) {
        self.controls.played = fraction.clamp(0.0, 1.0);
    }

    pub fn on_progress(&mut self, played: f64) {
        self.controls.played = played.clamp(0.0, 1.0);
    }

    pub fn on_ended(&mut self) {
        self.controls.playing = false;
    }

    /// Returns false for rates outside [`PLAYBACK_RATES`].
    pub fn set_playback_rate(&mut self, rate: f64) -> bool {
        if !PLAYBACK_RATES.contains(&rate) {
            return false;
        }
        self.controls.playback_rate = rate;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGIN: &str = "http://localhost:3000";

    fn hls(url: &str) -> VideoSource {
        VideoSource::new(SourceKind::Hls, url).with_quality("720p")
    }

    fn torrent(url: &str) -> VideoSource {
        VideoSource::new(SourceKind::WebTorrent, url)
    }

    fn embed(url: &str) -> VideoSource {
        VideoSource::new(SourceKind::Embed, url).with_label("YouTube")
    }

    fn disabled() -> TransportConfig {
        TransportConfig::default()
    }

    fn token_of(plan: &LoadPlan) -> u64 {
        match plan {
            LoadPlan::AwaitPlayer { token, .. } | LoadPlan::AwaitDelay { token, .. } => *token,
            LoadPlan::Fail(m) => panic!("unexpected failure: {}", m),
        }
    }

    #[test]
    fn initial_source_skips_torrents() {
        let session = PlaybackSession::new(
            vec![torrent("magnet:?xt=urn:btih:a"), hls("https://a/1.m3u8")],
            TransportConfig {
                webtorrent_enabled: true,
            },
            ORIGIN,
        );
        assert_eq!(session.active().unwrap().url, "https://a/1.m3u8");
        assert_eq!(session.sources().len(), 2);
    }

    #[test]
    fn disabled_torrents_are_filtered_from_picker() {
        let session = PlaybackSession::new(
            vec![torrent("magnet:?xt=urn:btih:a"), embed("https://yt/1")],
            disabled(),
            ORIGIN,
        );
        assert_eq!(session.sources(), &[embed("https://yt/1")]);
    }

    #[test]
    fn only_torrents_when_disabled_fails_immediately() {
        let mut session =
            PlaybackSession::new(vec![torrent("magnet:?xt=urn:btih:a")], disabled(), ORIGIN);
        assert_eq!(session.active().unwrap().kind, SourceKind::WebTorrent);
        assert_eq!(session.start(), LoadPlan::Fail(WEBTORRENT_DISABLED.to_string()));
        assert_eq!(session.error(), Some(WEBTORRENT_DISABLED));
    }

    #[test]
    fn selecting_disabled_torrent_enters_error_state() {
        let mut session = PlaybackSession::new(vec![hls("https://a/1.m3u8")], disabled(), ORIGIN);
        session.start();
        let plan = session.select_source(torrent("magnet:?xt=urn:btih:b"));
        assert!(matches!(plan, LoadPlan::Fail(_)));
        assert_eq!(session.state(), &PlayerState::Error(WEBTORRENT_DISABLED.into()));
    }

    #[test]
    fn empty_source_list_reports_error() {
        let mut session = PlaybackSession::new(Vec::new(), disabled(), ORIGIN);
        assert!(session.active().is_none());
        assert_eq!(session.start(), LoadPlan::Fail(NO_SOURCES.to_string()));
    }

    #[test]
    fn embed_waits_for_fixed_delay() {
        let mut session = PlaybackSession::new(vec![embed("https://yt/1")], disabled(), ORIGIN);
        match session.start() {
            LoadPlan::AwaitDelay { token, delay, url } => {
                assert_eq!(delay, EMBED_READY_DELAY);
                assert_eq!(url, "https://yt/1");
                assert!(session.is_loading());
                assert!(session.on_ready(token));
            }
            other => panic!("unexpected plan {:?}", other),
        }
        assert_eq!(session.state(), &PlayerState::Ready);
        assert!(session.controls_enabled());
    }

    #[test]
    fn last_selected_source_wins() {
        let mut session = PlaybackSession::new(
            vec![hls("https://a/1.m3u8"), hls("https://b/2.m3u8")],
            disabled(),
            ORIGIN,
        );
        let first = token_of(&session.start());
        let second = token_of(&session.select_source(hls("https://b/2.m3u8")));

        // The newer load resolves first, then the older one reports an error.
        assert!(session.on_ready(second));
        assert!(!session.on_error(first, PlayerFailure::Playback));
        assert_eq!(session.state(), &PlayerState::Ready);
        assert_eq!(session.active().unwrap().url, "https://b/2.m3u8");

        // And the other way round: the stale ready does not mask a fresh error.
        let third = token_of(&session.select_source(hls("https://a/1.m3u8")));
        assert!(!session.on_ready(second));
        assert!(session.is_loading());
        assert!(session.on_error(third, PlayerFailure::Playback));
        assert_eq!(session.error(), Some(PLAYBACK_FAILED));
        assert_eq!(session.active().unwrap().url, "https://a/1.m3u8");
    }

    #[test]
    fn error_transitions_back_to_loading_on_retry() {
        let mut session = PlaybackSession::new(vec![hls("https://a/1.m3u8")], disabled(), ORIGIN);
        let token = token_of(&session.start());
        assert!(session.retry().is_none());
        session.on_error(token, PlayerFailure::HlsUnsupported);
        assert_eq!(session.error(), Some(HLS_UNSUPPORTED));
        assert!(!session.controls_enabled());

        let plan = session.retry().expect("retry from error");
        assert!(token_of(&plan) > token);
        assert!(session.is_loading());
    }

    #[test]
    fn ready_is_terminal_until_user_action() {
        let mut session = PlaybackSession::new(vec![hls("https://a/1.m3u8")], disabled(), ORIGIN);
        let token = token_of(&session.start());
        assert!(session.on_manifest_parsed(token, &[1080, 720]));
        assert_eq!(session.qualities(), &["1080p".to_string(), "720p".to_string()]);
        assert!(!session.on_error(token, PlayerFailure::Playback));
        assert_eq!(session.state(), &PlayerState::Ready);
    }

    #[test]
    fn alternatives_exclude_active_url() {
        let session = PlaybackSession::new(
            vec![hls("https://a/1.m3u8"), embed("https://yt/1"), embed("https://yt/2")],
            disabled(),
            ORIGIN,
        );
        let urls: Vec<_> = session.alternatives().iter().map(|s| s.url.clone()).collect();
        assert_eq!(urls, vec!["https://yt/1", "https://yt/2"]);
    }

    #[test]
    fn referer_locked_hls_goes_through_proxy() {
        let locked = hls("https://cdn/x/index.m3u8").with_referer("https://example.com");
        assert_eq!(
            playback_url(&locked, ORIGIN),
            "http://localhost:3000/api/stream/proxy?url=https%3A%2F%2Fcdn%2Fx%2Findex.m3u8&referer=https%3A%2F%2Fexample.com"
        );
        assert_eq!(playback_url(&hls("https://cdn/y.m3u8"), ORIGIN), "https://cdn/y.m3u8");
        let embed_with_referer = embed("https://yt/1").with_referer("https://example.com");
        assert_eq!(playback_url(&embed_with_referer, ORIGIN), "https://yt/1");
    }

    #[test]
    fn source_change_resets_progress_and_plays() {
        let mut session = PlaybackSession::new(vec![hls("https://a/1.m3u8")], disabled(), ORIGIN);
        session.start();
        session.seek(0.4);
        session.select_source(embed("https://yt/1"));
        assert_eq!(session.controls().played, 0.0);
        assert!(session.controls().playing);
    }

    #[test]
    fn volume_clamps_and_unmutes() {
        let mut session = PlaybackSession::new(vec![], disabled(), ORIGIN);
        session.toggle_mute();
        assert!(session.controls().muted);
        session.set_volume(1.7);
        assert_eq!(session.controls().volume, 1.0);
        assert!(!session.controls().muted);
        session.toggle_mute();
        session.set_volume(0.0);
        assert!(session.controls().muted);
    }

    #[test]
    fn play_progress_and_end() {
        let mut session =
            PlaybackSession::new(vec![hls("https://a/1.m3u8")], disabled(), ORIGIN).with_autoplay(true);
        assert!(session.controls().playing);

        session.toggle_play();
        assert!(!session.controls().playing);
        session.toggle_play();

        session.on_progress(0.25);
        assert_eq!(session.controls().played, 0.25);
        session.on_progress(1.4);
        assert_eq!(session.controls().played, 1.0);

        session.on_ended();
        assert!(!session.controls().playing);
        assert!(!PlaybackSession::new(vec![], disabled(), ORIGIN).controls().playing);
    }

    #[test]
    fn playback_rate_is_restricted() {
        let mut session = PlaybackSession::new(vec![], disabled(), ORIGIN);
        assert!(session.set_playback_rate(1.5));
        assert!(!session.set_playback_rate(3.0));
        assert_eq!(session.controls().playback_rate, 1.5);
    }

    #[test]
    fn formats_time() {
        assert_eq!(format_time(0.0), "0:00");
        assert_eq!(format_time(65.9), "1:05");
        assert_eq!(format_time(3725.0), "1:02:05");
        assert_eq!(format_time(f64::NAN), "0:00");
    }
}

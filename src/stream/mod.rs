use anyhow::Result;
use async_trait::async_trait;
use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::app::AppState;
use crate::error::ApiError;
use crate::models::{SourceKind, TorrentSource, VideoSource};

mod client;
pub mod playlist;
pub mod proxy;

pub use client::HttpStreams;

const SAMPLE_REFERER: &str = "https://example.com";
const SAMPLE_TRACKERS: &str = "&tr=udp%3A%2F%2Fexplodie.org%3A6969&tr=udp%3A%2F%2Ftracker.coppersurfer.tk%3A6969&tr=udp%3A%2F%2Ftracker.empire-js.us%3A1337&tr=udp%3A%2F%2Ftracker.leechers-paradise.org%3A6969&tr=udp%3A%2F%2Ftracker.opentrackr.org%3A1337&tr=wss%3A%2F%2Ftracker.btorrent.xyz&tr=wss%3A%2F%2Ftracker.fastcast.nz&tr=wss%3A%2F%2Ftracker.openwebtorrent.com&ws=https%3A%2F%2Fwebtorrent.io%2Ftorrents%2F";

/// Where stream candidates come from: the placeholder data in-process, or the
/// `/api/stream/*` endpoints over HTTP.
#[async_trait]
pub trait StreamProvider: Send + Sync {
    async fn hls_sources(&self, anime_id: &str, episode: &str) -> Result<Vec<VideoSource>>;
    async fn search_torrents(&self, query: &str) -> Result<Vec<TorrentSource>>;
}

/// Fixed sample sources, returned regardless of the requested title.
#[derive(Debug, Clone, Default)]
pub struct SampleStreams;

#[async_trait]
impl StreamProvider for SampleStreams {
    async fn hls_sources(&self, anime_id: &str, episode: &str) -> Result<Vec<VideoSource>> {
        debug!(anime_id, episode, "Serving sample HLS sources");
        let samples = [
            (
                "1080p",
                "https://demo.unified-streaming.com/k8s/features/stable/video/tears-of-steel/tears-of-steel.ism/.m3u8",
                "Server 1",
            ),
            (
                "720p",
                "https://bitdash-a.akamaihd.net/content/sintel/hls/playlist.m3u8",
                "Server 2",
            ),
            (
                "480p",
                "https://test-streams.mux.dev/x36xhzz/x36xhzz.m3u8",
                "Server 3",
            ),
        ];
        Ok(samples
            .into_iter()
            .map(|(quality, url, server)| {
                let mut source = VideoSource::new(SourceKind::Hls, url).with_quality(quality);
                source.server = Some(server.to_string());
                source.headers = Some(HashMap::from([(
                    "Referer".to_string(),
                    SAMPLE_REFERER.to_string(),
                )]));
                source
            })
            .collect())
    }

    async fn search_torrents(&self, query: &str) -> Result<Vec<TorrentSource>> {
        let samples = [
            ("1080p", "1.2 GB", 120, 30, "dd8255ecdc7ca55fb0bbf81323d87062db1f6d1c", "Big+Buck+Bunny", "big-buck-bunny"),
            ("720p", "700 MB", 200, 45, "08ada5a7a6183aae1e09d831df6748d566095a10", "Sintel", "sintel"),
            ("480p", "350 MB", 80, 20, "209c8226b299b308beaf2b9cd3fb49212dbd13ec", "Tears+of+Steel", "tears-of-steel"),
        ];
        Ok(samples
            .into_iter()
            .map(|(quality, size, seeds, peers, hash, name, file)| TorrentSource {
                title: format!("{} [{}]", query, quality),
                kind: SourceKind::WebTorrent,
                quality: quality.to_string(),
                size: size.to_string(),
                seeds,
                peers,
                url: format!(
                    "magnet:?xt=urn:btih:{hash}&dn={name}{SAMPLE_TRACKERS}&xs=https%3A%2F%2Fwebtorrent.io%2Ftorrents%2F{file}.torrent"
                ),
                date: "2023-12-01".to_string(),
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
pub struct HlsQuery {
    id: Option<String>,
    episode: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TorrentQuery {
    query: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// GET /api/stream/hls?id=&episode=
pub async fn hls_sources(
    State(state): State<AppState>,
    Query(params): Query<HlsQuery>,
) -> Result<Json<Value>, ApiError> {
    let (Some(id), Some(episode)) = (non_empty(params.id), non_empty(params.episode)) else {
        return Err(ApiError::bad_request("Missing anime ID or episode number"));
    };

    let sources = state
        .streams
        .hls_sources(&id, &episode)
        .await
        .map_err(|e| ApiError::internal("Failed to fetch anime sources", e))?;
    info!("Returning {} HLS sources for {} episode {}", sources.len(), id, episode);
    Ok(Json(json!({ "sources": sources })))
}

/// GET /api/stream/torrent?query=
pub async fn torrent_sources(
    State(state): State<AppState>,
    Query(params): Query<TorrentQuery>,
) -> Result<Json<Value>, ApiError> {
    let Some(query) = non_empty(params.query) else {
        return Err(ApiError::bad_request("Missing search query"));
    };

    let torrents = state
        .streams
        .search_torrents(&query)
        .await
        .map_err(|e| ApiError::internal("Failed to search torrents", e))?;
    info!("Returning {} torrents for '{}'", torrents.len(), query);
    Ok(Json(json!({ "torrents": torrents })))
}

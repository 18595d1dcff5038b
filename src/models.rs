use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Embed,
    #[serde(rename = "webtorrent")]
    WebTorrent,
    Hls,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Embed => "embed",
            SourceKind::WebTorrent => "webtorrent",
            SourceKind::Hls => "hls",
        }
    }
}

/// A playable candidate produced by one of the stream endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoSource {
    #[serde(rename = "type")]
    pub kind: SourceKind,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
}

impl VideoSource {
    pub fn new(kind: SourceKind, url: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
            quality: None,
            label: None,
            server: None,
            referer: None,
            headers: None,
        }
    }

    pub fn with_quality(mut self, quality: impl Into<String>) -> Self {
        self.quality = Some(quality.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    /// Menu text for source pickers, e.g. `YouTube (1080p)`.
    pub fn display_name(&self) -> String {
        let base = self
            .label
            .clone()
            .unwrap_or_else(|| self.kind.as_str().to_string());
        match &self.quality {
            Some(q) => format!("{} ({})", base, q),
            None => base,
        }
    }

    /// Referer the upstream requires, taken from `referer` or a `Referer` header entry.
    pub fn required_referer(&self) -> Option<&str> {
        self.referer.as_deref().or_else(|| {
            self.headers.as_ref().and_then(|h| {
                h.iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case("referer"))
                    .map(|(_, v)| v.as_str())
            })
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TorrentSource {
    pub title: String,
    #[serde(rename = "type")]
    pub kind: SourceKind,
    pub quality: String,
    pub size: String,
    pub seeds: u32,
    pub peers: u32,
    pub url: String,
    pub date: String,
}

impl From<&TorrentSource> for VideoSource {
    fn from(t: &TorrentSource) -> Self {
        VideoSource::new(SourceKind::WebTorrent, t.url.clone())
            .with_quality(t.quality.clone())
            .with_label(format!(
                "{} ({} - S:{} P:{})",
                t.quality, t.size, t.seeds, t.peers
            ))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnimeTitle {
    pub english: Option<String>,
    pub romaji: Option<String>,
    pub native: Option<String>,
}

impl AnimeTitle {
    pub fn preferred(&self) -> &str {
        self.english
            .as_deref()
            .or(self.romaji.as_deref())
            .or(self.native.as_deref())
            .unwrap_or_default()
    }

    pub fn matches(&self, needle_lower: &str) -> bool {
        [&self.english, &self.romaji, &self.native]
            .into_iter()
            .flatten()
            .any(|t| t.to_lowercase().contains(needle_lower))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub id: i64,
    pub name: String,
    pub image: Option<String>,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    pub title: AnimeTitle,
    pub description: Option<String>,
    pub cover_image: Option<String>,
    pub banner_image: Option<String>,
    pub episodes: Option<u32>,
    pub duration: Option<u32>,
    pub genres: Vec<String>,
    pub season: Option<String>,
    pub season_year: Option<i32>,
    pub status: Option<String>,
    pub average_score: Option<u32>,
    pub popularity: Option<u32>,
    pub studios: Vec<String>,
    pub characters: Vec<Character>,
}

impl CatalogEntry {
    pub fn summary(&self) -> CatalogSummary {
        CatalogSummary {
            id: self.id.clone(),
            title: self.title.preferred().to_string(),
            cover_image: self.cover_image.clone(),
            episodes: self.episodes,
            genres: self.genres.clone(),
        }
    }

    pub fn has_genre(&self, genre: &str) -> bool {
        self.genres.iter().any(|g| g.eq_ignore_ascii_case(genre))
    }

    /// Clamp an episode number to `[1, episodes]`; unknown counts only clamp the floor.
    pub fn clamp_episode(&self, episode: u32) -> u32 {
        let episode = episode.max(1);
        match self.episodes {
            Some(total) if total > 0 => episode.min(total),
            _ => episode,
        }
    }

    pub fn contains_episode(&self, episode: u32) -> bool {
        episode >= 1 && self.episodes.map(|total| episode <= total).unwrap_or(true)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogSummary {
    pub id: String,
    pub title: String,
    pub cover_image: Option<String>,
    pub episodes: Option<u32>,
    pub genres: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Signed-in state carried in the session cookie.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user: SessionUser,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub anilist_id: Option<String>,
    /// Expiry as unix seconds.
    pub expires: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn source_kind_uses_wire_names() {
        let src = VideoSource::new(SourceKind::WebTorrent, "magnet:?xt=urn:btih:abc");
        let value = serde_json::to_value(&src).unwrap();
        assert_eq!(value, json!({ "type": "webtorrent", "url": "magnet:?xt=urn:btih:abc" }));
    }

    #[test]
    fn torrent_maps_to_labelled_source() {
        let t = TorrentSource {
            title: "Show [720p]".to_string(),
            kind: SourceKind::WebTorrent,
            quality: "720p".to_string(),
            size: "700 MB".to_string(),
            seeds: 200,
            peers: 45,
            url: "magnet:?xt=urn:btih:08ada5".to_string(),
            date: "2023-12-01".to_string(),
        };
        let src = VideoSource::from(&t);
        assert_eq!(src.kind, SourceKind::WebTorrent);
        assert_eq!(src.label.as_deref(), Some("720p (700 MB - S:200 P:45)"));
        assert_eq!(src.quality.as_deref(), Some("720p"));
    }

    #[test]
    fn referer_falls_back_to_header_map() {
        let mut src = VideoSource::new(SourceKind::Hls, "https://cdn/x.m3u8");
        assert!(src.required_referer().is_none());
        src.headers = Some(HashMap::from([(
            "Referer".to_string(),
            "https://example.com".to_string(),
        )]));
        assert_eq!(src.required_referer(), Some("https://example.com"));
    }

    #[test]
    fn episode_clamping() {
        let entry = CatalogEntry {
            id: "1".into(),
            title: AnimeTitle::default(),
            description: None,
            cover_image: None,
            banner_image: None,
            episodes: Some(26),
            duration: None,
            genres: vec![],
            season: None,
            season_year: None,
            status: None,
            average_score: None,
            popularity: None,
            studios: vec![],
            characters: vec![],
        };
        assert_eq!(entry.clamp_episode(0), 1);
        assert_eq!(entry.clamp_episode(27), 26);
        assert!(entry.contains_episode(26));
        assert!(!entry.contains_episode(27));
    }
}

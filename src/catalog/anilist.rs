use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::text::clean_description;
use super::{genre_filter, CatalogApi};
use crate::models::{AnimeTitle, CatalogEntry, CatalogSummary, Character};

pub const ANILIST_ENDPOINT: &str = "https://graphql.anilist.co";

const SUMMARY_QUERY: &str = r#"
query ($search: String, $genre: String, $sort: [MediaSort]) {
  Page(perPage: 24) {
    media(type: ANIME, isAdult: false, search: $search, genre: $genre, sort: $sort) {
      id
      title { romaji english native }
      coverImage { extraLarge large }
      episodes
      genres
    }
  }
}
"#;

const DETAIL_QUERY: &str = r#"
query ($id: Int!) {
  Media(id: $id, type: ANIME) {
    id
    title { romaji english native }
    description(asHtml: false)
    coverImage { extraLarge large }
    bannerImage
    episodes
    duration
    genres
    season
    seasonYear
    status
    averageScore
    popularity
    studios(isMain: true) { nodes { name } }
    characters(perPage: 10, sort: [ROLE]) {
      edges { role node { id name { full } image { large } } }
    }
  }
}
"#;

/// Catalog backed by the AniList GraphQL API.
#[derive(Debug, Clone)]
pub struct AniListCatalog {
    client: Client,
    endpoint: String,
}

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
    status: Option<i32>,
}

impl AniListCatalog {
    pub fn new() -> Result<Self> {
        Self::with_endpoint(ANILIST_ENDPOINT)
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Result<Self> {
        let user_agent = format!("anistream/{}", env!("CARGO_PKG_VERSION"));
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .user_agent(user_agent)
            .build()
            .context("Failed to build AniList HTTP client")?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    async fn query<T: DeserializeOwned>(&self, query: &str, variables: Value, what: &str) -> Result<T> {
        let body = json!({ "query": query, "variables": variables });
        let res = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("AniList {} request failed", what))?;

        let status = res.status();
        let bytes = res
            .bytes()
            .await
            .with_context(|| format!("Failed to read AniList {} body", what))?;
        if !status.is_success() && status != reqwest::StatusCode::NOT_FOUND {
            return Err(anyhow!(
                "AniList {} HTTP error (status {}): {}",
                what,
                status,
                String::from_utf8_lossy(&bytes)
            ));
        }

        let parsed: GraphQlResponse<T> = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse AniList {} JSON", what))?;
        if let Some(errors) = parsed.errors.filter(|e| !e.is_empty()) {
            let msg = errors
                .into_iter()
                .map(|e| match e.status {
                    Some(s) => format!("{} (status {})", e.message, s),
                    None => e.message,
                })
                .collect::<Vec<_>>()
                .join("; ");
            return Err(anyhow!("AniList {} GraphQL error: {}", what, msg));
        }
        parsed
            .data
            .ok_or_else(|| anyhow!("AniList {} returned no data", what))
    }

    async fn page(&self, variables: Value, what: &str) -> Result<Vec<CatalogSummary>> {
        #[derive(Deserialize)]
        struct Data {
            #[serde(rename = "Page")]
            page: Option<Page>,
        }

        #[derive(Deserialize)]
        struct Page {
            media: Option<Vec<Media>>,
        }

        let data: Data = self.query(SUMMARY_QUERY, variables, what).await?;
        let media = data.page.and_then(|p| p.media).unwrap_or_default();
        debug!("AniList {} returned {} entries", what, media.len());
        Ok(media.into_iter().map(|m| map_media(m).summary()).collect())
    }
}

#[async_trait]
impl CatalogApi for AniListCatalog {
    async fn list(&self, genre: Option<&str>) -> Result<Vec<CatalogSummary>> {
        let variables = json!({ "genre": genre_filter(genre), "sort": ["POPULARITY_DESC"] });
        self.page(variables, "list").await
    }

    async fn search(&self, query: &str) -> Result<Vec<CatalogSummary>> {
        let query = query.trim();
        if query.is_empty() {
            return self.list(None).await;
        }
        let variables = json!({ "search": query, "sort": ["SEARCH_MATCH"] });
        self.page(variables, "search").await
    }

    async fn get(&self, id: &str) -> Result<Option<CatalogEntry>> {
        #[derive(Deserialize)]
        struct Data {
            #[serde(rename = "Media")]
            media: Option<Media>,
        }

        let Ok(numeric_id) = id.parse::<i64>() else {
            return Ok(None);
        };
        // Unknown ids come back as a 404 GraphQL error.
        match self
            .query::<Data>(DETAIL_QUERY, json!({ "id": numeric_id }), "media")
            .await
        {
            Ok(data) => Ok(data.media.map(map_media)),
            Err(e) if e.to_string().contains("(status 404)") => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn featured(&self) -> Result<CatalogEntry> {
        let top = self
            .trending()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("AniList returned no trending anime"))?;
        self.get(&top.id)
            .await?
            .ok_or_else(|| anyhow!("AniList has no media for trending id {}", top.id))
    }

    async fn trending(&self) -> Result<Vec<CatalogSummary>> {
        self.page(json!({ "sort": ["TRENDING_DESC"] }), "trending")
            .await
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Media {
    id: i64,
    title: Option<MediaTitle>,
    description: Option<String>,
    cover_image: Option<CoverImage>,
    banner_image: Option<String>,
    episodes: Option<u32>,
    duration: Option<u32>,
    genres: Option<Vec<String>>,
    season: Option<String>,
    season_year: Option<i32>,
    status: Option<String>,
    average_score: Option<u32>,
    popularity: Option<u32>,
    studios: Option<StudioConnection>,
    characters: Option<CharacterConnection>,
}

#[derive(Debug, Default, Deserialize)]
struct MediaTitle {
    romaji: Option<String>,
    english: Option<String>,
    native: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoverImage {
    extra_large: Option<String>,
    large: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StudioConnection {
    nodes: Option<Vec<Studio>>,
}

#[derive(Debug, Deserialize)]
struct Studio {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CharacterConnection {
    edges: Option<Vec<CharacterEdge>>,
}

#[derive(Debug, Deserialize)]
struct CharacterEdge {
    role: Option<String>,
    node: Option<CharacterNode>,
}

#[derive(Debug, Deserialize)]
struct CharacterNode {
    id: i64,
    name: Option<Name>,
    image: Option<Image>,
}

#[derive(Debug, Deserialize)]
struct Name {
    full: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Image {
    large: Option<String>,
}

fn map_media(media: Media) -> CatalogEntry {
    let title = media.title.unwrap_or_default();
    let characters = media
        .characters
        .and_then(|c| c.edges)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|edge| {
            let node = edge.node?;
            Some(Character {
                id: node.id,
                name: node.name.and_then(|n| n.full)?,
                image: node.image.and_then(|i| i.large),
                role: edge.role.unwrap_or_else(|| "SUPPORTING".to_string()),
            })
        })
        .collect();
    let studios = media
        .studios
        .and_then(|s| s.nodes)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|s| s.name)
        .collect();

    CatalogEntry {
        id: media.id.to_string(),
        title: AnimeTitle {
            english: title.english,
            romaji: title.romaji,
            native: title.native,
        },
        description: media
            .description
            .as_deref()
            .map(clean_description)
            .filter(|d| !d.is_empty()),
        cover_image: media.cover_image.and_then(|c| c.extra_large.or(c.large)),
        banner_image: media.banner_image,
        episodes: media.episodes,
        duration: media.duration,
        genres: media.genres.unwrap_or_default(),
        season: media.season,
        season_year: media.season_year,
        status: media.status,
        average_score: media.average_score,
        popularity: media.popularity,
        studios,
        characters,
    }
}

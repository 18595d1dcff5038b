use anyhow::Result;
use async_trait::async_trait;

use crate::models::{CatalogEntry, CatalogSummary};

mod anilist;
mod sample;
mod text;

pub use anilist::AniListCatalog;
pub use sample::StaticCatalog;

/// Genre filters offered on the browse page. "All" disables filtering.
pub const CATEGORIES: [&str; 10] = [
    "All",
    "Action",
    "Adventure",
    "Comedy",
    "Drama",
    "Fantasy",
    "Horror",
    "Romance",
    "Sci-Fi",
    "Slice of Life",
];


#[async_trait]
pub trait CatalogApi: Send + Sync {
    /// Browse list, optionally restricted to one genre.
    async fn list(&self, genre: Option<&str>) -> Result<Vec<CatalogSummary>>;
    /// Case-insensitive title search.
    async fn search(&self, query: &str) -> Result<Vec<CatalogSummary>>;
    async fn get(&self, id: &str) -> Result<Option<CatalogEntry>>;
    async fn featured(&self) -> Result<CatalogEntry>;
    async fn trending(&self) -> Result<Vec<CatalogSummary>>;
}

/// `None` for an absent or "All" category.
pub fn genre_filter(genre: Option<&str>) -> Option<&str> {
    genre
        .map(str::trim)
        .filter(|g| !g.is_empty() && !g.eq_ignore_ascii_case("all"))
}

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;

use super::{genre_filter, CatalogApi};
use crate::models::{AnimeTitle, CatalogEntry, CatalogSummary, Character};

const COVER_BASE: &str = "https://s4.anilist.co/file/anilistcdn/media/anime/cover/large";
const FEATURED_ID: &str = "101922";
const TRENDING_IDS: [&str; 4] = ["113415", "110277", "100166", "21"];

static FEATURED: Lazy<CatalogEntry> = Lazy::new(|| CatalogEntry {
    id: FEATURED_ID.to_string(),
    title: AnimeTitle {
        english: Some("Demon Slayer: Kimetsu no Yaiba".to_string()),
        romaji: Some("Kimetsu no Yaiba".to_string()),
        native: Some("鬼滅の刃".to_string()),
    },
    description: Some(
        "Ever since the death of his father, the burden of supporting the family has fallen upon \
         Tanjirou Kamado's shoulders. Though living impoverished on a remote mountain, the Kamado \
         family are able to enjoy a relatively peaceful and happy life. One day, Tanjirou decides \
         to go down to the local village to make a little money selling charcoal. On his way back, \
         night falls, forcing Tanjirou to take shelter in the house of a strange man, who warns \
         him of the existence of flesh-eating demons that lurk in the woods at night. When he \
         finally arrives back home the next day, he is met with a horrifying sight: his whole \
         family has been slaughtered. Worse still, the sole survivor is his sister Nezuko, who \
         has been turned into a bloodthirsty demon. Consumed by rage and hatred, Tanjirou swears \
         to avenge his family and stay by his only remaining sibling. Alongside the mysterious \
         group calling themselves the Demon Slayer Corps, Tanjirou will do whatever it takes to \
         slay the demons and protect the remnants of his beloved sister's humanity."
            .to_string(),
    ),
    cover_image: Some(format!("{}/bx101922-PEn1CTc93blC.jpg", COVER_BASE)),
    banner_image: Some(
        "https://s4.anilist.co/file/anilistcdn/media/anime/banner/101922-YfZhKBUDDS6L.jpg"
            .to_string(),
    ),
    episodes: Some(26),
    duration: Some(24),
    genres: strings(&["Action", "Adventure", "Drama", "Fantasy", "Supernatural"]),
    season: Some("Spring".to_string()),
    season_year: Some(2019),
    status: Some("FINISHED".to_string()),
    average_score: Some(84),
    popularity: Some(250_000),
    studios: strings(&["ufotable"]),
    characters: vec![
        Character {
            id: 126071,
            name: "Tanjirou Kamado".to_string(),
            image: Some(
                "https://s4.anilist.co/file/anilistcdn/character/large/b126071-BpbEkRyuiPdS.jpg"
                    .to_string(),
            ),
            role: "MAIN".to_string(),
        },
        Character {
            id: 127518,
            name: "Nezuko Kamado".to_string(),
            image: Some(
                "https://s4.anilist.co/file/anilistcdn/character/large/b127518-NRlq5ld0JDG0.png"
                    .to_string(),
            ),
            role: "MAIN".to_string(),
        },
    ],
});

static ENTRIES: Lazy<Vec<CatalogEntry>> = Lazy::new(|| {
    let listed: [(&str, &str, &str, u32, &[&str]); 11] = [
        ("113415", "Jujutsu Kaisen", "bx113415-979nF72r8JLj.jpg", 24, &["Action", "Drama", "Supernatural"]),
        ("110277", "Attack on Titan: The Final Season", "bx110277-qDRIhu50PXzz.jpg", 16, &["Action", "Drama", "Fantasy", "Mystery"]),
        ("100166", "My Hero Academia", "bx100166-UMXNnW1mUgGR.jpg", 25, &["Action", "Comedy"]),
        ("21", "One Piece", "nx21-tXMN3Y20PIL9.jpg", 1000, &["Action", "Adventure", "Comedy", "Drama", "Fantasy"]),
        ("1535", "Death Note", "bx1535-lawCwhzhi96X.jpg", 37, &["Mystery", "Psychological", "Supernatural", "Thriller"]),
        ("20605", "Tokyo Ghoul", "nx20605-fmnHdfurM7m5.jpg", 12, &["Action", "Drama", "Horror", "Mystery", "Supernatural"]),
        ("11757", "Sword Art Online", "nx11757-Q9P2zjCPICq5.jpg", 25, &["Action", "Adventure", "Fantasy", "Romance"]),
        ("5114", "Fullmetal Alchemist: Brotherhood", "bx5114-KJTQz9AIm6Wk.jpg", 64, &["Action", "Adventure", "Drama", "Fantasy"]),
        ("16498", "Shingeki no Kyojin", "bx16498-C6FPmWm59CyP.jpg", 25, &["Action", "Drama", "Fantasy", "Mystery"]),
        ("20958", "Haikyu!!", "bx20958-HhwArts87jHG.jpg", 25, &["Comedy", "Drama", "Sports"]),
        ("97940", "Black Clover", "bx97940-5ZrEXAqeK4q4.jpg", 170, &["Action", "Comedy", "Fantasy"]),
    ];

    let mut entries = vec![FEATURED.clone()];
    entries.extend(listed.iter().map(|(id, title, cover, episodes, genres)| CatalogEntry {
        id: id.to_string(),
        title: AnimeTitle {
            english: Some(title.to_string()),
            romaji: None,
            native: None,
        },
        description: None,
        cover_image: Some(format!("{}/{}", COVER_BASE, cover)),
        banner_image: None,
        episodes: Some(*episodes),
        duration: None,
        genres: strings(genres),
        season: None,
        season_year: None,
        status: None,
        average_score: None,
        popularity: None,
        studios: Vec::new(),
        characters: Vec::new(),
    }));
    entries
});

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// The hard-coded catalog shipped with the app.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog;

#[async_trait]
impl CatalogApi for StaticCatalog {
    async fn list(&self, genre: Option<&str>) -> Result<Vec<CatalogSummary>> {
        let genre = genre_filter(genre);
        Ok(ENTRIES
            .iter()
            .filter(|e| genre.map_or(true, |g| e.has_genre(g)))
            .map(CatalogEntry::summary)
            .collect())
    }

    async fn search(&self, query: &str) -> Result<Vec<CatalogSummary>> {
        let needle = query.trim().to_lowercase();
        Ok(ENTRIES
            .iter()
            .filter(|e| e.title.matches(&needle))
            .map(CatalogEntry::summary)
            .collect())
    }

    async fn get(&self, id: &str) -> Result<Option<CatalogEntry>> {
        Ok(ENTRIES.iter().find(|e| e.id == id).cloned())
    }

    async fn featured(&self) -> Result<CatalogEntry> {
        Ok(FEATURED.clone())
    }

    async fn trending(&self) -> Result<Vec<CatalogSummary>> {
        TRENDING_IDS
            .iter()
            .map(|id| {
                ENTRIES
                    .iter()
                    .find(|e| e.id == *id)
                    .map(CatalogEntry::summary)
                    .ok_or_else(|| anyhow!("Trending entry {} missing from sample catalog", id))
            })
            .collect()
    }
}

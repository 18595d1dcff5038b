//! Aggregate sources for one episode from a running server and print what a
//! player would load.
//! Usage:
//!   cargo run --bin sources_probe -- <anime_id> <episode> [title]
//! Uses AUTH_URL as the server base (default http://localhost:3000) and
//! ENABLE_WEBTORRENT to include torrent search (.env supported).

use anistream::config::{parse_flag, TransportConfig};
use anistream::player::{LoadPlan, PlaybackSession};
use anistream::sources::AnimeSources;
use anistream::stream::HttpStreams;
use anyhow::{Context, Result};
use dotenvy::dotenv;
use serde_json::json;
use std::env;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: cargo run --bin sources_probe -- <anime_id> <episode> [title]");
        std::process::exit(1);
    }
    let anime_id = &args[1];
    let episode: u32 = args[2].parse().context("episode must be a positive integer")?;
    let title = args.get(3).map(String::as_str);

    let base = env::var("AUTH_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());
    let transport = TransportConfig {
        webtorrent_enabled: env::var("ENABLE_WEBTORRENT")
            .map(|v| parse_flag(&v))
            .unwrap_or(false),
    };

    let streams = Arc::new(HttpStreams::new(base.as_str())?);
    let sources = AnimeSources::new(streams, transport);
    let snapshot = sources
        .get_all_sources(anime_id, &episode.to_string(), title)
        .await;

    for source in snapshot.sources() {
        println!(
            "{}",
            serde_json::to_string(&json!({
                "type": source.kind.as_str(),
                "name": source.display_name(),
                "url": source.url,
            }))?
        );
    }
    if let Some(err) = &snapshot.error {
        eprintln!("error: {}", err);
    }

    let mut session = PlaybackSession::new(snapshot.sources(), transport, base.as_str());
    match session.start() {
        LoadPlan::Fail(message) => println!("playback: failed ({})", message),
        LoadPlan::AwaitPlayer { url, .. } => println!("playback: {}", url),
        LoadPlan::AwaitDelay { url, delay, .. } => {
            println!("playback: {} (ready after {:?})", url, delay)
        }
    }
    Ok(())
}

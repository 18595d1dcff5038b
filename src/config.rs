use anyhow::{bail, Context, Result};
use std::env;
use std::net::SocketAddr;
use tracing::info;

const DEFAULT_BIND: &str = "0.0.0.0:3000";
const DEFAULT_PUBLIC_URL: &str = "http://localhost:3000";
const DEFAULT_PROXY_RATE_LIMIT: u32 = 600;

pub const REQUIRED_ENV: [&str; 3] = ["ANILIST_CLIENT_ID", "ANILIST_CLIENT_SECRET", "AUTH_SECRET"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogSource {
    Sample,
    AniList,
}

/// Which transports the source aggregator and player may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportConfig {
    pub webtorrent_enabled: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        // WebTorrent ships disabled; it needs browser-side polyfills the UI does not load.
        Self {
            webtorrent_enabled: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    /// Externally visible base URL, used for OAuth callbacks and proxy links.
    pub public_url: String,
    pub anilist_client_id: String,
    pub anilist_client_secret: String,
    pub session_secret: String,
    pub transport: TransportConfig,
    pub catalog_source: CatalogSource,
    pub proxy_rate_limit: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        for key in REQUIRED_ENV {
            if env::var(key).map(|v| v.is_empty()).unwrap_or(true) {
                bail!("Missing required environment variable: {}", key);
            }
        }

        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| DEFAULT_BIND.to_string())
            .parse()
            .context("BIND_ADDR is not a valid socket address")?;

        let public_url = env::var("AUTH_URL")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_PUBLIC_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let webtorrent_enabled = env::var("ENABLE_WEBTORRENT")
            .ok()
            .map(|v| parse_flag(&v))
            .unwrap_or(false);

        let catalog_source = match env::var("CATALOG_SOURCE").ok().as_deref() {
            None | Some("") | Some("sample") => CatalogSource::Sample,
            Some("anilist") => CatalogSource::AniList,
            Some(other) => bail!("Unknown CATALOG_SOURCE '{}'", other),
        };

        let proxy_rate_limit = match env::var("PROXY_RATE_LIMIT") {
            Ok(v) => v
                .parse()
                .with_context(|| format!("PROXY_RATE_LIMIT '{}' is not a number", v))?,
            Err(_) => DEFAULT_PROXY_RATE_LIMIT,
        };

        let config = Self {
            bind_addr,
            public_url,
            anilist_client_id: env::var("ANILIST_CLIENT_ID")?,
            anilist_client_secret: env::var("ANILIST_CLIENT_SECRET")?,
            session_secret: env::var("AUTH_SECRET")?,
            transport: TransportConfig { webtorrent_enabled },
            catalog_source,
            proxy_rate_limit,
        };
        info!(
            "Configuration loaded (public url {}, webtorrent {}, catalog {:?})",
            config.public_url,
            if webtorrent_enabled { "enabled" } else { "disabled" },
            config.catalog_source
        );
        Ok(config)
    }

    pub fn secure_cookies(&self) -> bool {
        self.public_url.starts_with("https://")
    }
}

/// Truthy env flag: `1`, `true`, `yes` or `on`, any case.
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

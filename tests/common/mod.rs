#![allow(dead_code)]

use anistream::app::{build_router, AppState};
use anistream::auth::{OAuthProvider, ProviderDescriptor, ProviderProfile, TokenSet};
use anistream::catalog::StaticCatalog;
use anistream::config::{CatalogSource, Config, TransportConfig};
use anistream::models::{TorrentSource, VideoSource};
use anistream::stream::{SampleStreams, StreamProvider};
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const TEST_SECRET: &str = "test-session-secret";

pub fn test_config() -> Config {
    Config {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        public_url: "http://localhost:3000".to_string(),
        anilist_client_id: "1234".to_string(),
        anilist_client_secret: "client-secret".to_string(),
        session_secret: TEST_SECRET.to_string(),
        transport: TransportConfig::default(),
        catalog_source: CatalogSource::Sample,
        proxy_rate_limit: 600,
    }
}

/// Stream provider that fails every call.
pub struct BrokenStreams;

#[async_trait::async_trait]
impl StreamProvider for BrokenStreams {
    async fn hls_sources(&self, _anime_id: &str, _episode: &str) -> anyhow::Result<Vec<VideoSource>> {
        Err(anyhow::anyhow!("scraper offline"))
    }

    async fn search_torrents(&self, _query: &str) -> anyhow::Result<Vec<TorrentSource>> {
        Err(anyhow::anyhow!("tracker offline"))
    }
}

pub struct FakeAuth {
    pub descriptor: ProviderDescriptor,
    pub fail_exchange: bool,
    pub exchanges: AtomicUsize,
}

impl FakeAuth {
    pub fn new(fail_exchange: bool) -> Self {
        Self {
            descriptor: ProviderDescriptor {
                id: "anilist".to_string(),
                name: "AniList".to_string(),
                kind: "oauth".to_string(),
                authorization_url: "https://anilist.co/api/v2/oauth/authorize".to_string(),
                token_url: "https://anilist.co/api/v2/oauth/token".to_string(),
                userinfo_url: "https://graphql.anilist.co".to_string(),
                scope: String::new(),
                callback_url: "http://localhost:3000/api/auth/callback/anilist".to_string(),
                client_id: "1234".to_string(),
            },
            fail_exchange,
            exchanges: AtomicUsize::new(0),
        }
    }

    pub fn exchange_count(&self) -> usize {
        self.exchanges.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl OAuthProvider for FakeAuth {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn exchange_code(&self, code: &str) -> anyhow::Result<TokenSet> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        if self.fail_exchange {
            return Err(anyhow::anyhow!("invalid_grant"));
        }
        assert_eq!(code, "good-code");
        Ok(TokenSet {
            access_token: "access-token".to_string(),
            refresh_token: Some("refresh-token".to_string()),
            expires_in: Some(31_536_000),
            token_type: Some("Bearer".to_string()),
        })
    }

    async fn fetch_profile(&self, tokens: &TokenSet) -> anyhow::Result<ProviderProfile> {
        assert_eq!(tokens.access_token, "access-token");
        Ok(ProviderProfile {
            id: "5127".to_string(),
            name: "tanjirou".to_string(),
            image: Some("https://img/avatar.png".to_string()),
        })
    }
}

pub fn app_with(
    config: Config,
    streams: Arc<dyn StreamProvider>,
    auth: Arc<dyn OAuthProvider>,
) -> Router {
    let state = AppState::new(config, streams, Arc::new(StaticCatalog), auth).unwrap();
    build_router(state)
}

pub fn sample_app() -> Router {
    app_with(
        test_config(),
        Arc::new(SampleStreams),
        Arc::new(FakeAuth::new(false)),
    )
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn body_text(res: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(res: Response<Body>) -> Value {
    serde_json::from_str(&body_text(res).await).unwrap()
}

use crate::auth::{self, AniListProvider, OAuthProvider, SessionSigner};
use crate::catalog::{self, AniListCatalog, CatalogApi, StaticCatalog, CATEGORIES};
use crate::config::{CatalogSource, Config};
use crate::error::ApiError;
use crate::player::{LoadPlan, PlaybackSession};
use crate::sources::AnimeSources;
use crate::stream::{self, SampleStreams, StreamProvider};
use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{error, info};

const MAX_BODY_BYTES: usize = 64 * 1024;
const MAX_RATE_LIMIT_ENTRIES: usize = 10_000;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub streams: Arc<dyn StreamProvider>,
    pub catalog: Arc<dyn CatalogApi>,
    pub auth: Arc<dyn OAuthProvider>,
    pub signer: SessionSigner,
    /// Shared outbound client for the stream proxy.
    pub http: reqwest::Client,
    pub rate_limits: Arc<Mutex<HashMap<String, WindowCounter>>>,
}

#[derive(Clone, Debug)]
pub struct WindowCounter {
    pub window: u64,
    pub count: u32,
}

impl AppState {
    pub fn new(
        config: Config,
        streams: Arc<dyn StreamProvider>,
        catalog: Arc<dyn CatalogApi>,
        auth: Arc<dyn OAuthProvider>,
    ) -> Result<Self> {
        let signer = SessionSigner::new(&config.session_secret)?;
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build proxy HTTP client")?;
        Ok(Self {
            config: Arc::new(config),
            streams,
            catalog,
            auth,
            signer,
            http,
            rate_limits: Arc::new(Mutex::new(HashMap::new())),
        })
    }
}

pub async fn run_server(config: Config) -> Result<()> {
    let catalog: Arc<dyn CatalogApi> = match config.catalog_source {
        CatalogSource::Sample => Arc::new(StaticCatalog),
        CatalogSource::AniList => Arc::new(AniListCatalog::new()?),
    };
    let auth: Arc<dyn OAuthProvider> = Arc::new(AniListProvider::new(
        &config.anilist_client_id,
        &config.anilist_client_secret,
        &config.public_url,
    )?);
    let addr = config.bind_addr;
    let state = AppState::new(config, Arc::new(SampleStreams), catalog, auth)?;

    let app = build_router(state);

    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/stream/hls", get(stream::hls_sources))
        .route("/api/stream/torrent", get(stream::torrent_sources))
        .route("/api/stream/proxy", get(stream::proxy::proxy_stream))
        .route("/api/auth/providers", get(auth::providers))
        .route("/api/auth/signin", get(auth::signin_page))
        .route(
            "/api/auth/signin/anilist",
            get(auth::signin).post(auth::signin),
        )
        .route("/api/auth/callback/anilist", get(auth::callback))
        .route("/api/auth/session", get(auth::current_session))
        .route("/api/auth/signout", axum::routing::post(auth::signout))
        .route("/api/anime", get(list_anime))
        .route("/api/anime/featured", get(featured_anime))
        .route("/api/anime/trending", get(trending_anime))
        .route("/api/anime/categories", get(categories))
        .route("/api/anime/:id", get(anime_details))
        .route("/api/watch", get(watch))
        .route("/health", get(health))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    search: Option<String>,
    genre: Option<String>,
}

async fn list_anime(
    State(state): State<AppState>,
    Query(params): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let search = params.search.as_deref().map(str::trim).unwrap_or_default();
    let genre = catalog::genre_filter(params.genre.as_deref());

    let mut results = if search.is_empty() {
        state.catalog.list(genre).await
    } else {
        state.catalog.search(search).await
    }
    .map_err(|e| ApiError::internal("Failed to load anime", e))?;

    if let (false, Some(genre)) = (search.is_empty(), genre) {
        results.retain(|r| r.genres.iter().any(|g| g.eq_ignore_ascii_case(genre)));
    }
    Ok(Json(json!({ "results": results })))
}

async fn featured_anime(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let featured = state
        .catalog
        .featured()
        .await
        .map_err(|e| ApiError::internal("Failed to load featured anime", e))?;
    Ok(Json(json!(featured)))
}

async fn trending_anime(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let trending = state
        .catalog
        .trending()
        .await
        .map_err(|e| ApiError::internal("Failed to load trending anime", e))?;
    Ok(Json(json!({ "results": trending })))
}

async fn categories() -> Json<Value> {
    Json(json!({ "categories": CATEGORIES }))
}

async fn anime_details(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let entry = state
        .catalog
        .get(&id)
        .await
        .map_err(|e| ApiError::internal("Failed to load anime", e))?
        .ok_or_else(|| ApiError::NotFound(format!("Anime {} not found", id)))?;
    Ok(Json(json!(entry)))
}

#[derive(Debug, Deserialize)]
struct WatchQuery {
    id: Option<String>,
    episode: Option<String>,
}

/// GET /api/watch?id=&episode=
async fn watch(
    State(state): State<AppState>,
    Query(params): Query<WatchQuery>,
) -> Result<Json<Value>, ApiError> {
    let (Some(id), Some(episode_raw)) = (
        params.id.filter(|v| !v.trim().is_empty()),
        params.episode.filter(|v| !v.trim().is_empty()),
    ) else {
        return Err(ApiError::bad_request("Missing anime ID or episode number"));
    };
    let episode: u32 = episode_raw
        .trim()
        .parse()
        .map_err(|_| ApiError::bad_request("Invalid episode number"))?;

    let entry = state
        .catalog
        .get(&id)
        .await
        .map_err(|e| ApiError::internal("Failed to load anime", e))?
        .ok_or_else(|| ApiError::NotFound(format!("Anime {} not found", id)))?;
    if !entry.contains_episode(episode) {
        return Err(ApiError::bad_request(format!(
            "Episode {} is out of range",
            episode
        )));
    }

    let transport = state.config.transport;
    let aggregator = AnimeSources::new(state.streams.clone(), transport);
    let snapshot = aggregator
        .get_all_sources(&entry.id, &episode.to_string(), Some(entry.title.preferred()))
        .await;
    if let Some(message) = &snapshot.error {
        error!("Sources for {} episode {} incomplete: {}", entry.id, episode, message);
    }

    let mut session = PlaybackSession::new(
        snapshot.sources(),
        transport,
        state.config.public_url.as_str(),
    );
    let plan = session.start();
    let (url, ready_after_ms) = match &plan {
        LoadPlan::Fail(_) => (None, None),
        LoadPlan::AwaitPlayer { url, .. } => (Some(url.clone()), None),
        LoadPlan::AwaitDelay { url, delay, .. } => {
            (Some(url.clone()), Some(delay.as_millis() as u64))
        }
    };

    let previous_episode = (episode > 1).then(|| entry.clamp_episode(episode - 1));
    let next_episode = episode
        .checked_add(1)
        .filter(|_| entry.episodes.map_or(true, |total| episode < total))
        .map(|n| entry.clamp_episode(n));

    info!(
        "Prepared {} sources for {} episode {}",
        session.sources().len(),
        entry.id,
        episode
    );
    Ok(Json(json!({
        "anime": entry.summary(),
        "episode": episode,
        "previous_episode": previous_episode,
        "next_episode": next_episode,
        "sources": session.sources(),
        "error": snapshot.error,
        "active": {
            "source": session.active(),
            "url": url,
            "state": session.state(),
            "token": session.token(),
            "ready_after_ms": ready_after_ms,
        },
    })))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutdown signal received (Ctrl+C)");
        }
        _ = terminate => {
            info!("Shutdown signal received (SIGTERM)");
        }
    }
}

pub(crate) fn extract_ip(headers: &HeaderMap) -> String {
    headers
        .get("cf-connecting-ip")
        .or_else(|| headers.get("x-real-ip"))
        .or_else(|| headers.get("x-forwarded-for"))
        .and_then(|v| v.to_str().ok())
        .map(|s| s.split(',').next().unwrap_or(s).trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Count one proxy request for `ip` in the current minute.
pub(crate) async fn check_rate_limit(state: &AppState, ip: &str) -> bool {
    let window = (Utc::now().timestamp() / 60) as u64;
    let mut guards = state.rate_limits.lock().await;
    if guards.len() > MAX_RATE_LIMIT_ENTRIES {
        guards.retain(|_, v| v.window == window);
    }
    let entry = guards
        .entry(ip.to_string())
        .or_insert(WindowCounter { window, count: 0 });
    if entry.window != window {
        entry.window = window;
        entry.count = 0;
    }
    if entry.count >= state.config.proxy_rate_limit {
        return false;
    }
    entry.count += 1;
    true
}

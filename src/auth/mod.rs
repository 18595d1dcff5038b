//! Sign-in with AniList and the cookie-backed session.
//!
//! `/api/auth/signin/anilist` starts the code grant with a signed `state`
//! that is also stored in a short-lived cookie. The callback only proceeds
//! when the query `state` matches the cookie and verifies against the
//! session secret, then trades the code for tokens and the viewer profile
//! and stores both in the signed session cookie.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{AppendHeaders, IntoResponse, Response},
    Json,
};
use axum_extra::TypedHeader;
use chrono::Utc;
use headers::Cookie;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::app::AppState;
use crate::error::ApiError;
use crate::models::{Session, SessionUser};

mod provider;
pub mod session;

pub use provider::{AniListProvider, OAuthProvider, ProviderDescriptor, ProviderProfile, TokenSet};
pub use session::SessionSigner;

use session::{cookie_header, SESSION_COOKIE, SESSION_MAX_AGE_SECS, STATE_COOKIE, STATE_MAX_AGE_SECS};

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// Build the session stored after a successful sign-in.
pub fn session_from_profile(profile: ProviderProfile, tokens: TokenSet, now: i64) -> Session {
    Session {
        anilist_id: Some(profile.id.clone()),
        user: SessionUser {
            id: profile.id,
            name: profile.name,
            image: profile.image,
        },
        access_token: Some(tokens.access_token),
        refresh_token: tokens.refresh_token,
        expires: now + SESSION_MAX_AGE_SECS,
    }
}

fn cookie_value(cookies: &Option<TypedHeader<Cookie>>, name: &str) -> Option<String> {
    cookies
        .as_ref()
        .and_then(|TypedHeader(c)| c.get(name))
        .map(str::to_string)
}

/// GET /api/auth/providers
pub async fn providers(State(state): State<AppState>) -> Json<Value> {
    let descriptor = state.auth.descriptor();
    Json(json!({ descriptor.id.clone(): descriptor }))
}

/// GET /api/auth/signin
pub async fn signin_page(State(state): State<AppState>) -> Json<Value> {
    let descriptor = state.auth.descriptor();
    Json(json!({
        "providers": [descriptor],
        "signinUrl": format!("{}/api/auth/signin/{}", state.config.public_url, descriptor.id),
    }))
}

/// GET|POST /api/auth/signin/anilist
pub async fn signin(State(state): State<AppState>) -> Response {
    let oauth_state = state.signer.issue_state(Utc::now().timestamp());
    let location = state.auth.descriptor().authorize_redirect(&oauth_state);
    info!("Redirecting to {} for sign-in", state.auth.descriptor().name);
    (
        StatusCode::FOUND,
        AppendHeaders([
            (
                header::SET_COOKIE,
                cookie_header(
                    STATE_COOKIE,
                    &oauth_state,
                    STATE_MAX_AGE_SECS,
                    state.config.secure_cookies(),
                ),
            ),
            (header::LOCATION, location),
        ]),
    )
        .into_response()
}

/// GET /api/auth/callback/anilist?code=&state=
pub async fn callback(
    State(state): State<AppState>,
    cookies: Option<TypedHeader<Cookie>>,
    Query(params): Query<CallbackQuery>,
) -> Result<Response, ApiError> {
    if let Some(reason) = params.error {
        warn!("AniList denied sign-in: {}", reason);
        return Err(ApiError::Forbidden("Sign-in was denied".to_string()));
    }
    let (Some(code), Some(returned_state)) = (
        params.code.filter(|c| !c.is_empty()),
        params.state.filter(|s| !s.is_empty()),
    ) else {
        return Err(ApiError::bad_request("Missing code or state"));
    };

    let now = Utc::now().timestamp();
    let expected = cookie_value(&cookies, STATE_COOKIE);
    if expected.as_deref() != Some(returned_state.as_str())
        || !state.signer.verify_state(&returned_state, now)
    {
        warn!("Rejecting OAuth callback with mismatched or stale state");
        return Err(ApiError::Forbidden("Invalid sign-in state".to_string()));
    }

    let provider_failure = |e: anyhow::Error| {
        error!("AniList sign-in failed: {:#}", e);
        ApiError::Upstream {
            status: StatusCode::BAD_GATEWAY,
            message: "Failed to sign in with AniList".to_string(),
        }
    };
    let tokens = state.auth.exchange_code(&code).await.map_err(provider_failure)?;
    let profile = state
        .auth
        .fetch_profile(&tokens)
        .await
        .map_err(provider_failure)?;

    info!("Signed in AniList user {} ({})", profile.name, profile.id);
    let session = session_from_profile(profile, tokens, now);
    let token = state
        .signer
        .encode_session(&session)
        .map_err(|e| ApiError::internal("Failed to create session", e))?;

    let secure = state.config.secure_cookies();
    Ok((
        StatusCode::FOUND,
        AppendHeaders([
            (
                header::SET_COOKIE,
                cookie_header(SESSION_COOKIE, &token, SESSION_MAX_AGE_SECS, secure),
            ),
            (header::SET_COOKIE, cookie_header(STATE_COOKIE, "", 0, secure)),
            (header::LOCATION, "/".to_string()),
        ]),
    )
        .into_response())
}

/// GET /api/auth/session
pub async fn current_session(
    State(state): State<AppState>,
    cookies: Option<TypedHeader<Cookie>>,
) -> Json<Value> {
    let session = cookie_value(&cookies, SESSION_COOKIE)
        .and_then(|token| state.signer.decode_session(&token, Utc::now().timestamp()));
    match session.and_then(|s| serde_json::to_value(s).ok()) {
        Some(value) => Json(value),
        None => Json(json!({})),
    }
}

/// POST /api/auth/signout
pub async fn signout(State(state): State<AppState>) -> Response {
    (
        AppendHeaders([(
            header::SET_COOKIE,
            cookie_header(SESSION_COOKIE, "", 0, state.config.secure_cookies()),
        )]),
        Json(json!({ "url": format!("{}/", state.config.public_url) })),
    )
        .into_response()
}

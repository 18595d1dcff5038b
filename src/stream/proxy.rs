use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
};
use reqwest::Url;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::playlist::{is_playlist_content_type, rewrite_playlist};
use crate::app::{check_rate_limit, extract_ip, AppState};
use crate::error::ApiError;

pub const DEFAULT_REFERER: &str = "https://example.com";
const DEFAULT_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

#[derive(Debug, Deserialize)]
pub struct ProxyQuery {
    url: Option<String>,
    referer: Option<String>,
}

/// Build the proxy link a player should load for a referer-locked stream.
pub fn proxy_url(origin: &str, url: &str, referer: Option<&str>) -> String {
    format!(
        "{}/api/stream/proxy?url={}&referer={}",
        origin.trim_end_matches('/'),
        urlencoding::encode(url),
        referer.map(urlencoding::encode).unwrap_or_default()
    )
}

/// Clients sometimes encode the target twice; undo the second layer.
fn decode_target(raw: &str) -> String {
    if raw.contains("://") {
        return raw.to_string();
    }
    match urlencoding::decode(raw) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => raw.to_string(),
    }
}

fn parse_http_url(raw: &str, what: &str) -> Result<Url, ApiError> {
    let url = Url::parse(raw).map_err(|_| ApiError::bad_request(format!("Invalid {}", what)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ApiError::bad_request(format!(
            "Unsupported {} scheme '{}'",
            what, other
        ))),
    }
}

/// GET /api/stream/proxy?url=&referer=
pub async fn proxy_stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ProxyQuery>,
) -> Result<Response, ApiError> {
    let ip = extract_ip(&headers);
    if !check_rate_limit(&state, &ip).await {
        warn!("Proxy rate limit exceeded for {}", ip);
        return Err(ApiError::RateLimited);
    }

    let Some(raw_url) = params.url.filter(|u| !u.trim().is_empty()) else {
        return Err(ApiError::bad_request("Missing URL parameter"));
    };
    let target = parse_http_url(&decode_target(raw_url.trim()), "URL parameter")?;

    let referer = params
        .referer
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_REFERER.to_string());
    let referer_url = parse_http_url(&referer, "referer parameter")?;
    let origin = referer_url.origin().ascii_serialization();

    debug!(target = %target, referer = %referer, "Proxying stream");
    let res = state
        .http
        .get(target.clone())
        .header(header::REFERER, referer.as_str())
        .header(header::USER_AGENT, BROWSER_USER_AGENT)
        .header(header::ACCEPT, "*/*")
        .header(header::ORIGIN, origin)
        .send()
        .await
        .map_err(|e| ApiError::internal("Failed to proxy stream", e.into()))?;

    let status = res.status();
    if !status.is_success() {
        warn!("Upstream {} answered {}", target, status);
        return Err(ApiError::Upstream {
            status,
            message: format!(
                "Failed to fetch stream: {}",
                status.canonical_reason().unwrap_or("Unknown error")
            ),
        });
    }

    let manifest_url = res.url().clone();
    let content_type = res
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string();
    let bytes = res
        .bytes()
        .await
        .map_err(|e| ApiError::internal("Failed to proxy stream", e.into()))?;

    let body = if is_playlist_content_type(&content_type) {
        let text = String::from_utf8_lossy(&bytes);
        info!("Rewriting playlist from {}", manifest_url);
        Body::from(rewrite_playlist(&text, &manifest_url))
    } else {
        Body::from(bytes)
    };

    let mut response = body.into_response();
    let out = response.headers_mut();
    out.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type)
            .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_CONTENT_TYPE)),
    );
    out.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    out.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, OPTIONS"),
    );
    out.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    Ok(response)
}

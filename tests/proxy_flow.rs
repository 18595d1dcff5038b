mod common;

use anistream::stream::proxy::proxy_url;
use anistream::stream::SampleStreams;
use axum::body::Body;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::{routing::get as get_route, Router};
use common::{app_with, body_json, body_text, get, sample_app, test_config, FakeAuth};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::util::ServiceExt;

const PLAYLIST: &str = "#EXTM3U\n#EXT-X-TARGETDURATION:4\n#EXTINF:4.0,\nsegment1.ts\n#EXTINF:4.0,\n/abs/seg.ts\n#EXTINF:4.0,\nhttps://cdn.example/absolute.ts\n";

async fn upstream_playlist(headers: HeaderMap) -> (StatusCode, [(header::HeaderName, &'static str); 1], String) {
    // Refuse hotlinking like the real CDNs do.
    let referer = headers
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if referer != "https://streams.example/watch" {
        return (
            StatusCode::FORBIDDEN,
            [(header::CONTENT_TYPE, "text/plain")],
            "hotlinking denied".to_string(),
        );
    }
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/vnd.apple.mpegurl")],
        PLAYLIST.to_string(),
    )
}

async fn upstream_segment() -> ([(header::HeaderName, &'static str); 1], &'static [u8]) {
    ([(header::CONTENT_TYPE, "video/mp2t")], b"\x47\x40\x00\x10segment")
}

async fn spawn_upstream() -> SocketAddr {
    let app = Router::new()
        .route("/hls/index.m3u8", get_route(upstream_playlist))
        .route("/hls/segment1.ts", get_route(upstream_segment));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn proxied(addr: SocketAddr, path: &str, referer: &str) -> String {
    let link = proxy_url(
        "http://localhost:3000",
        &format!("http://{}{}", addr, path),
        Some(referer),
    );
    link.trim_start_matches("http://localhost:3000").to_string()
}

#[tokio::test]
async fn playlist_entries_are_made_absolute() {
    let addr = spawn_upstream().await;
    let uri = proxied(addr, "/hls/index.m3u8", "https://streams.example/watch");

    let res = sample_app().oneshot(get(&uri)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers()[header::CONTENT_TYPE],
        "application/vnd.apple.mpegurl"
    );
    assert_eq!(res.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert_eq!(
        res.headers()[header::CACHE_CONTROL],
        "no-cache, no-store, must-revalidate"
    );

    let body = body_text(res).await;
    assert!(body.contains(&format!("http://{}/hls/segment1.ts", addr)));
    assert!(body.contains(&format!("http://{}/abs/seg.ts", addr)));
    assert!(body.contains("\nhttps://cdn.example/absolute.ts\n"));
    assert!(body.starts_with("#EXTM3U\n#EXT-X-TARGETDURATION:4\n"));
}

#[tokio::test]
async fn segments_pass_through_untouched() {
    let addr = spawn_upstream().await;
    let uri = proxied(addr, "/hls/segment1.ts", "https://streams.example/watch");

    let res = sample_app().oneshot(get(&uri)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[header::CONTENT_TYPE], "video/mp2t");
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"\x47\x40\x00\x10segment");
}

#[tokio::test]
async fn upstream_status_is_propagated() {
    let addr = spawn_upstream().await;

    // Wrong referer: the upstream answers 403.
    let uri = proxied(addr, "/hls/index.m3u8", "https://elsewhere.example");
    let res = sample_app().oneshot(get(&uri)).await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(res).await["error"], "Failed to fetch stream: Forbidden");

    let uri = proxied(addr, "/hls/missing.m3u8", "https://streams.example/watch");
    let res = sample_app().oneshot(get(&uri)).await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(res).await["error"], "Failed to fetch stream: Not Found");
}

#[tokio::test]
async fn missing_or_unsupported_url_is_rejected() {
    let res = sample_app()
        .oneshot(get("/api/stream/proxy"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(res).await["error"], "Missing URL parameter");

    let res = sample_app()
        .oneshot(get("/api/stream/proxy?url=file%3A%2F%2F%2Fetc%2Fpasswd"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn proxy_is_rate_limited_per_ip() {
    let mut config = test_config();
    config.proxy_rate_limit = 2;
    let app = app_with(config, Arc::new(SampleStreams), Arc::new(FakeAuth::new(false)));

    let request = |ip: &str| {
        Request::builder()
            .uri("/api/stream/proxy")
            .header("x-real-ip", ip)
            .body(Body::empty())
            .unwrap()
    };

    for _ in 0..2 {
        let res = app.clone().oneshot(request("203.0.113.9")).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
    let res = app.clone().oneshot(request("203.0.113.9")).await.unwrap();
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);

    // Other clients keep their own budget.
    let res = app.oneshot(request("198.51.100.4")).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

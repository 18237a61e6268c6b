//! API integration tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use tubegate_api::{create_router, ApiConfig, AppState, AuthStrategy};
use tubegate_media::{
    AudioPipeline, MediaError, MediaResult, MetadataResolver, PipelineConfig, SourceConfig,
};
use tubegate_models::{UpstreamAuth, VideoMetadata, VideoReference};

const TOKEN: &str = "test-token";
const WATCH_URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";
const MISSING_URL: &str = "https://youtu.be/notfound123";

/// Resolver that answers from memory and counts calls.
#[derive(Default)]
struct FakeResolver {
    calls: AtomicUsize,
}

impl FakeResolver {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataResolver for FakeResolver {
    async fn resolve(
        &self,
        video: &VideoReference,
        _auth: &UpstreamAuth,
    ) -> MediaResult<VideoMetadata> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if video.as_str() == "notfound123" {
            return Err(MediaError::VideoNotFound(video.to_string()));
        }

        let mut meta = VideoMetadata::new(video.as_str());
        meta.title = Some("Never Gonna Give You Up".to_string());
        meta.length_seconds = Some(213);
        meta.view_count = Some(1_500_000_000);
        Ok(meta)
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

fn test_config() -> ApiConfig {
    ApiConfig {
        api_key: Some(TOKEN.to_string()),
        ytdlp_path: "/nonexistent/yt-dlp".into(),
        ffmpeg_path: "/nonexistent/ffmpeg".into(),
        ..Default::default()
    }
}

fn create_test_router(config: ApiConfig) -> (Router, Arc<FakeResolver>) {
    let resolver = Arc::new(FakeResolver::default());
    let pipeline = AudioPipeline::new(PipelineConfig {
        source: SourceConfig {
            binary: config.ytdlp_path.clone(),
            ..Default::default()
        },
        ffmpeg_binary: config.ffmpeg_path.clone(),
        ..Default::default()
    });

    let state = AppState::with_components(config, resolver.clone(), pipeline).unwrap();
    (create_router(state, None), resolver)
}

fn post_json(uri: &str, url: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder
        .body(Body::from(serde_json::json!({ "url": url }).to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Test root marker.
#[tokio::test]
async fn test_root_marker() {
    let (app, _) = create_test_router(test_config());

    let response = app.oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"tubegate");
}

/// Test ping payload and uptime monotonicity.
#[tokio::test]
async fn test_ping_reports_runtime_stats() {
    let (app, _) = create_test_router(test_config());

    let first = app.clone().oneshot(get("/ping")).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let first = body_json(first).await;

    tokio::time::sleep(std::time::Duration::from_millis(10)).await;

    let second = body_json(app.oneshot(get("/ping")).await.unwrap()).await;

    assert_eq!(first["status"], true);
    assert_eq!(first["environment"], "development");
    assert!(first["timestamp"].is_string());
    assert!(first["memoryUsage"]["rss"].is_u64());
    assert!(first["memoryUsage"]["virtualMemory"].is_u64());
    assert!(second["uptime"].as_f64().unwrap() >= first["uptime"].as_f64().unwrap());
}

/// Test ping needs no credential.
#[tokio::test]
async fn test_ping_is_not_gated() {
    let (app, _) = create_test_router(test_config());
    let response = app.oneshot(get("/ping")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

/// Test missing credential.
#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    for uri in ["/metadata", "/download"] {
        let (app, resolver) = create_test_router(test_config());
        let response = app.oneshot(post_json(uri, WATCH_URL, None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", uri);
        let json = body_json(response).await;
        assert_eq!(json["status"], false);
        assert_eq!(json["code"], "UNAUTHORIZED");
        assert_eq!(json["error"], "Unauthorized: Bearer token missing or invalid");
        assert_eq!(resolver.calls(), 0);
    }
}

/// Test wrong credential.
#[tokio::test]
async fn test_wrong_token_is_forbidden() {
    for uri in ["/metadata", "/download"] {
        let (app, resolver) = create_test_router(test_config());
        let response = app
            .oneshot(post_json(uri, WATCH_URL, Some("wrong-token")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{}", uri);
        let json = body_json(response).await;
        assert_eq!(json["error"], "Forbidden: Invalid token");
        assert_eq!(resolver.calls(), 0);
    }
}

/// Test correct credential reaches the resolver.
#[tokio::test]
async fn test_metadata_with_valid_token() {
    let (app, resolver) = create_test_router(test_config());
    let response = app
        .oneshot(post_json("/metadata", WATCH_URL, Some(TOKEN)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], true);
    assert_eq!(json["data"]["videoId"], "dQw4w9WgXcQ");
    assert_eq!(json["data"]["title"], "Never Gonna Give You Up");
    assert_eq!(json["data"]["lengthSeconds"], 213);
    assert_eq!(resolver.calls(), 1);
}

/// Test the X-API-Key strategy.
#[tokio::test]
async fn test_header_strategy() {
    let config = ApiConfig {
        auth_strategy: AuthStrategy::Header,
        ..test_config()
    };
    let (app, _) = create_test_router(config);

    let request = Request::builder()
        .method("POST")
        .uri("/metadata")
        .header(header::CONTENT_TYPE, "application/json")
        .header("X-API-Key", TOKEN)
        .body(Body::from(serde_json::json!({ "url": WATCH_URL }).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

/// Test disabled gate.
#[tokio::test]
async fn test_gate_disabled() {
    let config = ApiConfig {
        auth_enabled: false,
        api_key: None,
        ..test_config()
    };
    let (app, _) = create_test_router(config);

    let response = app
        .oneshot(post_json("/metadata", WATCH_URL, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

/// Test short links and the other accepted URL shapes.
#[tokio::test]
async fn test_metadata_accepts_share_links() {
    for url in [
        "https://youtu.be/dQw4w9WgXcQ",
        "https://www.youtube.com/shorts/dQw4w9WgXcQ",
        "https://www.youtube.com/watch?list=PL1&v=dQw4w9WgXcQ&t=42",
    ] {
        let (app, _) = create_test_router(test_config());
        let response = app
            .oneshot(post_json("/metadata", url, Some(TOKEN)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{}", url);
        assert_eq!(body_json(response).await["data"]["videoId"], "dQw4w9WgXcQ");
    }
}

/// Test empty or absent id never reaches the resolver.
#[tokio::test]
async fn test_metadata_rejects_missing_id() {
    for url in [
        "https://www.youtube.com/watch?v=",
        "https://www.youtube.com/watch",
        "https://www.youtube.com/watch?v=short",
        "not a url",
        "",
    ] {
        let (app, resolver) = create_test_router(test_config());
        let response = app
            .oneshot(post_json("/metadata", url, Some(TOKEN)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{:?}", url);
        let json = body_json(response).await;
        assert_eq!(json["code"], "BAD_REQUEST");
        assert_eq!(resolver.calls(), 0);
    }
}

/// Test malformed request bodies use the JSON error shape.
#[tokio::test]
async fn test_metadata_rejects_bad_body() {
    let (app, resolver) = create_test_router(test_config());
    let request = Request::builder()
        .method("POST")
        .uri("/metadata")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {}", TOKEN))
        .body(Body::from("{\"link\": 1}"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["status"], false);
    assert_eq!(json["code"], "BAD_REQUEST");
    assert_eq!(resolver.calls(), 0);
}

/// Test unknown videos are 404.
#[tokio::test]
async fn test_metadata_not_found() {
    let (app, _) = create_test_router(test_config());
    let response = app
        .oneshot(post_json("/metadata", MISSING_URL, Some(TOKEN)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "NOT_FOUND");
}

/// Test repeated lookups agree.
#[tokio::test]
async fn test_metadata_is_idempotent() {
    let (app, resolver) = create_test_router(test_config());

    let first = app
        .clone()
        .oneshot(post_json("/metadata", WATCH_URL, Some(TOKEN)))
        .await
        .unwrap();
    let second = app
        .oneshot(post_json("/metadata", "https://youtu.be/dQw4w9WgXcQ", Some(TOKEN)))
        .await
        .unwrap();

    assert_eq!(body_json(first).await, body_json(second).await);
    assert_eq!(resolver.calls(), 2);
}

/// Test cookie requirement.
#[tokio::test]
async fn test_cookie_required() {
    let config = ApiConfig {
        require_cookies: true,
        ..test_config()
    };
    let (app, resolver) = create_test_router(config);

    let response = app
        .clone()
        .oneshot(post_json("/metadata", WATCH_URL, Some(TOKEN)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "COOKIE_REQUIRED");
    assert_eq!(json["error"], "Cookies are required for authentication.");
    assert_eq!(resolver.calls(), 0);

    let mut request = post_json("/metadata", WATCH_URL, Some(TOKEN));
    request
        .headers_mut()
        .insert(header::COOKIE, "SID=abc".parse().unwrap());
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(resolver.calls(), 1);
}

/// Test non-video URLs are rejected before the pipeline starts.
#[tokio::test]
async fn test_download_rejects_non_video_url() {
    for url in [
        "https://example.com",
        "https://example.com/watch?v=dQw4w9WgXcQ",
        "ftp://youtube.com/watch?v=dQw4w9WgXcQ",
        "https://www.youtube.com/watch?v=",
        "https://www.youtube.com/embed/videoseries?list=PLrAXtmRdnEQy4qtr",
        "https://www.youtube.com/watch?v=dQw4w9WgXcQ!",
    ] {
        let (app, _) = create_test_router(test_config());
        let response = app
            .oneshot(post_json("/download", url, Some(TOKEN)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", url);
        let json = body_json(response).await;
        assert_eq!(json["error"], "Invalid YouTube URL");
    }
}

/// Test pipeline failures before streaming are structured and safe.
#[tokio::test]
async fn test_download_pipeline_failure_is_json() {
    let (app, _) = create_test_router(test_config());
    let response = app
        .oneshot(post_json("/download", WATCH_URL, Some(TOKEN)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    assert_eq!(json["status"], false);
    assert_eq!(json["code"], "PIPELINE_ERROR");
    assert_eq!(json["error"], "Failed to process audio stream");
    assert!(!json.to_string().contains("nonexistent"));
}

/// Test security headers and request ids.
#[tokio::test]
async fn test_security_headers_and_request_id() {
    let (app, _) = create_test_router(test_config());
    let response = app.oneshot(get("/ping")).await.unwrap();

    let headers = response.headers();
    assert_eq!(headers.get("X-Content-Type-Options").unwrap(), "nosniff");
    assert_eq!(headers.get("X-Frame-Options").unwrap(), "DENY");
    assert!(headers.contains_key("X-Request-ID"));
}

/// Test caller-supplied request ids are echoed.
#[tokio::test]
async fn test_request_id_is_echoed() {
    let (app, _) = create_test_router(test_config());
    let request = Request::builder()
        .uri("/ping")
        .header("X-Request-ID", "req-123")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.headers().get("X-Request-ID").unwrap(), "req-123");
}

/// Test CORS preflight.
#[tokio::test]
async fn test_cors_preflight() {
    let (app, _) = create_test_router(test_config());
    let request = Request::builder()
        .method("OPTIONS")
        .uri("/download")
        .header("Origin", "http://localhost:3000")
        .header("Access-Control-Request-Method", "POST")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert!(response.status() == StatusCode::OK || response.status() == StatusCode::NO_CONTENT);
    assert!(response
        .headers()
        .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
}

/// End-to-end download through real yt-dlp and ffmpeg.
#[tokio::test]
#[ignore = "requires yt-dlp, ffmpeg and network access"]
async fn test_download_streams_mp3() {
    use futures_util::StreamExt;

    let config = ApiConfig {
        api_key: Some(TOKEN.to_string()),
        ..Default::default()
    };
    let state = AppState::new(config).await.unwrap();
    let app = create_router(state, None);

    let response = app
        .oneshot(post_json("/download", WATCH_URL, Some(TOKEN)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get(header::CONTENT_TYPE).unwrap(), "audio/mpeg");
    assert_eq!(
        response.headers().get(header::CONTENT_DISPOSITION).unwrap(),
        "attachment; filename=\"dQw4w9WgXcQ.mp3\""
    );

    let mut body = response.into_body().into_data_stream();
    let first = body.next().await.unwrap().unwrap();
    assert!(tubegate_media::looks_like_mp3(&first));
}

//! MP3 download handler.

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use axum::Json;
use tracing::{info, warn};

use tubegate_models::{validate_source_url, UpstreamAuth};

use crate::error::{ApiError, ApiResult};
use crate::handlers::UrlRequest;
use crate::metrics;
use crate::state::AppState;

/// Stream the video's audio track as MP3.
///
/// Errors before the first audio byte are JSON; once headers are sent a
/// failure aborts the connection.
pub async fn download_audio(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<UrlRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(request) = body?;

    let video = validate_source_url(&request.url).map_err(|e| {
        warn!(error = %e, "Rejected download URL");
        ApiError::bad_request("Invalid YouTube URL")
    })?;

    let auth = UpstreamAuth::from_cookie_header(
        headers.get(header::COOKIE).and_then(|v| v.to_str().ok()),
    );

    info!(video_id = %video, "Starting download");
    let stream = state.pipeline.start(&video, &auth).await.map_err(|e| {
        metrics::record_download_failed(e.kind());
        ApiError::pipeline(e)
    })?;
    metrics::record_download_started();

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "audio/mpeg")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}.mp3\"", video),
        )
        .header("X-Audio-Bitrate", state.pipeline.config().bitrate_kbps.to_string())
        .header(header::CACHE_CONTROL, "no-store")
        .body(Body::from_stream(stream))
        .map_err(|e| ApiError::internal(format!("Failed to build response: {}", e)))
}

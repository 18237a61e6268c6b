//! Metadata handler.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::Json;
use serde::Serialize;
use tracing::info;

use tubegate_models::{UpstreamAuth, VideoMetadata};

use crate::error::{ApiError, ApiResult};
use crate::handlers::UrlRequest;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct MetadataResponse {
    pub status: bool,
    pub data: VideoMetadata,
}

/// Resolve metadata for the video behind `url`.
///
/// Validation and the cookie check run before the resolver is called.
pub async fn get_metadata(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<UrlRequest>, JsonRejection>,
) -> ApiResult<Json<MetadataResponse>> {
    let Json(request) = body?;
    let video = state.normalizer.normalize(&request.url)?;

    let auth = UpstreamAuth::from_cookie_header(
        headers.get(header::COOKIE).and_then(|v| v.to_str().ok()),
    );
    if state.config.require_cookies && !auth.has_cookie() {
        return Err(ApiError::CookieRequired);
    }

    info!(video_id = %video, resolver = state.resolver.name(), "Fetching metadata");
    let data = state.resolver.resolve(&video, &auth).await?;

    Ok(Json(MetadataResponse { status: true, data }))
}

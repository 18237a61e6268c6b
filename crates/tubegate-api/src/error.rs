//! API error types.

use axum::extract::rejection::JsonRejection;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use tubegate_media::MediaError;
use tubegate_models::NormalizeError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Cookies are required for authentication.")]
    CookieRequired,

    #[error("{0}")]
    NotFound(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Map a streaming failure. Every media error is a 500 on the download path.
    pub fn pipeline(err: MediaError) -> Self {
        Self::Pipeline(err.to_string())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) | ApiError::CookieRequired => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream(_) | ApiError::Pipeline(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::CookieRequired => "COOKIE_REQUIRED",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Upstream(_) => "UPSTREAM_ERROR",
            ApiError::Pipeline(_) => "PIPELINE_ERROR",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<NormalizeError> for ApiError {
    fn from(err: NormalizeError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

/// Resolver failures: missing videos are 404, the rest are upstream errors.
impl From<MediaError> for ApiError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::VideoNotFound(_) => Self::NotFound("Video not found".to_string()),
            other => Self::Upstream(other.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    status: bool,
    error: String,
    code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Raw upstream and pipeline detail stays in the logs
        let message = match &self {
            ApiError::Upstream(detail) => {
                error!(detail = %detail, "Upstream failure");
                "Failed to fetch video metadata".to_string()
            }
            ApiError::Pipeline(detail) => {
                error!(detail = %detail, "Pipeline failure");
                "Failed to process audio stream".to_string()
            }
            ApiError::Internal(detail) => {
                error!(detail = %detail, "Internal error");
                "An internal error occurred".to_string()
            }
            ApiError::Unauthorized(_) | ApiError::Forbidden(_) => {
                warn!(status = status.as_u16(), "Access denied");
                self.to_string()
            }
            _ => self.to_string(),
        };

        let body = ErrorResponse {
            status: false,
            error: message,
            code: self.code(),
        };

        let mut response = (status, Json(body)).into_response();
        if let ApiError::Internal(_) = &self {
            response.extensions_mut().insert(InternalDetail(self.to_string()));
        }
        response
    }
}

/// Full message of an internal error, carried on the masked response.
#[derive(Debug, Clone)]
pub struct InternalDetail(pub String);

/// Put internal error detail back into the response body.
///
/// Only installed outside production.
pub async fn expose_internal_detail(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    match response.extensions_mut().remove::<InternalDetail>() {
        Some(InternalDetail(detail)) => {
            let body = ErrorResponse {
                status: false,
                error: detail,
                code: "INTERNAL_ERROR",
            };
            (response.status(), Json(body)).into_response()
        }
        None => response,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::Body;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn failing_router() -> Router {
        Router::new().route(
            "/fail",
            get(|| async { ApiError::internal("pool exhausted at db-3") }),
        )
    }

    async fn call(router: Router) -> Response {
        router
            .oneshot(
                axum::http::Request::builder()
                    .uri("/fail")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_internal_detail_masked_by_default() {
        let response = call(failing_router()).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let json = body_json(response).await;
        assert_eq!(json["error"], "An internal error occurred");
        assert_eq!(json["code"], "INTERNAL_ERROR");
    }

    #[tokio::test]
    async fn test_internal_detail_exposed_when_layer_installed() {
        let router = failing_router().layer(axum::middleware::from_fn(expose_internal_detail));
        let response = call(router).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let json = body_json(response).await;
        assert_eq!(json["status"], false);
        assert_eq!(json["error"], "Internal error: pool exhausted at db-3");
        assert_eq!(json["code"], "INTERNAL_ERROR");
    }

    #[test]
    fn test_media_errors_map_to_status() {
        let not_found: ApiError = MediaError::VideoNotFound("abc".into()).into();
        assert_eq!(not_found.status_code(), StatusCode::NOT_FOUND);

        let upstream: ApiError = MediaError::upstream("quota", Some(403)).into();
        assert_eq!(upstream.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(upstream.code(), "UPSTREAM_ERROR");

        let pipeline = ApiError::pipeline(MediaError::VideoNotFound("abc".into()));
        assert_eq!(pipeline.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(pipeline.code(), "PIPELINE_ERROR");
    }

    #[test]
    fn test_normalize_errors_are_bad_requests() {
        let err: ApiError = NormalizeError::MissingVideoId.into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "Video ID not found in URL");
    }

    #[tokio::test]
    async fn test_upstream_detail_is_hidden() {
        let response =
            ApiError::Upstream("yt-dlp failed: token=abc123".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], false);
        assert_eq!(json["error"], "Failed to fetch video metadata");
        assert_eq!(json["code"], "UPSTREAM_ERROR");
        assert!(!String::from_utf8_lossy(&body).contains("abc123"));
    }
}

//! API routes.

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::auth::require_access;
use crate::error::expose_internal_detail;
use crate::handlers::{download_audio, get_metadata, ping, root};
use crate::metrics::metrics_middleware;
use crate::middleware::{cors_layer, request_id, request_logging, security_headers};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    // Gated routes
    let media_routes = Router::new()
        .route("/metadata", post(get_metadata))
        .route("/download", post(download_audio))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_access));

    let health_routes = Router::new()
        .route("/", get(root))
        .route("/ping", get(ping));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    let mut router = Router::new()
        .merge(media_routes)
        .merge(health_routes)
        .merge(metrics_routes);

    if !state.config.is_production() {
        router = router.layer(middleware::from_fn(expose_internal_detail));
    }

    router
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}

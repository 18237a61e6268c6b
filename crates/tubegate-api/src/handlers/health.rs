//! Liveness handlers.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::stats::MemoryUsage;
use crate::state::AppState;

/// Plain-text marker served at `/`.
pub const ROOT_MARKER: &str = "tubegate";

/// Ping response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PingResponse {
    pub status: bool,
    pub timestamp: String,
    /// Seconds since the process started
    pub uptime: f64,
    pub memory_usage: MemoryUsage,
    pub environment: String,
    pub version: String,
}

/// Root marker.
pub async fn root() -> &'static str {
    ROOT_MARKER
}

/// Health payload with runtime stats.
pub async fn ping(State(state): State<AppState>) -> Json<PingResponse> {
    let snapshot = state.stats.snapshot().await;

    Json(PingResponse {
        status: true,
        timestamp: Utc::now().to_rfc3339(),
        uptime: snapshot.uptime,
        memory_usage: snapshot.memory_usage,
        environment: state.config.environment.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

//! Axum HTTP gateway.
//!
//! This crate provides:
//! - `/metadata` and `/download` behind a shared-secret access gate
//! - `/ping` runtime stats and the `/` marker
//! - Security headers, request ids and request logging
//! - Prometheus metrics

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod stats;

pub use auth::AccessGate;
pub use config::{ApiConfig, AuthStrategy, ConfigError};
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::{AppState, StateError};
pub use stats::RuntimeStats;

//! Shared-secret access gate for the metadata and download endpoints.

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, Request};
use axum::middleware::Next;
use axum::response::Response;
use sha2::{Digest, Sha256};

use crate::config::{ApiConfig, AuthStrategy, ConfigError};
use crate::error::ApiError;
use crate::state::AppState;

/// Header read by [`AuthStrategy::Header`].
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Compares caller credentials against the configured secret.
///
/// Only the SHA-256 digest of the secret is held.
#[derive(Clone)]
pub struct AccessGate {
    strategy: AuthStrategy,
    /// `None` when the gate is disabled
    secret_digest: Option<[u8; 32]>,
}

impl std::fmt::Debug for AccessGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessGate")
            .field("strategy", &self.strategy)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl AccessGate {
    /// A gate that accepts the given secret.
    pub fn new(strategy: AuthStrategy, secret: &str) -> Self {
        Self {
            strategy,
            secret_digest: Some(digest(secret)),
        }
    }

    /// A gate that lets every request through.
    pub fn disabled() -> Self {
        Self {
            strategy: AuthStrategy::default(),
            secret_digest: None,
        }
    }

    /// Build the gate from configuration. Enabled without a secret is an error.
    pub fn from_config(config: &ApiConfig) -> Result<Self, ConfigError> {
        if !config.auth_enabled {
            return Ok(Self::disabled());
        }

        config
            .api_key
            .as_deref()
            .map(|key| Self::new(config.auth_strategy, key))
            .ok_or(ConfigError::MissingApiKey)
    }

    pub fn is_enabled(&self) -> bool {
        self.secret_digest.is_some()
    }

    /// Check the request's credential.
    ///
    /// Missing or malformed credentials are `401`, wrong ones `403`.
    pub fn check(&self, headers: &HeaderMap) -> Result<(), ApiError> {
        let Some(expected) = &self.secret_digest else {
            return Ok(());
        };

        let token = match self.strategy {
            AuthStrategy::Bearer => headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .filter(|t| !t.is_empty())
                .ok_or_else(|| ApiError::unauthorized("Bearer token missing or invalid"))?,
            AuthStrategy::Header => headers
                .get(API_KEY_HEADER)
                .and_then(|v| v.to_str().ok())
                .filter(|t| !t.is_empty())
                .ok_or_else(|| ApiError::unauthorized("API key missing or invalid"))?,
        };

        if digest(token) != *expected {
            return Err(ApiError::forbidden("Invalid token"));
        }

        Ok(())
    }
}

fn digest(value: &str) -> [u8; 32] {
    Sha256::digest(value.as_bytes()).into()
}

/// Access gate middleware.
pub async fn require_access(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    state.gate.check(request.headers())?;
    Ok(next.run(request).await)
}

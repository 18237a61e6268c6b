//! Request handlers.

use serde::Deserialize;

pub mod download;
pub mod health;
pub mod metadata;

pub use download::*;
pub use health::*;
pub use metadata::*;

/// Body of `/metadata` and `/download`.
#[derive(Debug, Deserialize)]
pub struct UrlRequest {
    pub url: String,
}

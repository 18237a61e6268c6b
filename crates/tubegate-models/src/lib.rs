//! Shared data models for the tubegate gateway.
//!
//! This crate provides:
//! - `VideoReference`, the validated 11-character video id
//! - URL normalization with query-parameter and pattern strategies
//! - Serde-serializable video metadata forwarded to API callers
//! - Upstream authentication material forwarded to the video platform

pub mod metadata;
pub mod upstream;
pub mod url;
pub mod video;

// Re-export common types
pub use metadata::VideoMetadata;
pub use upstream::UpstreamAuth;
pub use url::{
    is_youtube_host, validate_source_url, ExtractStrategy, NormalizeError, NormalizeResult,
    UrlNormalizer, MAX_URL_LENGTH,
};
pub use video::{VideoReference, VIDEO_ID_LEN};

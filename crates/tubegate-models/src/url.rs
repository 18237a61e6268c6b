//! Video URL normalization.
//!
//! Turns an untrusted, user-pasted URL into a [`VideoReference`]. Two
//! extraction strategies sit behind one [`UrlNormalizer`]; both feed the same
//! id grammar, so neither can produce an empty or malformed reference.

use std::str::FromStr;

use thiserror::Error;
use url::Url;

use crate::video::VideoReference;

/// Maximum URL length accepted from callers.
pub const MAX_URL_LENGTH: usize = 2048;

/// Path prefixes that carry the id as the following segment.
const ID_PATH_MARKERS: &[&str] = &["embed", "v", "e", "shorts", "live"];

/// Id-shaped path words that name pages, not videos.
const RESERVED_IDS: &[&str] = &["videoseries"];

/// Hosts the source collaborator can stream from.
const YOUTUBE_HOSTS: &[&str] = &[
    "youtube.com",
    "youtu.be",
    "youtube-nocookie.com",
];

/// Errors that can occur while normalizing a URL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("URL cannot be empty")]
    Empty,

    #[error("URL exceeds maximum length of {} characters", MAX_URL_LENGTH)]
    TooLong,

    #[error("Invalid URL format: {0}")]
    Malformed(String),

    #[error("Invalid protocol '{0}'. Only HTTP and HTTPS are allowed")]
    UnsupportedScheme(String),

    #[error("Domain '{0}' is not a supported video platform")]
    UnsupportedHost(String),

    #[error("Video ID not found in URL")]
    MissingVideoId,

    #[error("Video ID has invalid format")]
    InvalidVideoId,
}

/// Result type for URL normalization.
pub type NormalizeResult<T> = Result<T, NormalizeError>;

/// How the id is pulled out of the URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtractStrategy {
    /// Read the `v` query parameter only.
    QueryParam,
    /// Match the id in query parameters and share/embed paths.
    #[default]
    Pattern,
}

impl ExtractStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractStrategy::QueryParam => "query",
            ExtractStrategy::Pattern => "pattern",
        }
    }
}

impl FromStr for ExtractStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "query" | "query_param" => Ok(ExtractStrategy::QueryParam),
            "pattern" | "regex" => Ok(ExtractStrategy::Pattern),
            other => Err(format!("unknown URL strategy '{}'", other)),
        }
    }
}

/// Extracts canonical video references from raw URLs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UrlNormalizer {
    strategy: ExtractStrategy,
}

impl UrlNormalizer {
    pub fn new(strategy: ExtractStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> ExtractStrategy {
        self.strategy
    }

    /// Normalize a raw URL into a video reference.
    ///
    /// Hosts are not restricted here: downstream callers only ever use
    /// [`VideoReference::watch_url`], never the raw input.
    pub fn normalize(&self, raw: &str) -> NormalizeResult<VideoReference> {
        let parsed = parse_http_url(raw)?;
        match self.strategy {
            ExtractStrategy::QueryParam => extract_from_query(&parsed),
            ExtractStrategy::Pattern => extract_with_pattern(&parsed),
        }
    }
}

/// Validate a URL the way the source collaborator would before streaming.
///
/// Stricter than [`UrlNormalizer::normalize`]: the host must be a YouTube
/// host, and the id may sit in either the query or a share/embed path.
pub fn validate_source_url(raw: &str) -> NormalizeResult<VideoReference> {
    let parsed = parse_http_url(raw)?;

    let host = parsed
        .host_str()
        .ok_or_else(|| NormalizeError::Malformed("URL must have a valid domain".to_string()))?;
    if !is_youtube_host(host) {
        return Err(NormalizeError::UnsupportedHost(host.to_string()));
    }

    extract_with_pattern(&parsed)
}

/// Check if a host (or one of its parent domains) belongs to the platform.
pub fn is_youtube_host(host: &str) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    YOUTUBE_HOSTS
        .iter()
        .any(|allowed| host == *allowed || host.ends_with(&format!(".{}", allowed)))
}

/// Trim, bound, parse and scheme-check the raw input.
fn parse_http_url(raw: &str) -> NormalizeResult<Url> {
    if raw.len() > MAX_URL_LENGTH {
        return Err(NormalizeError::TooLong);
    }

    let raw = raw.trim();
    if raw.is_empty() {
        return Err(NormalizeError::Empty);
    }

    let parsed = Url::parse(raw).map_err(|e| NormalizeError::Malformed(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(NormalizeError::UnsupportedScheme(scheme.to_string())),
    }
}

/// Read the `v` query parameter.
fn extract_from_query(parsed: &Url) -> NormalizeResult<VideoReference> {
    let id = query_video_id(parsed).ok_or(NormalizeError::MissingVideoId)?;
    parse_candidate(&id)
}

/// Look for the id in the query, the fragment, then share/embed paths.
fn extract_with_pattern(parsed: &Url) -> NormalizeResult<VideoReference> {
    if let Some(id) = query_video_id(parsed).or_else(|| fragment_video_id(parsed)) {
        return parse_candidate(&id);
    }

    let id = path_video_id(parsed).ok_or(NormalizeError::MissingVideoId)?;
    parse_candidate(id)
}

/// Decoded value of the first `v` query pair.
fn query_video_id(parsed: &Url) -> Option<String> {
    parsed
        .query_pairs()
        .find(|(key, _)| key == "v")
        .map(|(_, value)| value.into_owned())
}

/// `#v=<id>` style links.
fn fragment_video_id(parsed: &Url) -> Option<String> {
    let fragment = parsed.fragment()?;
    url::form_urlencoded::parse(fragment.as_bytes())
        .find(|(key, _)| key == "v")
        .map(|(_, value)| value.into_owned())
}

/// `youtu.be/<id>` or `/<marker>/<id>` where marker is a known share path.
fn path_video_id(parsed: &Url) -> Option<&str> {
    let mut segments = parsed.path_segments()?.filter(|s| !s.is_empty());
    let first = segments.next()?;

    let short_link = parsed
        .host_str()
        .map(|host| host.trim_end_matches('.').eq_ignore_ascii_case("youtu.be"))
        .unwrap_or(false);
    if short_link {
        return Some(first);
    }

    if ID_PATH_MARKERS.contains(&first) {
        return segments.next();
    }
    None
}

/// Shared id grammar for every strategy.
fn parse_candidate(id: &str) -> NormalizeResult<VideoReference> {
    let id = id.trim();
    if RESERVED_IDS.contains(&id) {
        return Err(NormalizeError::MissingVideoId);
    }
    VideoReference::parse(id)
}

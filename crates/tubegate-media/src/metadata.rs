//! Video metadata resolution.
//!
//! Two resolvers implement [`MetadataResolver`]:
//! - [`YtDlpResolver`] shells out to `yt-dlp --dump-single-json`
//! - [`DataApiResolver`] queries the YouTube Data API v3 with an API key

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use tubegate_models::{UpstreamAuth, VideoMetadata, VideoReference};

use crate::command::check_ytdlp;
use crate::error::{MediaError, MediaResult};
use crate::source::{classify_failure, SourceConfig};

/// Default YouTube Data API base URL.
pub const DATA_API_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

/// Resolves descriptive attributes for a video.
#[async_trait]
pub trait MetadataResolver: Send + Sync {
    /// Resolve metadata for a video.
    ///
    /// Fails with [`MediaError::VideoNotFound`] when the id does not exist and
    /// with an upstream error for anything else.
    async fn resolve(&self, video: &VideoReference, auth: &UpstreamAuth)
        -> MediaResult<VideoMetadata>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

// ============================================================================
// yt-dlp
// ============================================================================

/// Metadata through `yt-dlp --dump-single-json`.
#[derive(Debug, Clone)]
pub struct YtDlpResolver {
    config: SourceConfig,
    timeout: Duration,
}

impl YtDlpResolver {
    pub fn new(config: SourceConfig, timeout: Duration) -> Self {
        Self { config, timeout }
    }
}

/// The subset of yt-dlp's info dict that is forwarded.
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: String,
    title: Option<String>,
    description: Option<String>,
    duration: Option<f64>,
    view_count: Option<u64>,
    like_count: Option<u64>,
    channel: Option<String>,
    uploader: Option<String>,
    channel_id: Option<String>,
    upload_date: Option<String>,
    thumbnail: Option<String>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    is_live: Option<bool>,
    was_live: Option<bool>,
}

impl From<YtDlpInfo> for VideoMetadata {
    fn from(info: YtDlpInfo) -> Self {
        let is_live_content = match (info.is_live, info.was_live) {
            (None, None) => None,
            (live, was) => Some(live.unwrap_or(false) || was.unwrap_or(false)),
        };

        VideoMetadata {
            video_id: info.id,
            title: info.title,
            description: info.description,
            length_seconds: info.duration.filter(|d| *d >= 0.0).map(|d| d.round() as u64),
            view_count: info.view_count,
            like_count: info.like_count,
            author: info.channel.or(info.uploader),
            channel_id: info.channel_id,
            upload_date: info.upload_date,
            thumbnail: info.thumbnail,
            keywords: info.tags.unwrap_or_default(),
            is_live_content,
        }
    }
}

#[async_trait]
impl MetadataResolver for YtDlpResolver {
    async fn resolve(
        &self,
        video: &VideoReference,
        auth: &UpstreamAuth,
    ) -> MediaResult<VideoMetadata> {
        check_ytdlp(&self.config.binary)?;

        debug!(video_id = %video, cookie = auth.has_cookie(), "Resolving metadata with yt-dlp");

        let mut source = self.config.metadata_command(video, auth)?;

        // Dropping the future on timeout kills the child (kill_on_drop)
        let output = tokio::time::timeout(self.timeout, source.command.output())
            .await
            .map_err(|_| MediaError::Timeout(self.timeout.as_secs()))??;
        drop(source);

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!("yt-dlp stderr: {}", stderr);
            return Err(classify_failure(video, &stderr, output.status.code()));
        }

        let info: YtDlpInfo = serde_json::from_slice(&output.stdout)?;
        Ok(info.into())
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }
}

// ============================================================================
// YouTube Data API v3
// ============================================================================

/// Metadata through the YouTube Data API `videos` endpoint.
#[derive(Clone)]
pub struct DataApiResolver {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl std::fmt::Debug for DataApiResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataApiResolver")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoItem {
    id: String,
    snippet: Option<Snippet>,
    content_details: Option<ContentDetails>,
    statistics: Option<Statistics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    title: Option<String>,
    description: Option<String>,
    channel_id: Option<String>,
    channel_title: Option<String>,
    published_at: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    live_broadcast_content: Option<String>,
    thumbnails: Option<Thumbnails>,
}

#[derive(Debug, Deserialize)]
struct Thumbnails {
    maxres: Option<Thumbnail>,
    high: Option<Thumbnail>,
    medium: Option<Thumbnail>,
    default: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ContentDetails {
    duration: Option<String>,
}

/// Counters come back as decimal strings.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Statistics {
    view_count: Option<String>,
    like_count: Option<String>,
}

impl From<VideoItem> for VideoMetadata {
    fn from(item: VideoItem) -> Self {
        let mut meta = VideoMetadata::new(item.id);

        if let Some(snippet) = item.snippet {
            meta.title = snippet.title;
            meta.description = snippet.description;
            meta.channel_id = snippet.channel_id;
            meta.author = snippet.channel_title;
            meta.upload_date = snippet.published_at;
            meta.keywords = snippet.tags;
            meta.is_live_content = snippet
                .live_broadcast_content
                .map(|c| c == "live" || c == "upcoming");
            meta.thumbnail = snippet.thumbnails.and_then(|t| {
                t.maxres
                    .or(t.high)
                    .or(t.medium)
                    .or(t.default)
                    .map(|thumb| thumb.url)
            });
        }

        meta.length_seconds = item
            .content_details
            .and_then(|d| d.duration)
            .and_then(|d| parse_iso8601_duration(&d));

        if let Some(stats) = item.statistics {
            meta.view_count = stats.view_count.and_then(|v| v.parse().ok());
            meta.like_count = stats.like_count.and_then(|v| v.parse().ok());
        }

        meta
    }
}

impl DataApiResolver {
    /// Create a resolver against the public API.
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> MediaResult<Self> {
        Self::with_base_url(api_key, DATA_API_BASE_URL, timeout)
    }

    /// Create a resolver against a custom base URL.
    pub fn with_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> MediaResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl MetadataResolver for DataApiResolver {
    async fn resolve(
        &self,
        video: &VideoReference,
        _auth: &UpstreamAuth,
    ) -> MediaResult<VideoMetadata> {
        debug!(video_id = %video, "Resolving metadata with Data API");

        // Errors carry the request URL, which includes the key
        let response = self
            .http
            .get(format!("{}/videos", self.base_url))
            .query(&[
                ("part", "snippet,contentDetails,statistics"),
                ("id", video.as_str()),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| MediaError::Http(e.without_url()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), "Data API error body: {}", body);
            return Err(MediaError::upstream(
                format!("Data API returned {}", status),
                Some(status.as_u16()),
            ));
        }

        let list: VideoListResponse = response
            .json()
            .await
            .map_err(|e| MediaError::Http(e.without_url()))?;

        let item = list
            .items
            .into_iter()
            .find(|item| item.id == video.as_str())
            .ok_or_else(|| MediaError::VideoNotFound(video.to_string()))?;

        info!(video_id = %video, "Resolved metadata");
        Ok(item.into())
    }

    fn name(&self) -> &'static str {
        "data-api"
    }
}

/// Parse an ISO 8601 duration such as `PT1H2M3S` or `P1DT5M` into seconds.
pub fn parse_iso8601_duration(value: &str) -> Option<u64> {
    let rest = value.strip_prefix('P')?;
    let (date_part, time_part) = match rest.split_once('T') {
        Some((date, time)) => (date, Some(time)),
        None => (rest, None),
    };

    let mut total: u64 = 0;
    let mut seen = false;

    let mut fold = |part: &str, units: &[(char, u64)]| -> Option<()> {
        let mut number = String::new();
        for c in part.chars() {
            if c.is_ascii_digit() {
                number.push(c);
                continue;
            }
            let multiplier = units.iter().find(|(u, _)| *u == c)?.1;
            let n: u64 = number.parse().ok()?;
            total = total.checked_add(n.checked_mul(multiplier)?)?;
            number.clear();
            seen = true;
        }
        number.is_empty().then_some(())
    };

    fold(date_part, &[('W', 604_800), ('D', 86_400)])?;
    if let Some(time) = time_part {
        if time.is_empty() {
            return None;
        }
        fold(time, &[('H', 3_600), ('M', 60), ('S', 1)])?;
    }

    seen.then_some(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn video() -> VideoReference {
        VideoReference::parse("dQw4w9WgXcQ").unwrap()
    }

    #[test]
    fn test_parse_iso8601_duration() {
        assert_eq!(parse_iso8601_duration("PT3M33S"), Some(213));
        assert_eq!(parse_iso8601_duration("PT1H2M3S"), Some(3723));
        assert_eq!(parse_iso8601_duration("P1DT1S"), Some(86_401));
        assert_eq!(parse_iso8601_duration("PT0S"), Some(0));
        assert_eq!(parse_iso8601_duration("P0D"), Some(0));
        assert_eq!(parse_iso8601_duration("PT"), None);
        assert_eq!(parse_iso8601_duration("P"), None);
        assert_eq!(parse_iso8601_duration("3M33S"), None);
        assert_eq!(parse_iso8601_duration("PT3X"), None);
        assert_eq!(parse_iso8601_duration("PT33"), None);
    }

    #[test]
    fn test_ytdlp_info_conversion() {
        let info: YtDlpInfo = serde_json::from_value(json!({
            "id": "dQw4w9WgXcQ",
            "title": "Never Gonna Give You Up",
            "duration": 212.6,
            "view_count": 1500000000u64,
            "uploader": "Rick Astley",
            "channel_id": "UCuAXFkgsw1L7xaCfnd5JJOw",
            "upload_date": "20091025",
            "tags": ["rick", "astley"],
            "is_live": false,
            "formats": [{"format_id": "18"}]
        }))
        .unwrap();

        let meta = VideoMetadata::from(info);
        assert_eq!(meta.video_id, "dQw4w9WgXcQ");
        assert_eq!(meta.length_seconds, Some(213));
        assert_eq!(meta.view_count, Some(1_500_000_000));
        assert_eq!(meta.author.as_deref(), Some("Rick Astley"));
        assert_eq!(meta.keywords, vec!["rick", "astley"]);
        assert_eq!(meta.is_live_content, Some(false));
    }

    #[tokio::test]
    async fn test_data_api_resolves_video() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/videos"))
            .and(query_param("id", "dQw4w9WgXcQ"))
            .and(query_param("key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{
                    "id": "dQw4w9WgXcQ",
                    "snippet": {
                        "title": "Never Gonna Give You Up",
                        "description": "The official video",
                        "channelId": "UCuAXFkgsw1L7xaCfnd5JJOw",
                        "channelTitle": "Rick Astley",
                        "publishedAt": "2009-10-25T06:57:33Z",
                        "liveBroadcastContent": "none",
                        "thumbnails": {
                            "default": {"url": "https://i.ytimg.com/vi/dQw4w9WgXcQ/default.jpg"},
                            "high": {"url": "https://i.ytimg.com/vi/dQw4w9WgXcQ/hqdefault.jpg"}
                        }
                    },
                    "contentDetails": {"duration": "PT3M33S"},
                    "statistics": {"viewCount": "1500000000", "likeCount": "17000000"}
                }]
            })))
            .mount(&server)
            .await;

        let resolver =
            DataApiResolver::with_base_url("test-key", server.uri(), Duration::from_secs(5)).unwrap();
        let meta = resolver.resolve(&video(), &UpstreamAuth::anonymous()).await.unwrap();

        assert_eq!(meta.title.as_deref(), Some("Never Gonna Give You Up"));
        assert_eq!(meta.length_seconds, Some(213));
        assert_eq!(meta.view_count, Some(1_500_000_000));
        assert_eq!(meta.like_count, Some(17_000_000));
        assert_eq!(
            meta.thumbnail.as_deref(),
            Some("https://i.ytimg.com/vi/dQw4w9WgXcQ/hqdefault.jpg")
        );
        assert_eq!(meta.is_live_content, Some(false));
    }

    #[tokio::test]
    async fn test_data_api_empty_items_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/videos"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
            .mount(&server)
            .await;

        let resolver =
            DataApiResolver::with_base_url("test-key", server.uri(), Duration::from_secs(5)).unwrap();
        let err = resolver
            .resolve(&video(), &UpstreamAuth::anonymous())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_data_api_quota_error_is_upstream() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/videos"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": {"code": 403, "message": "quotaExceeded"}
            })))
            .mount(&server)
            .await;

        let resolver =
            DataApiResolver::with_base_url("test-key", server.uri(), Duration::from_secs(5)).unwrap();
        let err = resolver
            .resolve(&video(), &UpstreamAuth::anonymous())
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Upstream { status: Some(403), .. }));
        assert!(!err.to_string().contains("test-key"));
    }

    #[tokio::test]
    async fn test_ytdlp_resolver_reports_missing_binary() {
        let config = SourceConfig {
            binary: "/nonexistent/yt-dlp".into(),
            ..Default::default()
        };
        let resolver = YtDlpResolver::new(config, Duration::from_secs(5));
        let result = resolver.resolve(&video(), &UpstreamAuth::anonymous()).await;
        tokio_test::assert_err!(&result);
        assert!(matches!(result, Err(MediaError::YtDlpNotFound(_))));
    }
}

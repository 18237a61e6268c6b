//! Video source access through yt-dlp.
//!
//! Builds yt-dlp invocations for streaming a video to stdout and for dumping
//! its metadata, handles optional cookie authentication, and classifies
//! yt-dlp failures.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, info, warn};

use tubegate_models::{UpstreamAuth, VideoReference};

use crate::error::{MediaError, MediaResult};

/// Best single file that carries both audio and video, falling back to best overall.
pub const DEFAULT_FORMAT_SELECTOR: &str = "best[acodec!=none][vcodec!=none]/best";

/// Minimum size for a valid cookies file (bytes).
/// A real Netscape cookies file is at least ~50 bytes.
const MIN_COOKIES_FILE_SIZE: u64 = 50;

/// Writable copy of the cookies file (yt-dlp saves cookies back after use).
const TEMP_COOKIES_FILE: &str = "tubegate-cookies.txt";

/// stderr fragments meaning the video does not exist or cannot be viewed.
const NOT_FOUND_MARKERS: &[&str] = &[
    "Video unavailable",
    "Private video",
    "This video is not available",
    "This video has been removed",
    "does not exist",
    "Incomplete YouTube ID",
];

/// stderr fragments meaning the platform throttled or refused us.
const THROTTLE_MARKERS: &[&str] = &[
    "429",
    "Too Many Requests",
    "rate limit",
    "Sign in to confirm",
];

/// yt-dlp configuration shared by metadata lookups and streams.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// yt-dlp binary (name on PATH or absolute path)
    pub binary: PathBuf,
    /// yt-dlp `-f` selector for streaming
    pub format_selector: String,
    /// Netscape cookies file passed with `--cookies`
    pub cookies_file: Option<PathBuf>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("yt-dlp"),
            format_selector: DEFAULT_FORMAT_SELECTOR.to_string(),
            cookies_file: None,
        }
    }
}

/// A yt-dlp command and the per-request config file it reads.
///
/// The file holds the caller's cookie and is deleted on drop, so keep this
/// alive until the child has exited.
#[derive(Debug)]
pub struct SourceCommand {
    pub command: Command,
    pub(crate) headers: Option<NamedTempFile>,
}

impl From<Command> for SourceCommand {
    fn from(command: Command) -> Self {
        Self {
            command,
            headers: None,
        }
    }
}

impl SourceCommand {
    /// Path of the private header config, if the caller sent a cookie.
    pub fn headers_path(&self) -> Option<&Path> {
        self.headers.as_ref().map(NamedTempFile::path)
    }
}

impl SourceConfig {
    /// Arguments every invocation shares.
    fn common_args(&self, headers: Option<&Path>) -> Vec<String> {
        let mut args = vec![
            "--ignore-config".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
        ];

        if let Some(path) = &self.cookies_file {
            args.push("--cookies".to_string());
            args.push(path.to_string_lossy().to_string());
        }

        // Still honored under --ignore-config
        if let Some(path) = headers {
            args.push("--config-locations".to_string());
            args.push(path.to_string_lossy().to_string());
        }

        args
    }

    /// Arguments that stream the selected format to stdout.
    pub fn stream_args(&self, video: &VideoReference, headers: Option<&Path>) -> Vec<String> {
        let mut args = self.common_args(headers);
        args.extend([
            "--quiet".to_string(),
            "--no-part".to_string(),
            "--no-progress".to_string(),
            "-f".to_string(),
            self.format_selector.clone(),
            "-o".to_string(),
            "-".to_string(),
            "--".to_string(),
            video.watch_url(),
        ]);
        args
    }

    /// Arguments that print the video's metadata as one JSON document.
    pub fn metadata_args(&self, video: &VideoReference, headers: Option<&Path>) -> Vec<String> {
        let mut args = self.common_args(headers);
        args.extend([
            "--dump-single-json".to_string(),
            "--skip-download".to_string(),
            "--".to_string(),
            video.watch_url(),
        ]);
        args
    }

    /// Command streaming the video to stdout. The child is killed if its handle is dropped.
    pub fn stream_command(
        &self,
        video: &VideoReference,
        auth: &UpstreamAuth,
    ) -> MediaResult<SourceCommand> {
        let headers = write_header_config(auth)?;
        let mut command = Command::new(&self.binary);
        command
            .args(self.stream_args(video, headers.as_ref().map(NamedTempFile::path)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Ok(SourceCommand { command, headers })
    }

    /// Command dumping metadata JSON to stdout.
    pub fn metadata_command(
        &self,
        video: &VideoReference,
        auth: &UpstreamAuth,
    ) -> MediaResult<SourceCommand> {
        let headers = write_header_config(auth)?;
        let mut command = Command::new(&self.binary);
        command
            .args(self.metadata_args(video, headers.as_ref().map(NamedTempFile::path)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Ok(SourceCommand { command, headers })
    }
}

/// Write the caller's cookie into a private yt-dlp config file.
///
/// Keeps the cookie out of the process list. The file is created mode 0600.
fn write_header_config(auth: &UpstreamAuth) -> MediaResult<Option<NamedTempFile>> {
    let Some(cookie) = auth.cookie() else {
        return Ok(None);
    };
    if cookie.chars().any(char::is_control) {
        return Err(MediaError::internal("cookie contains control characters"));
    }

    let mut file = tempfile::Builder::new()
        .prefix("tubegate-headers-")
        .suffix(".conf")
        .tempfile()?;
    writeln!(file, "--add-header {}", quote_config_value(&format!("Cookie:{}", cookie)))?;
    file.flush()?;
    Ok(Some(file))
}

/// Single-quote a value for yt-dlp's shell-style config parser.
fn quote_config_value(value: &str) -> String {
    format!("'{}'", value.replace('\'', r#"'"'"'"#))
}

/// Turn a failed yt-dlp run into a typed error.
pub fn classify_failure(video: &VideoReference, stderr: &str, exit_code: Option<i32>) -> MediaError {
    let last_line = stderr
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("Unknown error")
        .trim();

    if NOT_FOUND_MARKERS.iter().any(|m| stderr.contains(m)) {
        return MediaError::VideoNotFound(video.to_string());
    }

    if THROTTLE_MARKERS.iter().any(|m| stderr.contains(m)) {
        warn!(video_id = %video, "Upstream rate limit or sign-in wall detected");
        return MediaError::upstream(format!("yt-dlp throttled: {}", last_line), Some(429));
    }

    MediaError::source_failed(
        format!("yt-dlp failed: {}", last_line),
        Some(stderr.to_string()),
        exit_code,
    )
}

/// Validate that a cookies file appears to be in Netscape format.
///
/// Netscape cookies files either start with "# Netscape HTTP Cookie File"
/// or contain tab-separated lines with domain entries.
pub fn is_valid_netscape_cookies(content: &str) -> bool {
    if content.starts_with("# Netscape HTTP Cookie File")
        || content.starts_with("# HTTP Cookie File")
    {
        return true;
    }

    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .any(|line| line.split('\t').count() >= 6)
}

/// Validate a configured cookies file and copy it somewhere yt-dlp can write.
///
/// Returns `None` if the file is missing, too small, or not in Netscape format.
pub async fn prepare_cookies_file(source: &Path) -> Option<PathBuf> {
    let metadata = match tokio::fs::metadata(source).await {
        Ok(m) => m,
        Err(e) => {
            warn!(path = %source.display(), "Cookies file unavailable: {}", e);
            return None;
        }
    };

    if metadata.len() < MIN_COOKIES_FILE_SIZE {
        debug!(
            path = %source.display(),
            size = metadata.len(),
            "Cookies file is too small, skipping"
        );
        return None;
    }

    match tokio::fs::read_to_string(source).await {
        Ok(content) if is_valid_netscape_cookies(&content) => {}
        Ok(_) => {
            warn!(path = %source.display(), "Cookies file is not in Netscape format, skipping");
            return None;
        }
        Err(e) => {
            warn!("Failed to read cookies file: {}", e);
            return None;
        }
    }

    let target = std::env::temp_dir().join(TEMP_COOKIES_FILE);
    if let Err(e) = tokio::fs::copy(source, &target).await {
        warn!("Failed to copy cookies file to temp: {}", e);
        return None;
    }

    info!(path = %target.display(), "Using cookies file for upstream authentication");
    Some(target)
}

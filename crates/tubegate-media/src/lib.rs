#![deny(unreachable_patterns)]
//! yt-dlp and FFmpeg wrappers for the tubegate gateway.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - yt-dlp invocations with cookie forwarding and failure classification
//! - Metadata resolution through yt-dlp or the YouTube Data API
//! - A streaming yt-dlp → FFmpeg MP3 pipeline with cancellation on drop
//! - Progress parsing from `-progress pipe:2`

pub mod command;
pub mod error;
pub mod metadata;
pub mod pipeline;
pub mod probe;
pub mod progress;
pub mod source;

pub use command::{check_ffmpeg, check_ytdlp, FfmpegCommand, DEFAULT_MP3_BITRATE_KBPS};
pub use error::{MediaError, MediaResult};
pub use metadata::{
    parse_iso8601_duration, DataApiResolver, MetadataResolver, YtDlpResolver, DATA_API_BASE_URL,
};
pub use pipeline::{AudioPipeline, AudioStream, PipelineConfig};
pub use probe::looks_like_mp3;
pub use progress::FfmpegProgress;
pub use source::{prepare_cookies_file, SourceCommand, SourceConfig, DEFAULT_FORMAT_SELECTOR};

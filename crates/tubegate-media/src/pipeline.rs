//! Streaming audio extraction: yt-dlp piped into FFmpeg.
//!
//! ```text
//!  yt-dlp stdout ──pump──▶ ffmpeg stdin
//!                          ffmpeg stdout ──supervisor──▶ mpsc(8) ──▶ AudioStream
//! ```
//!
//! Both children are spawned with `kill_on_drop`. The supervisor owns them
//! and kills both as soon as the receiving side of the channel goes away, so a
//! client disconnect tears the whole pipeline down, including while the
//! finished pipeline is being reaped. OS pipe buffers plus the bounded channel
//! keep memory use independent of the media length.

use std::collections::VecDeque;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::Stream;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::mpsc;
use tempfile::NamedTempFile;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use tubegate_models::{UpstreamAuth, VideoReference};

use crate::command::{check_ffmpeg, check_ytdlp, FfmpegCommand, DEFAULT_MP3_BITRATE_KBPS};
use crate::error::{MediaError, MediaResult};
use crate::probe::looks_like_mp3;
use crate::progress::{is_progress_line, FfmpegProgress};
use crate::source::{classify_failure, SourceCommand, SourceConfig};

/// Chunks buffered between the transcoder and the HTTP body.
const CHANNEL_CAPACITY: usize = 8;

/// Read size for transcoder output.
const CHUNK_SIZE: usize = 16 * 1024;

/// stderr lines kept per stage for error reports.
const STDERR_TAIL_LINES: usize = 20;

/// How long the source may keep running after the transcoder exited.
const SOURCE_GRACE: Duration = Duration::from_secs(5);

const METRIC_BYTES: &str = "tubegate_pipeline_bytes_total";
const METRIC_ACTIVE: &str = "tubegate_pipelines_active";
const METRIC_FAILURES: &str = "tubegate_pipeline_failures_total";

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// yt-dlp settings
    pub source: SourceConfig,
    /// FFmpeg binary (name on PATH or absolute path)
    pub ffmpeg_binary: PathBuf,
    /// MP3 bitrate in kbit/s
    pub bitrate_kbps: u32,
    /// How long to wait for the first encoded byte
    pub start_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            ffmpeg_binary: PathBuf::from("ffmpeg"),
            bitrate_kbps: DEFAULT_MP3_BITRATE_KBPS,
            start_timeout: Duration::from_secs(60),
        }
    }
}

/// Starts video-to-MP3 streams.
#[derive(Debug, Clone, Default)]
pub struct AudioPipeline {
    config: PipelineConfig,
}

impl AudioPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Start streaming a video's audio track as MP3.
    ///
    /// Resolves once the first encoded chunk is available. Failures before
    /// that point are returned here; later failures surface as an error item
    /// on the stream.
    pub async fn start(
        &self,
        video: &VideoReference,
        auth: &UpstreamAuth,
    ) -> MediaResult<AudioStream> {
        check_ytdlp(&self.config.source.binary)?;
        let ffmpeg = check_ffmpeg(&self.config.ffmpeg_binary)?;

        let source = self.config.source.stream_command(video, auth)?;
        let transcoder = FfmpegCommand::mp3_pipe(self.config.bitrate_kbps)
            .binary(ffmpeg)
            .to_command();

        info!(video_id = %video, bitrate_kbps = self.config.bitrate_kbps, "Starting audio pipeline");

        run_pipe(
            source,
            transcoder,
            PipeOptions {
                start_timeout: self.config.start_timeout,
                video: Some(video.clone()),
            },
        )
        .await
    }
}

/// Options for [`run_pipe`].
#[derive(Debug)]
pub(crate) struct PipeOptions {
    pub start_timeout: Duration,
    /// Used to classify source failures
    pub video: Option<VideoReference>,
}

/// Live MP3 byte stream.
///
/// Dropping it stops both child processes.
#[derive(Debug)]
pub struct AudioStream {
    first: Option<Bytes>,
    rx: mpsc::Receiver<MediaResult<Bytes>>,
}

impl Stream for AudioStream {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(first) = self.first.take() {
            return Poll::Ready(Some(Ok(first)));
        }

        self.rx
            .poll_recv(cx)
            .map(|item| item.map(|chunk| chunk.map_err(io::Error::other)))
    }
}

/// Decrements the active-pipeline gauge when the supervisor exits.
struct ActiveGuard;

impl ActiveGuard {
    fn new() -> Self {
        metrics::gauge!(METRIC_ACTIVE).increment(1.0);
        Self
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        metrics::gauge!(METRIC_ACTIVE).decrement(1.0);
    }
}

/// Everything the supervisor owns once the children are running.
struct Stages {
    source: Child,
    transcoder: Child,
    output: ChildStdout,
    pump: JoinHandle<io::Result<u64>>,
    source_stderr: JoinHandle<String>,
    transcoder_stderr: JoinHandle<String>,
    video: Option<VideoReference>,
    // Deleted once the supervisor is done with the source
    _headers: Option<NamedTempFile>,
}

/// Spawn `source | transcoder` and wait for the first output chunk.
pub(crate) async fn run_pipe(
    source: impl Into<SourceCommand>,
    mut transcoder: Command,
    opts: PipeOptions,
) -> MediaResult<AudioStream> {
    let SourceCommand {
        command: mut source,
        headers,
    } = source.into();
    source
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    transcoder
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut source_child = source.spawn()?;
    let mut transcoder_child = transcoder.spawn()?;

    let source_stdout = source_child
        .stdout
        .take()
        .ok_or_else(|| MediaError::internal("source stdout not captured"))?;
    let mut transcoder_stdin = transcoder_child
        .stdin
        .take()
        .ok_or_else(|| MediaError::internal("transcoder stdin not captured"))?;
    let output = transcoder_child
        .stdout
        .take()
        .ok_or_else(|| MediaError::internal("transcoder stdout not captured"))?;

    let source_stderr = tokio::spawn(drain_stderr(source_child.stderr.take(), "source", false));
    let transcoder_stderr =
        tokio::spawn(drain_stderr(transcoder_child.stderr.take(), "transcoder", true));

    let pump = tokio::spawn(async move {
        let mut reader = source_stdout;
        let copied = tokio::io::copy(&mut reader, &mut transcoder_stdin).await;
        // Closing stdin lets the transcoder flush and exit
        drop(transcoder_stdin);
        copied
    });

    let (tx, mut rx) = mpsc::channel(CHANNEL_CAPACITY);
    tokio::spawn(supervise(
        Stages {
            source: source_child,
            transcoder: transcoder_child,
            output,
            pump,
            source_stderr,
            transcoder_stderr,
            video: opts.video,
            _headers: headers,
        },
        tx,
    ));

    // Dropping rx on any early return makes the supervisor kill both children
    let first = tokio::time::timeout(opts.start_timeout, rx.recv())
        .await
        .map_err(|_| {
            metrics::counter!(METRIC_FAILURES, "kind" => "timeout").increment(1);
            MediaError::Timeout(opts.start_timeout.as_secs())
        })?
        .ok_or(MediaError::EmptyOutput)??;

    debug!(
        bytes = first.len(),
        mp3_header = looks_like_mp3(&first),
        "First audio chunk ready"
    );

    Ok(AudioStream {
        first: Some(first),
        rx,
    })
}

async fn supervise(mut stages: Stages, tx: mpsc::Sender<MediaResult<Bytes>>) {
    let _active = ActiveGuard::new();
    let mut total: u64 = 0;

    loop {
        let mut buf = BytesMut::with_capacity(CHUNK_SIZE);
        let read = tokio::select! {
            _ = tx.closed() => {
                info!(bytes = total, "Receiver gone, stopping pipeline");
                stages.kill().await;
                return;
            }
            read = stages.output.read_buf(&mut buf) => read,
        };

        match read {
            Ok(0) => break,
            Ok(n) => {
                total += n as u64;
                metrics::counter!(METRIC_BYTES).increment(n as u64);
                if tx.send(Ok(buf.freeze())).await.is_err() {
                    info!(bytes = total, "Receiver gone, stopping pipeline");
                    stages.kill().await;
                    return;
                }
            }
            Err(e) => {
                warn!("Failed to read transcoder output: {}", e);
                stages.kill().await;
                metrics::counter!(METRIC_FAILURES, "kind" => "io").increment(1);
                let _ = tx.send(Err(MediaError::Io(e))).await;
                return;
            }
        }
    }

    let outcome = tokio::select! {
        _ = tx.closed() => {
            info!(bytes = total, "Receiver gone while reaping, stopping pipeline");
            stages.kill().await;
            return;
        }
        outcome = stages.finish(total) => outcome,
    };

    match outcome {
        Ok(()) => info!(bytes = total, "Audio pipeline finished"),
        Err(e) => {
            warn!(bytes = total, kind = e.kind(), "Audio pipeline failed: {}", e);
            metrics::counter!(METRIC_FAILURES, "kind" => e.kind()).increment(1);
            let _ = tx.send(Err(e)).await;
        }
    }
}

impl Stages {
    async fn kill(&mut self) {
        if let Err(e) = self.transcoder.kill().await {
            debug!("Failed to kill transcoder: {}", e);
        }
        if let Err(e) = self.source.kill().await {
            debug!("Failed to kill source: {}", e);
        }
        self.pump.abort();
    }

    /// Reap both children after the transcoder's stdout closed.
    ///
    /// The source gets [`SOURCE_GRACE`] to finish once the transcoder is gone
    /// and is killed after that.
    async fn finish(&mut self, total: u64) -> MediaResult<()> {
        let transcoder_status = self.transcoder.wait().await?;
        let deadline = Instant::now() + SOURCE_GRACE;

        let pumped = tokio::time::timeout_at(deadline, &mut self.pump).await;
        match pumped {
            Ok(Ok(Ok(copied))) => debug!(bytes = copied, "Source fully piped"),
            // Broken pipe when the transcoder stops reading early
            Ok(Ok(Err(e))) => debug!("Pump stopped: {}", e),
            Ok(Err(e)) => debug!("Pump task failed: {}", e),
            Err(_) => {
                debug!("Pump still running after transcoder exit, aborting");
                self.pump.abort();
            }
        }

        let waited = tokio::time::timeout_at(deadline, self.source.wait()).await;
        let source_status = match waited {
            Ok(status) => status?,
            Err(_) => {
                warn!("Source still running after transcoder exit, killing it");
                if let Err(e) = self.source.kill().await {
                    debug!("Failed to kill source: {}", e);
                }
                self.source.wait().await?
            }
        };

        let source_tail = stderr_tail(&mut self.source_stderr).await;
        let transcoder_tail = stderr_tail(&mut self.transcoder_stderr).await;

        // A source that exited with a code failed on its own; a signal usually
        // means it was cut off by a dying transcoder
        if !source_status.success() && source_status.code().is_some() {
            return Err(source_error(self.video.as_ref(), source_status, source_tail));
        }

        if !transcoder_status.success() {
            return Err(MediaError::transcode_failed(
                format!("ffmpeg exited with {}", describe(transcoder_status)),
                non_empty(transcoder_tail),
                transcoder_status.code(),
            ));
        }

        if !source_status.success() {
            return Err(source_error(self.video.as_ref(), source_status, source_tail));
        }

        if total == 0 {
            return Err(MediaError::EmptyOutput);
        }

        Ok(())
    }
}

/// Collected stderr tail; empty if the drain does not finish in time.
async fn stderr_tail(drain: &mut JoinHandle<String>) -> String {
    match tokio::time::timeout(SOURCE_GRACE, &mut *drain).await {
        Ok(tail) => tail.unwrap_or_default(),
        Err(_) => {
            drain.abort();
            String::new()
        }
    }
}

fn source_error(video: Option<&VideoReference>, status: ExitStatus, stderr: String) -> MediaError {
    match video {
        Some(video) => classify_failure(video, &stderr, status.code()),
        None => MediaError::source_failed(
            format!("source exited with {}", describe(status)),
            non_empty(stderr),
            status.code(),
        ),
    }
}

fn describe(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("status {}", code),
        None => "a signal".to_string(),
    }
}

fn non_empty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}

/// Log a child's stderr and keep its last lines.
async fn drain_stderr<R>(stderr: Option<R>, stage: &'static str, parse_progress: bool) -> String
where
    R: AsyncRead + Unpin,
{
    let Some(stderr) = stderr else {
        return String::new();
    };

    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();
    let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
    let mut progress = FfmpegProgress::default();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).trim_end().to_string();
                if line.is_empty() {
                    continue;
                }

                if parse_progress && is_progress_line(&line) {
                    if let Some(snapshot) = progress.apply_line(&line) {
                        debug!(
                            stage,
                            out_time_secs = snapshot.out_time_secs(),
                            total_size = snapshot.total_size,
                            speed = snapshot.speed,
                            "Transcode progress"
                        );
                    }
                    continue;
                }

                debug!(stage, "{}", line);
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Err(e) => {
                debug!(stage, "Failed to read stderr: {}", e);
                break;
            }
        }
    }

    Vec::from(tail).join("\n")
}

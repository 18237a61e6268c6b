//! Application state.

use std::sync::Arc;

use tracing::info;

use tubegate_media::{
    prepare_cookies_file, AudioPipeline, DataApiResolver, MediaResult, MetadataResolver,
    PipelineConfig, SourceConfig, YtDlpResolver, DEFAULT_MP3_BITRATE_KBPS,
};
use tubegate_models::UrlNormalizer;

use crate::auth::AccessGate;
use crate::config::{ApiConfig, ConfigError};
use crate::stats::RuntimeStats;

/// Shared application state.
///
/// Everything here is immutable or internally synchronized; requests share
/// nothing else.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ApiConfig>,
    pub gate: AccessGate,
    pub normalizer: UrlNormalizer,
    pub resolver: Arc<dyn MetadataResolver>,
    pub pipeline: Arc<AudioPipeline>,
    pub stats: Arc<RuntimeStats>,
}

/// Errors raised while assembling the state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to create metadata resolver: {0}")]
    Resolver(#[from] tubegate_media::MediaError),
}

impl AppState {
    /// Create new application state from configuration.
    pub async fn new(config: ApiConfig) -> Result<Self, StateError> {
        let cookies_file = match &config.ytdlp_cookies_file {
            Some(path) => prepare_cookies_file(path).await,
            None => None,
        };

        let source = SourceConfig {
            binary: config.ytdlp_path.clone(),
            cookies_file,
            ..Default::default()
        };

        let resolver = build_resolver(&config, source.clone())?;
        info!(resolver = resolver.name(), "Metadata resolver ready");

        let pipeline = AudioPipeline::new(PipelineConfig {
            source,
            ffmpeg_binary: config.ffmpeg_path.clone(),
            bitrate_kbps: DEFAULT_MP3_BITRATE_KBPS,
            start_timeout: config.stream_start_timeout,
        });

        Self::with_components(config, resolver, pipeline)
    }

    /// Assemble state around an existing resolver and pipeline.
    pub fn with_components(
        config: ApiConfig,
        resolver: Arc<dyn MetadataResolver>,
        pipeline: AudioPipeline,
    ) -> Result<Self, StateError> {
        let gate = AccessGate::from_config(&config)?;
        let normalizer = UrlNormalizer::new(config.url_strategy);

        Ok(Self {
            config: Arc::new(config),
            gate,
            normalizer,
            resolver,
            pipeline: Arc::new(pipeline),
            stats: Arc::new(RuntimeStats::new()),
        })
    }
}

fn build_resolver(
    config: &ApiConfig,
    source: SourceConfig,
) -> MediaResult<Arc<dyn MetadataResolver>> {
    Ok(match &config.youtube_api_key {
        Some(key) => Arc::new(DataApiResolver::new(key.clone(), config.metadata_timeout)?),
        None => Arc::new(YtDlpResolver::new(source, config.metadata_timeout)),
    })
}

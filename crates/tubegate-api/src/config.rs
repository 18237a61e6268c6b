//! API configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tubegate_models::ExtractStrategy;

/// Configuration errors, raised at startup.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },

    #[error("API_KEY must be set when AUTH_ENABLED is true")]
    MissingApiKey,
}

/// Where the access gate reads the caller's credential from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthStrategy {
    /// `Authorization: Bearer <token>`
    #[default]
    Bearer,
    /// `X-API-Key: <token>`
    Header,
}

impl FromStr for AuthStrategy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bearer" => Ok(Self::Bearer),
            "header" | "api_key" | "x-api-key" => Ok(Self::Header),
            _ => Err(()),
        }
    }
}

/// API server configuration.
#[derive(Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Shared secret for the access gate
    pub api_key: Option<String>,
    /// Whether the access gate is enforced
    pub auth_enabled: bool,
    /// Credential location
    pub auth_strategy: AuthStrategy,
    /// YouTube Data API key; switches metadata to the Data API resolver
    pub youtube_api_key: Option<String>,
    /// Reject `/metadata` calls without a `Cookie` header
    pub require_cookies: bool,
    /// yt-dlp binary
    pub ytdlp_path: PathBuf,
    /// FFmpeg binary
    pub ffmpeg_path: PathBuf,
    /// Netscape cookies file for yt-dlp
    pub ytdlp_cookies_file: Option<PathBuf>,
    /// Video id extraction strategy
    pub url_strategy: ExtractStrategy,
    /// Time allowed until the first audio byte
    pub stream_start_timeout: Duration,
    /// Time allowed for one metadata lookup
    pub metadata_timeout: Duration,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Max request body size
    pub max_body_size: usize,
    /// Environment (development/production)
    pub environment: String,
    /// Whether `/metrics` is served
    pub metrics_enabled: bool,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("auth_enabled", &self.auth_enabled)
            .field("auth_strategy", &self.auth_strategy)
            .field("youtube_api_key", &self.youtube_api_key.as_ref().map(|_| "<redacted>"))
            .field("require_cookies", &self.require_cookies)
            .field("ytdlp_path", &self.ytdlp_path)
            .field("ffmpeg_path", &self.ffmpeg_path)
            .field("ytdlp_cookies_file", &self.ytdlp_cookies_file)
            .field("url_strategy", &self.url_strategy)
            .field("stream_start_timeout", &self.stream_start_timeout)
            .field("metadata_timeout", &self.metadata_timeout)
            .field("cors_origins", &self.cors_origins)
            .field("max_body_size", &self.max_body_size)
            .field("environment", &self.environment)
            .field("metrics_enabled", &self.metrics_enabled)
            .finish()
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            api_key: None,
            auth_enabled: true,
            auth_strategy: AuthStrategy::Bearer,
            youtube_api_key: None,
            require_cookies: false,
            ytdlp_path: PathBuf::from("yt-dlp"),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ytdlp_cookies_file: None,
            url_strategy: ExtractStrategy::Pattern,
            stream_start_timeout: Duration::from_secs(60),
            metadata_timeout: Duration::from_secs(30),
            cors_origins: vec!["*".to_string()],
            max_body_size: 64 * 1024,
            environment: "development".to_string(),
            metrics_enabled: true,
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let config = Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: parse(&var, "PORT", defaults.port)?,
            api_key: var("API_KEY"),
            auth_enabled: parse_bool(&var, "AUTH_ENABLED", defaults.auth_enabled)?,
            auth_strategy: parse(&var, "AUTH_STRATEGY", defaults.auth_strategy)?,
            youtube_api_key: var("YOUTUBE_API_KEY"),
            require_cookies: parse_bool(&var, "REQUIRE_COOKIES", defaults.require_cookies)?,
            ytdlp_path: var("YTDLP_PATH").map(PathBuf::from).unwrap_or(defaults.ytdlp_path),
            ffmpeg_path: var("FFMPEG_PATH").map(PathBuf::from).unwrap_or(defaults.ffmpeg_path),
            ytdlp_cookies_file: var("YTDLP_COOKIES_FILE").map(PathBuf::from),
            url_strategy: parse(&var, "URL_STRATEGY", defaults.url_strategy)?,
            stream_start_timeout: Duration::from_secs(parse(
                &var,
                "STREAM_START_TIMEOUT",
                defaults.stream_start_timeout.as_secs(),
            )?),
            metadata_timeout: Duration::from_secs(parse(
                &var,
                "METADATA_TIMEOUT",
                defaults.metadata_timeout.as_secs(),
            )?),
            cors_origins: var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors_origins),
            max_body_size: parse(&var, "MAX_BODY_SIZE", defaults.max_body_size)?,
            environment: var("ENVIRONMENT").unwrap_or(defaults.environment),
            metrics_enabled: parse_bool(&var, "METRICS_ENABLED", defaults.metrics_enabled)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject combinations that would leave the gateway open by accident.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth_enabled && self.api_key.is_none() {
            return Err(ConfigError::MissingApiKey);
        }
        Ok(())
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }
}

fn parse<T, F>(var: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

fn parse_bool<F>(var: &F, name: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(value) => match value.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid { name, value }),
        },
        None => Ok(default),
    }
}

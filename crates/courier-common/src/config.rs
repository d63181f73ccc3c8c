//! ---
//! trk_section: "01-core-functionality"
//! trk_subsection: "module"
//! trk_type: "source"
//! trk_scope: "code"
//! trk_description: "Shared primitives and utilities for the tracking runtime."
//! trk_version: "v0.0.0-prealpha"
//! trk_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds, DurationSeconds};
use tracing::debug;
use url::Url;

use crate::logging::LogFormat;

fn default_sample_interval() -> Duration {
    Duration::from_millis(10_000)
}

fn default_min_displacement_m() -> f64 {
    10.0
}

fn default_primary_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_primary_max_age() -> Duration {
    Duration::from_secs(120)
}

fn default_fallback_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_fallback_max_age() -> Duration {
    Duration::from_secs(300)
}

fn default_channel_url() -> Url {
    "ws://127.0.0.1:8080/ws".parse().expect("valid default channel url")
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_initial_backoff() -> Duration {
    Duration::from_secs(1)
}

fn default_gateway_base_url() -> Url {
    "http://127.0.0.1:8080".parse().expect("valid default gateway url")
}

fn default_http_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_directions_base_url() -> Url {
    "https://api.mapbox.com"
        .parse()
        .expect("valid default directions url")
}

fn default_directions_profile() -> String {
    "driving".to_owned()
}

fn default_api_enabled() -> bool {
    true
}

fn default_api_listen() -> SocketAddr {
    "0.0.0.0:8080".parse().expect("valid default api address")
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

/// Primary configuration object for the CourierLive runtime.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub directions: DirectionsConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "COURIER_CONFIG";

    /// Load configuration from disk, respecting the `COURIER_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: PathBuf) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.tracking.validate()?;
        self.channel.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Position sampler behaviour.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Interval between periodic position samples.
    #[serde(default = "default_sample_interval")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub sample_interval: Duration,
    /// Displacement below which a new sample is silently dropped, in metres.
    #[serde(default = "default_min_displacement_m")]
    pub min_displacement_m: f64,
    /// Timeout for the first acquisition attempt.
    #[serde(default = "default_primary_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub primary_timeout: Duration,
    /// Cached-position allowance for the first acquisition attempt.
    #[serde(default = "default_primary_max_age")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub primary_max_age: Duration,
    /// Timeout for the relaxed fallback attempt.
    #[serde(default = "default_fallback_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub fallback_timeout: Duration,
    /// Cached-position allowance for the fallback attempt.
    #[serde(default = "default_fallback_max_age")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub fallback_max_age: Duration,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            sample_interval: default_sample_interval(),
            min_displacement_m: default_min_displacement_m(),
            primary_timeout: default_primary_timeout(),
            primary_max_age: default_primary_max_age(),
            fallback_timeout: default_fallback_timeout(),
            fallback_max_age: default_fallback_max_age(),
        }
    }
}

impl TrackingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sample_interval < Duration::from_millis(500) {
            return Err(anyhow!(
                "tracking sample_interval must be at least 500ms, got {:?}",
                self.sample_interval
            ));
        }
        if self.min_displacement_m < 0.0 {
            return Err(anyhow!(
                "tracking min_displacement_m must be non-negative, got {}",
                self.min_displacement_m
            ));
        }
        Ok(())
    }
}

/// Update channel (WebSocket) client behaviour.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// WebSocket endpoint of the push channel.
    #[serde(default = "default_channel_url")]
    pub url: Url,
    /// Maximum automatic reconnect attempts after an unexpected disconnect.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Delay before the first reconnect attempt; doubles per attempt.
    #[serde(default = "default_initial_backoff")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub initial_backoff: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            url: default_channel_url(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            initial_backoff: default_initial_backoff(),
        }
    }
}

impl ChannelConfig {
    pub fn validate(&self) -> Result<()> {
        match self.url.scheme() {
            "ws" | "wss" => Ok(()),
            other => Err(anyhow!("channel url scheme must be ws or wss, got {other}")),
        }
    }
}

/// Location submission gateway (HTTP) behaviour.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Base URL of the backend of record.
    #[serde(default = "default_gateway_base_url")]
    pub base_url: Url,
    /// Client-side timeout applied to every submission.
    #[serde(default = "default_http_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_gateway_base_url(),
            timeout: default_http_timeout(),
        }
    }
}

/// External directions provider settings.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectionsConfig {
    #[serde(default = "default_directions_base_url")]
    pub base_url: Url,
    /// Routing profile segment of the provider URL.
    #[serde(default = "default_directions_profile")]
    pub profile: String,
    /// Provider access token; routes are skipped entirely when absent.
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_http_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub timeout: Duration,
}

impl Default for DirectionsConfig {
    fn default() -> Self {
        Self {
            base_url: default_directions_base_url(),
            profile: default_directions_profile(),
            access_token: None,
            timeout: default_http_timeout(),
        }
    }
}

/// REST/WebSocket server settings for the backend of record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_enabled")]
    pub enabled: bool,
    #[serde(default = "default_api_listen")]
    pub listen: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: default_api_enabled(),
            listen: default_api_listen(),
        }
    }
}

/// Prometheus exposition toggle for the hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
        }
    }
}

/// Logging sink settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

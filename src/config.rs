use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::trace;

use crate::history::DEFAULT_HISTORY_CAPACITY;

/// Environment variable that overrides `notification.token`
pub const DISCORD_TOKEN_ENV: &str = "UPTIME_DISCORD_TOKEN";

/// Errors raised while loading the configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration file: {0}")]
    Parse(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Storage backend configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[default]
    #[serde(rename = "none")]
    None,

    /// SQLite database file
    Sqlite {
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./uptime.db")
}

/// Timing and sizing knobs of the monitoring core
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorSettings {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Cadence of the latency-only refresh (live feed + chat message)
    #[serde(default = "default_latency_refresh_interval_ms")]
    pub latency_refresh_interval_ms: u64,

    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// How long in-flight probes may run after a shutdown request
    #[serde(default = "default_drain_grace_ms")]
    pub drain_grace_ms: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            latency_refresh_interval_ms: default_latency_refresh_interval_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            history_capacity: default_history_capacity(),
            drain_grace_ms: default_drain_grace_ms(),
        }
    }
}

impl MonitorSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn latency_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.latency_refresh_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn drain_grace(&self) -> Duration {
        Duration::from_millis(self.drain_grace_ms)
    }
}

fn default_tick_interval_ms() -> u64 {
    2000
}

fn default_latency_refresh_interval_ms() -> u64 {
    1000
}

fn default_probe_timeout_ms() -> u64 {
    5000
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

fn default_drain_grace_ms() -> u64 {
    5000
}

/// A service registered from the configuration file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    /// URL (HTTP probe) or `ip[:port]` (TCP probe)
    pub target: String,
}

/// Discord status message settings
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    /// Bot token, may be supplied through `UPTIME_DISCORD_TOKEN` instead
    #[serde(default)]
    pub token: String,
    pub channel_id: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_footer")]
    pub footer: String,
    /// Channels that get one alert message per status change
    #[serde(default)]
    pub alert_channel_ids: Vec<String>,
}

fn default_api_base() -> String {
    String::from("https://discord.com/api/v10")
}

fn default_title() -> String {
    String::from("Live Service Status")
}

fn default_footer() -> String {
    String::from("Uptime Monitor")
}

/// HTTP API settings
#[derive(Debug, Clone, Deserialize)]
pub struct ApiSettings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    pub auth_token: Option<String>,
    #[serde(default = "default_enable_cors")]
    pub enable_cors: bool,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            auth_token: None,
            enable_cors: default_enable_cors(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_enable_cors() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub monitor: MonitorSettings,

    #[serde(default)]
    pub services: Vec<ServiceConfig>,

    /// Storage configuration (defaults to in-memory)
    #[serde(default)]
    pub storage: StorageConfig,

    /// Chat notification (disabled when absent)
    pub notification: Option<NotificationConfig>,

    /// HTTP API (disabled when absent)
    pub api: Option<ApiSettings>,
}

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => ConfigFormat::Toml,
            _ => ConfigFormat::Json,
        }
    }
}

impl Config {
    /// Reject configurations the monitor cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let monitor = &self.monitor;
        if monitor.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("tick_interval_ms must be > 0".into()));
        }
        if monitor.latency_refresh_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "latency_refresh_interval_ms must be > 0".into(),
            ));
        }
        if monitor.probe_timeout_ms == 0 {
            return Err(ConfigError::Invalid("probe_timeout_ms must be > 0".into()));
        }
        if monitor.history_capacity == 0 {
            return Err(ConfigError::Invalid("history_capacity must be > 0".into()));
        }

        let mut seen = HashSet::new();
        for service in &self.services {
            if service.name.trim().is_empty() {
                return Err(ConfigError::Invalid("service name must not be empty".into()));
            }
            if service.target.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "service '{}' has an empty target",
                    service.name
                )));
            }
            if !seen.insert(service.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "service '{}' is configured twice",
                    service.name
                )));
            }
        }

        if let Some(notification) = &self.notification {
            if notification.channel_id.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "notification.channel_id must not be empty".into(),
                ));
            }
            if notification.alert_channel_ids.iter().any(|id| id.trim().is_empty()) {
                return Err(ConfigError::Invalid(
                    "notification.alert_channel_ids must not contain empty ids".into(),
                ));
            }
        }

        Ok(())
    }

    /// Apply overrides from the environment
    ///
    /// `lookup` is usually `|key| std::env::var(key).ok()`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(notification) = self.notification.as_mut()
            && let Some(token) = lookup(DISCORD_TOKEN_ENV).filter(|t| !t.is_empty())
        {
            trace!("using discord token from {DISCORD_TOKEN_ENV}");
            notification.token = token;
        }
    }
}

pub fn parse_config(content: &str, format: ConfigFormat) -> Result<Config, ConfigError> {
    let config: Config = match format {
        ConfigFormat::Json => {
            serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?
        }
        ConfigFormat::Toml => toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?,
    };
    config.validate()?;
    Ok(config)
}

pub fn read_config_file(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let file_content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&file_content, ConfigFormat::from_path(path))
        .inspect(|config| trace!("loaded config: {config:?}"))
}

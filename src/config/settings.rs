use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::runtime::DashboardOptions;
use crate::utils::constants::{
    DEFAULT_CONFIG_FOLDER, DEFAULT_HANDLER_TIMEOUT_MS, DEFAULT_METRICS_PATH,
    DEFAULT_PERSIST_INTERVAL_MS, DEFAULT_REFRESH_TIMEOUT_MS, DEFAULT_SERVER_HOST,
    DEFAULT_SERVER_PORT,
};

/// Root of the service YAML file.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct ServiceConfig {
    #[serde(default)]
    pub settings: SettingsConfig,
}

/// ================================
/// Global service-wide settings
/// ================================
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct SettingsConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub logging: Option<LoggingConfig>,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    /// Allowed CORS origins, no CORS layer when empty.
    #[serde(default)]
    pub cors_hosts: Vec<String>,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl SettingsConfig {
    pub fn dashboard_options(&self) -> DashboardOptions {
        DashboardOptions {
            path: PathBuf::from(&self.persistence.path),
            folder: self.persistence.folder.clone(),
            persist_interval: Duration::from_millis(self.persistence.interval_ms),
            handler_timeout: self.timeouts.handler_ms.map(Duration::from_millis),
            refresh_timeout: self.timeouts.refresh_ms.map(Duration::from_millis),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PersistenceConfig {
    /// Directory the config folder lives in.
    #[serde(default = "default_persistence_path")]
    pub path: String,
    #[serde(default = "default_persistence_folder")]
    pub folder: String,
    /// How often the dirty flag is checked.
    #[serde(default = "default_persist_interval_ms")]
    pub interval_ms: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            path: default_persistence_path(),
            folder: default_persistence_folder(),
            interval_ms: default_persist_interval_ms(),
        }
    }
}

/// A missing section means the defaults, a missing field inside a present
/// section means no limit.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct TimeoutsConfig {
    #[serde(default)]
    pub handler_ms: Option<u64>,
    #[serde(default)]
    pub refresh_ms: Option<u64>,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            handler_ms: Some(DEFAULT_HANDLER_TIMEOUT_MS),
            refresh_ms: Some(DEFAULT_REFRESH_TIMEOUT_MS),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_path")]
    pub path: String,
    #[serde(default)]
    pub is_enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            path: default_metrics_path(),
            is_enabled: false,
        }
    }
}

/// ================================
/// Logging
/// ================================
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String, // allowed: trace, debug, info, warn, error
    #[serde(default)]
    pub format: LogFormat,
}

impl LoggingConfig {
    pub fn new(level: String, format: LogFormat) -> Self {
        Self { level, format }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::new(default_log_level(), LogFormat::default())
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Compact,
}

fn default_host() -> String {
    DEFAULT_SERVER_HOST.to_owned()
}

fn default_port() -> String {
    DEFAULT_SERVER_PORT.to_owned()
}

fn default_persistence_path() -> String {
    ".".to_owned()
}

fn default_persistence_folder() -> String {
    DEFAULT_CONFIG_FOLDER.to_owned()
}

fn default_persist_interval_ms() -> u64 {
    DEFAULT_PERSIST_INTERVAL_MS
}

fn default_metrics_path() -> String {
    DEFAULT_METRICS_PATH.to_owned()
}

fn default_log_level() -> String {
    "info".to_owned()
}

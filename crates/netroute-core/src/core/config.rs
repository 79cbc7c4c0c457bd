//! Configuration for the netroute core
//!
//! Settings are read from a TOML file. Every field has a default, so a
//! partial file (or none at all) is valid.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use crate::constants::{DEFAULT_DISPATCH_TTL, DEFAULT_RESOURCE_LIMIT};
use crate::resources::ResourceMode;
use crate::types::{Error, Result};
use crate::{log_info, log_warn};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Session and routing settings
    #[serde(default)]
    pub network: NetworkConfig,

    /// Backoff settings for transient failures
    #[serde(default)]
    pub delayer: DelayerConfig,

    /// Shared transfer budget settings
    #[serde(default)]
    pub resources: ResourceConfig,

    /// Persisted state location
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Session and routing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Desired number of concurrent sessions per datacenter (minimum 1)
    #[serde(default = "default_session_count")]
    pub session_count: i32,

    /// Require perfect-forward-secrecy sessions
    #[serde(default)]
    pub use_pfs: bool,

    /// Hops a query may take before it is failed; negative is unlimited
    #[serde(default = "default_dispatch_ttl")]
    pub default_dispatch_ttl: i32,
}

/// Backoff settings for transient failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelayerConfig {
    /// First retry delay for internal and network errors
    #[serde(default = "default_initial_timeout_ms")]
    pub initial_timeout_ms: u64,

    /// Cap for the doubling retry delay
    #[serde(default = "default_max_timeout_ms")]
    pub max_timeout_ms: u64,

    /// Longest flood wait that is retried instead of surfaced
    #[serde(default = "default_max_flood_wait_secs")]
    pub max_flood_wait_secs: u64,
}

/// Shared transfer budget settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Scheduling mode
    #[serde(default)]
    pub mode: ResourceMode,

    /// Total budget shared by all workers, in bytes
    #[serde(default = "default_max_resource_limit")]
    pub max_resource_limit: i64,
}

/// Persisted state location
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path of the JSON key-value file; `None` keeps state in memory
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Metrics configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Print Prometheus metrics on exit
    #[serde(default)]
    pub enable_prometheus: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            session_count: default_session_count(),
            use_pfs: false,
            default_dispatch_ttl: default_dispatch_ttl(),
        }
    }
}

impl Default for DelayerConfig {
    fn default() -> Self {
        Self {
            initial_timeout_ms: default_initial_timeout_ms(),
            max_timeout_ms: default_max_timeout_ms(),
            max_flood_wait_secs: default_max_flood_wait_secs(),
        }
    }
}

impl DelayerConfig {
    /// First retry delay
    pub fn initial_timeout(&self) -> Duration {
        Duration::from_millis(self.initial_timeout_ms)
    }

    /// Cap for the doubling retry delay
    pub fn max_timeout(&self) -> Duration {
        Duration::from_millis(self.max_timeout_ms)
    }

    /// Longest flood wait that is retried
    pub fn max_flood_wait(&self) -> Duration {
        Duration::from_secs(self.max_flood_wait_secs)
    }
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            mode: ResourceMode::default(),
            max_resource_limit: default_max_resource_limit(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

// Default value functions for serde
fn default_session_count() -> i32 { 1 }
fn default_dispatch_ttl() -> i32 { DEFAULT_DISPATCH_TTL }
fn default_initial_timeout_ms() -> u64 { 1_000 }
fn default_max_timeout_ms() -> u64 { 60_000 }
fn default_max_flood_wait_secs() -> u64 { 300 }
fn default_max_resource_limit() -> i64 { DEFAULT_RESOURCE_LIMIT }
fn default_log_level() -> String { "info".to_string() }

impl Config {
    /// Reject values the core cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.resources.max_resource_limit <= 0 {
            return Err(Error::config(format!(
                "max_resource_limit must be positive, got {}",
                self.resources.max_resource_limit
            )));
        }
        if self.delayer.initial_timeout_ms == 0 {
            return Err(Error::config("initial_timeout_ms must be positive"));
        }
        if self.delayer.max_timeout_ms < self.delayer.initial_timeout_ms {
            return Err(Error::config("max_timeout_ms must not be below initial_timeout_ms"));
        }
        Ok(())
    }
}

/// Load configuration from file
pub fn load_config(path: &str) -> Result<Config> {
    let config_str = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&config_str)?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from file or use defaults
pub fn load_config_or_default(path: Option<&str>) -> Config {
    match path {
        Some(path) => {
            match load_config(path) {
                Ok(config) => {
                    log_info!("Loaded configuration from: {}", path);
                    config
                }
                Err(e) => {
                    log_warn!("Failed to load config from {}: {}. Using defaults.", path, e);
                    Config::default()
                }
            }
        }
        None => {
            log_info!("No config file specified, using defaults");
            Config::default()
        }
    }
}

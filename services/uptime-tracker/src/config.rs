//! Configuration types for the uptime tracker

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::registry::TrackedWorkload;

/// Longest retention accepted, about a century
pub const MAX_RETENTION_DAYS: u32 = 36_500;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Tracked workloads, in presentation order
    #[serde(default)]
    pub workloads: Vec<TrackedWorkload>,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Container runtime connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,
    /// TCP endpoint (e.g. `http://127.0.0.1:2375`), used instead of the socket
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_runtime_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            url: None,
            timeout: default_runtime_timeout(),
        }
    }
}

/// History store backend, tagged enum for extensibility
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    Memory,
    JsonFile {
        #[serde(default = "default_store_path")]
        path: PathBuf,
    },
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::JsonFile {
            path: default_store_path(),
        }
    }
}

/// Poll cadence and cache freshness
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub cache_ttl: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            cache_ttl: default_interval(),
        }
    }
}

/// History retention
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u32,
    /// Approximate number of days between automatic cleanups
    #[serde(default = "default_cleanup_every_days")]
    pub cleanup_every_days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_age_days: default_max_age_days(),
            cleanup_every_days: default_cleanup_every_days(),
        }
    }
}

/// HTTP API server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_server_port")]
    pub port: u16,
    /// When set, required as `x-api-key` on the operator routes
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_server_port(),
            api_key: None,
        }
    }
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("/var/run/docker.sock")
}

fn default_runtime_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_store_path() -> PathBuf {
    PathBuf::from("uptime.jsonl")
}

fn default_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_max_age_days() -> u32 {
    30
}

fn default_cleanup_every_days() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

fn default_server_port() -> u16 {
    11120
}

impl Config {
    /// Reject values the service cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.polling.interval.is_zero() {
            return Err(crate::UptimeError::Config(
                "polling.interval must be greater than zero".to_string(),
            ));
        }
        if self.retention.cleanup_every_days == 0 {
            return Err(crate::UptimeError::Config(
                "retention.cleanup_every_days must be at least 1".to_string(),
            ));
        }
        if self.retention.max_age_days > MAX_RETENTION_DAYS {
            return Err(crate::UptimeError::Config(format!(
                "retention.max_age_days must be at most {}",
                MAX_RETENTION_DAYS
            )));
        }
        if self.workloads.iter().any(|w| w.id.is_empty()) {
            return Err(crate::UptimeError::Config(
                "workload ids must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load configuration from a JSON file
pub fn load_config(path: &Path) -> crate::Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        crate::UptimeError::Config(format!("Failed to read config file {:?}: {}", path, e))
    })?;
    let config: Config = serde_json::from_str(&content)?;
    Ok(config)
}

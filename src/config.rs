//! Engine configuration.
//!
//! Values layer as: environment variables > config file > defaults.
//! The config file is YAML, typically at `<data_dir>/config.yaml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Tunables for the sync engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Quiet window before a scheduled write fires, in milliseconds.
    pub debounce_ms: u64,
    /// Maximum cached entries before eviction kicks in.
    pub cache_capacity: usize,
    /// Default TTL for cached plan snapshots, in seconds.
    pub cache_ttl_secs: u64,
    /// Replay attempts before an offline mutation is dropped.
    pub max_replay_attempts: u32,
    /// Directory for the durable offline queue.
    pub data_dir: PathBuf,
    /// Remote API base URL. None disables remote persistence.
    pub server_url: Option<String>,
    /// API key for the remote API and change feed.
    pub api_key: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 1500,
            cache_capacity: 128,
            cache_ttl_secs: 300,
            max_replay_attempts: 3,
            data_dir: Self::default_data_dir(),
            server_url: None,
            api_key: None,
        }
    }
}

impl EngineConfig {
    /// Loads configuration with priority: env vars > config file > defaults.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = match config_path {
            Some(path) if path.exists() => {
                let contents = std::fs::read_to_string(&path)
                    .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
                serde_yaml::from_str(&contents)
                    .map_err(|e| ConfigError::ParseError(path.clone(), e))?
            }
            _ => Self::default(),
        };

        if let Ok(url) = std::env::var("SEMANA_SERVER_URL") {
            config.server_url = Some(url);
        }
        if let Ok(key) = std::env::var("SEMANA_API_KEY") {
            config.api_key = Some(key);
        }
        if let Ok(dir) = std::env::var("SEMANA_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(ms) = std::env::var("SEMANA_DEBOUNCE_MS") {
            config.debounce_ms = ms
                .parse()
                .map_err(|_| ConfigError::InvalidValue("SEMANA_DEBOUNCE_MS", ms))?;
        }

        Ok(config)
    }

    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("semana")
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// True when both server URL and API key are present.
    pub fn is_remote_configured(&self) -> bool {
        self.server_url.is_some() && self.api_key.is_some()
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    InvalidValue(&'static str, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config {}: {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config {}: {}", path.display(), e)
            }
            ConfigError::InvalidValue(var, value) => {
                write!(f, "Invalid value for {}: '{}'", var, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

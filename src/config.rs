//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ingest::BufferConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub buffer: BufferSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Column store connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_url")]
    pub url: String,

    #[serde(default = "default_database")]
    pub database: String,
}

fn default_store_url() -> String {
    "http://localhost:8123".to_string()
}

fn default_database() -> String {
    "loghouse".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            database: default_database(),
        }
    }
}

/// Ingestion buffer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BufferSettings {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_flush_interval")]
    pub flush_interval_ms: u64,

    #[serde(default = "default_max_pending")]
    pub max_pending: usize,
}

fn default_batch_size() -> usize {
    1000
}

fn default_flush_interval() -> u64 {
    5000 // 5 seconds
}

fn default_max_pending() -> usize {
    100_000
}

impl Default for BufferSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval(),
            max_pending: default_max_pending(),
        }
    }
}

impl BufferSettings {
    /// Convert to the buffer's runtime configuration
    pub fn to_buffer_config(&self) -> BufferConfig {
        BufferConfig {
            batch_size: self.batch_size,
            flush_interval: Duration::from_millis(self.flush_interval_ms),
            max_pending: self.max_pending,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("loghouse").join("config.toml")),
            Some(PathBuf::from("/etc/loghouse/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("LOGHOUSE_STORE_URL") {
            self.store.url = url;
        }
        if let Ok(database) = std::env::var("LOGHOUSE_DATABASE") {
            self.store.database = database;
        }

        if let Ok(batch_size) = std::env::var("LOGHOUSE_BATCH_SIZE") {
            if let Ok(n) = batch_size.parse() {
                self.buffer.batch_size = n;
            }
        }
        if let Ok(interval) = std::env::var("LOGHOUSE_FLUSH_INTERVAL_MS") {
            if let Ok(n) = interval.parse() {
                self.buffer.flush_interval_ms = n;
            }
        }
        if let Ok(max_pending) = std::env::var("LOGHOUSE_MAX_PENDING") {
            if let Ok(n) = max_pending.parse() {
                self.buffer.max_pending = n;
            }
        }

        if let Ok(level) = std::env::var("LOGHOUSE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("LOGHOUSE_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Initialize the global tracing subscriber from logging config
pub fn init_logging(logging: &LoggingConfig) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.clone()));

    if logging.format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.buffer.batch_size, 1000);
        assert_eq!(config.buffer.flush_interval_ms, 5000);
        assert_eq!(config.buffer.max_pending, 100_000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[store]
url = "http://clickhouse:8123"
database = "logs_prod"

[buffer]
batch_size = 500
max_pending = 20000

[logging]
level = "debug"
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.store.url, "http://clickhouse:8123");
        assert_eq!(config.store.database, "logs_prod");
        assert_eq!(config.buffer.batch_size, 500);
        // Unset keys keep defaults
        assert_eq!(config.buffer.flush_interval_ms, 5000);
        assert_eq!(config.buffer.max_pending, 20_000);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_load_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[buffer\nbatch_size = ").unwrap();
        assert!(matches!(
            Config::load(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_to_buffer_config() {
        let settings = BufferSettings {
            batch_size: 10,
            flush_interval_ms: 250,
            max_pending: 50,
        };
        let config = settings.to_buffer_config();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.flush_interval, Duration::from_millis(250));
        assert_eq!(config.max_pending, 50);
    }
}

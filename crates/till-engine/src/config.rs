//! Engine runtime configuration.
//!
//! Loaded from environment variables with fallback to defaults. Business
//! settings (tax rate, loyalty rates, tier thresholds) are not part of this;
//! they live in the `settings` table and are read per transaction.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use till_db::DbConfig;

pub const ENV_DB_PATH: &str = "TILL_DB_PATH";
pub const ENV_DB_MAX_CONNECTIONS: &str = "TILL_DB_MAX_CONNECTIONS";
pub const ENV_OPERATION_TIMEOUT_MS: &str = "TILL_OPERATION_TIMEOUT_MS";
pub const ENV_NOTIFY_CHANNEL_CAPACITY: &str = "TILL_NOTIFY_CHANNEL_CAPACITY";

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// SQLite database file
    pub db_path: PathBuf,

    /// Connection pool size
    pub db_max_connections: u32,

    /// Deadline for one checkout or return operation
    pub operation_timeout: Duration,

    /// Buffered events per broadcast subscriber
    pub notify_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            db_path: PathBuf::from("./till.db"),
            db_max_connections: 5,
            operation_timeout: Duration::from_secs(10),
            notify_channel_capacity: 256,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup, using defaults for absent keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = EngineConfig::default();

        let config = EngineConfig {
            db_path: lookup(ENV_DB_PATH)
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),

            db_max_connections: lookup(ENV_DB_MAX_CONNECTIONS)
                .unwrap_or_else(|| defaults.db_max_connections.to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue(ENV_DB_MAX_CONNECTIONS.to_string()))?,

            operation_timeout: lookup(ENV_OPERATION_TIMEOUT_MS)
                .unwrap_or_else(|| defaults.operation_timeout.as_millis().to_string())
                .parse()
                .map(Duration::from_millis)
                .map_err(|_| ConfigError::InvalidValue(ENV_OPERATION_TIMEOUT_MS.to_string()))?,

            notify_channel_capacity: lookup(ENV_NOTIFY_CHANNEL_CAPACITY)
                .unwrap_or_else(|| defaults.notify_channel_capacity.to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue(ENV_NOTIFY_CHANNEL_CAPACITY.to_string()))?,
        };

        if config.db_max_connections == 0 {
            return Err(ConfigError::InvalidValue(ENV_DB_MAX_CONNECTIONS.to_string()));
        }
        if config.operation_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(ENV_OPERATION_TIMEOUT_MS.to_string()));
        }
        // tokio's broadcast channel panics on zero capacity
        if config.notify_channel_capacity == 0 {
            return Err(ConfigError::InvalidValue(ENV_NOTIFY_CHANNEL_CAPACITY.to_string()));
        }

        Ok(config)
    }

    /// Database pool configuration derived from this config.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.db_path).max_connections(self.db_max_connections)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),
}

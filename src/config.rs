// ⚙️ Configuration - store location, pool sizing and timeouts
// Defaults match the historical deployment: pool of 1..=30 connections.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const ENV_DB_PATH: &str = "ATTR_DB_PATH";
pub const ENV_POOL_MIN: &str = "ATTR_DB_POOL_MIN";
pub const ENV_POOL_MAX: &str = "ATTR_DB_POOL_MAX";
pub const ENV_CHECKOUT_TIMEOUT_MS: &str = "ATTR_DB_CHECKOUT_TIMEOUT_MS";
pub const ENV_QUERY_TIMEOUT_MS: &str = "ATTR_DB_QUERY_TIMEOUT_MS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },

    #[error("Pool bounds are invalid: min {min}, max {max}")]
    InvalidPoolBounds { min: usize, max: usize },

    #[error("Cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub database_path: PathBuf,
    pub min_pool_size: usize,
    pub max_pool_size: usize,
    pub checkout_timeout_ms: u64,
    pub query_timeout_ms: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig {
            database_path: PathBuf::from("attributes.db"),
            min_pool_size: 1,
            max_pool_size: 30,
            checkout_timeout_ms: 5_000,
            query_timeout_ms: 5_000,
        }
    }
}

impl ResolverConfig {
    /// Defaults overridden by any `ATTR_DB_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = ResolverConfig::default();

        if let Some(path) = lookup(ENV_DB_PATH) {
            config.database_path = PathBuf::from(path);
        }
        if let Some(v) = lookup(ENV_POOL_MIN) {
            config.min_pool_size = parse_number(ENV_POOL_MIN, &v)?;
        }
        if let Some(v) = lookup(ENV_POOL_MAX) {
            config.max_pool_size = parse_number(ENV_POOL_MAX, &v)?;
        }
        if let Some(v) = lookup(ENV_CHECKOUT_TIMEOUT_MS) {
            config.checkout_timeout_ms = parse_number(ENV_CHECKOUT_TIMEOUT_MS, &v)?;
        }
        if let Some(v) = lookup(ENV_QUERY_TIMEOUT_MS) {
            config.query_timeout_ms = parse_number(ENV_QUERY_TIMEOUT_MS, &v)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file; missing keys keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: ResolverConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_pool_size == 0 || self.min_pool_size > self.max_pool_size {
            return Err(ConfigError::InvalidPoolBounds {
                min: self.min_pool_size,
                max: self.max_pool_size,
            });
        }
        Ok(())
    }

    pub fn checkout_timeout(&self) -> Duration {
        Duration::from_millis(self.checkout_timeout_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

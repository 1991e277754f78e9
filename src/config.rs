//! TOML configuration for the command-line binary.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Top-level `pocket-ledger.toml` contents.
#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    /// Owner id every document is scoped to.
    pub owner: String,
    #[serde(default)]
    pub store: StoreConfig,
}

/// Store location and retry policy.
#[derive(Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path of the JSON document-set file.
    pub data_path: String,
    /// Retry attempts for retryable store failures.
    pub max_retries: Option<u32>,
    /// Initial backoff delay in milliseconds; doubles per attempt.
    pub retry_base_ms: Option<u64>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_path: "pocket-ledger.json".to_string(),
            max_retries: None,
            retry_base_ms: None,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Missing,
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Missing => write!(f, "config file not found"),
            ConfigError::Invalid(msg) => write!(f, "invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Loads the config at `path`.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let data = fs::read_to_string(path).map_err(|_| ConfigError::Missing)?;
    let cfg: Config = toml::from_str(&data).map_err(|e| ConfigError::Invalid(e.to_string()))?;
    if cfg.owner.trim().is_empty() {
        return Err(ConfigError::Invalid("owner must not be empty".to_string()));
    }
    Ok(cfg)
}

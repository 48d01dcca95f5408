//! Indexer configuration from `mines_indexer.toml` or the environment.

use std::error::Error;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::runtime::{RetryPolicy, DEFAULT_MAX_REJECTED_EVENTS};

pub const ENV_SHARDS: &str = "MINES_INDEXER_SHARDS";
pub const ENV_RETRY_MAX_ATTEMPTS: &str = "MINES_INDEXER_RETRY_MAX_ATTEMPTS";
pub const ENV_RETRY_INITIAL_BACKOFF_MS: &str = "MINES_INDEXER_RETRY_INITIAL_BACKOFF_MS";
pub const ENV_RETRY_MAX_BACKOFF_MS: &str = "MINES_INDEXER_RETRY_MAX_BACKOFF_MS";
pub const ENV_MAX_REJECTED_EVENTS: &str = "MINES_INDEXER_MAX_REJECTED_EVENTS";
pub const ENV_STORE_DIR: &str = "MINES_INDEXER_STORE_DIR";
pub const ENV_FINALITY_BLOCKS: &str = "MINES_INDEXER_FINALITY_BLOCKS";

pub const DEFAULT_CONFIG_FILE_NAME: &str = "mines_indexer.toml";
pub const DEFAULT_SHARDS: usize = 4;
pub const MAX_SHARDS: usize = 256;
pub const DEFAULT_FINALITY_BLOCKS: u64 = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexerConfig {
    pub shards: usize,
    pub retry: RetryPolicy,
    pub max_rejected_events: usize,
    /// `None` keeps entities in memory.
    pub store_dir: Option<PathBuf>,
    /// Applied events this many blocks below the head lose their undo data.
    /// Zero disables compaction.
    pub finality_blocks: u64,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            shards: DEFAULT_SHARDS,
            retry: RetryPolicy::default(),
            max_rejected_events: DEFAULT_MAX_REJECTED_EVENTS,
            store_dir: None,
            finality_blocks: DEFAULT_FINALITY_BLOCKS,
        }
    }
}

impl IndexerConfig {
    pub fn from_default_sources() -> Result<Self, ConfigError> {
        let config_path = Path::new(DEFAULT_CONFIG_FILE_NAME);
        if config_path.exists() {
            return Self::from_config_file(config_path);
        }
        Self::from_env()
    }

    /// File values win; keys missing from the file fall back to the environment.
    pub fn from_config_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|err| ConfigError::ReadConfigFile {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
        let value: toml::Value =
            toml::from_str(&content).map_err(|err| ConfigError::ParseConfigFile {
                path: path.display().to_string(),
                message: err.to_string(),
            })?;
        let table = value
            .as_table()
            .ok_or_else(|| ConfigError::ParseConfigFile {
                path: path.display().to_string(),
                message: "root is not a TOML table".to_string(),
            })?;

        Self::from_env_with(|key| {
            table
                .get(key)
                .and_then(toml_value_to_string)
                .or_else(|| std::env::var(key).ok())
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    fn from_env_with<F>(mut getter: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let shards = parse_or(&mut getter, ENV_SHARDS, defaults.shards)?;
        let retry = RetryPolicy {
            max_attempts: parse_or(&mut getter, ENV_RETRY_MAX_ATTEMPTS, defaults.retry.max_attempts)?,
            initial_backoff_ms: parse_or(
                &mut getter,
                ENV_RETRY_INITIAL_BACKOFF_MS,
                defaults.retry.initial_backoff_ms,
            )?,
            max_backoff_ms: parse_or(
                &mut getter,
                ENV_RETRY_MAX_BACKOFF_MS,
                defaults.retry.max_backoff_ms,
            )?,
            multiplier: defaults.retry.multiplier,
        };
        let max_rejected_events = parse_or(
            &mut getter,
            ENV_MAX_REJECTED_EVENTS,
            defaults.max_rejected_events,
        )?;
        let finality_blocks =
            parse_or(&mut getter, ENV_FINALITY_BLOCKS, defaults.finality_blocks)?;
        let store_dir = getter(ENV_STORE_DIR)
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        let config = Self {
            shards,
            retry,
            max_rejected_events,
            store_dir,
            finality_blocks,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shards == 0 || self.shards > MAX_SHARDS {
            return Err(ConfigError::InvalidValue {
                key: ENV_SHARDS,
                value: self.shards.to_string(),
                reason: format!("must be in 1..={MAX_SHARDS}"),
            });
        }
        if self.max_rejected_events == 0 {
            return Err(ConfigError::InvalidValue {
                key: ENV_MAX_REJECTED_EVENTS,
                value: "0".to_string(),
                reason: "must be >= 1".to_string(),
            });
        }
        self.retry
            .validate()
            .map_err(|reason| ConfigError::InvalidRetryPolicy { reason })
    }
}

fn toml_value_to_string(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(value) => Some(value.clone()),
        toml::Value::Integer(value) => Some(value.to_string()),
        toml::Value::Boolean(value) => Some(value.to_string()),
        _ => None,
    }
}

fn parse_or<F, T>(getter: &mut F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match getter(key) {
        Some(value) => value.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
            key,
            reason: "not an unsigned integer".to_string(),
            value,
        }),
        None => Ok(default),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
    InvalidRetryPolicy {
        reason: String,
    },
    ReadConfigFile {
        path: String,
        message: String,
    },
    ParseConfigFile {
        path: String,
        message: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidValue { key, value, reason } => {
                write!(f, "invalid value for {key} ({value}): {reason}")
            }
            ConfigError::InvalidRetryPolicy { reason } => {
                write!(f, "invalid retry policy: {reason}")
            }
            ConfigError::ReadConfigFile { path, message } => {
                write!(f, "read config file failed ({path}): {message}")
            }
            ConfigError::ParseConfigFile { path, message } => {
                write!(f, "parse config file failed ({path}): {message}")
            }
        }
    }
}

impl Error for ConfigError {}

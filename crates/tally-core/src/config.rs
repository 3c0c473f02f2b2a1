//! Engine configuration loaded from TOML.

use crate::error::InternalError;
use serde::Deserialize;
use thiserror::Error as ThisError;

///
/// CONSTANTS
///

/// Queued entries that trigger a background commit.
pub const DEFAULT_COMMIT_THRESHOLD: usize = 200;

/// Worker threads used for per-key processing inside one commit phase.
pub const DEFAULT_COMMIT_WORKERS: usize = 4;

/// Child store that holds chained stages.
pub const DEFAULT_CHAIN_STORE: &str = "chain";

///
/// ConfigError
///

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("invalid engine config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("commit_workers must be at least 1")]
    NoWorkers,

    #[error("chain_store must not be empty")]
    EmptyChainStore,
}

impl From<ConfigError> for InternalError {
    fn from(err: ConfigError) -> Self {
        Self::config_unsupported(err.to_string())
    }
}

///
/// EngineConfig
///
/// commit_threshold → 0 disables background commits entirely.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub commit_threshold: usize,
    pub commit_workers: usize,
    pub chain_store: String,
}

impl EngineConfig {
    /// Parse and validate a TOML document; missing fields take defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.commit_workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.chain_store.is_empty() {
            return Err(ConfigError::EmptyChainStore);
        }

        Ok(())
    }

    #[must_use]
    pub const fn with_commit_threshold(mut self, threshold: usize) -> Self {
        self.commit_threshold = threshold;
        self
    }

    #[must_use]
    pub const fn with_commit_workers(mut self, workers: usize) -> Self {
        self.commit_workers = workers;
        self
    }

    /// True when queue growth alone never schedules a commit.
    #[must_use]
    pub const fn auto_commit_disabled(&self) -> bool {
        self.commit_threshold == 0
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            commit_threshold: DEFAULT_COMMIT_THRESHOLD,
            commit_workers: DEFAULT_COMMIT_WORKERS,
            chain_store: DEFAULT_CHAIN_STORE.to_string(),
        }
    }
}

///
/// TESTS
///

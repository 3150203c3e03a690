//! Configuration for the version chain manager.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default bound on a single ledger call, in milliseconds.
const DEFAULT_LEDGER_TIMEOUT_MS: u64 = 5_000;

/// Default bound on version-number retry attempts.
const DEFAULT_MAX_COMMIT_RETRIES: u32 = 3;

/// Default maximum content size (10 MiB).
const DEFAULT_MAX_CONTENT_SIZE: usize = 10 * 1024 * 1024;

/// Default maximum note length in characters.
const DEFAULT_MAX_NOTE_LEN: usize = 512;

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The TOML could not be parsed.
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A field has an unusable value.
    #[error("invalid config value: {detail}")]
    Invalid {
        /// Which field and why.
        detail: String,
    },
}

/// Chain manager configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Bound on each ledger call; a timeout is treated as the ledger being
    /// unreachable.
    #[serde(default = "default_ledger_timeout_ms")]
    pub ledger_timeout_ms: u64,

    /// Bound on version-number recomputation attempts when a concurrent
    /// writer won the `(proposal_id, version_number)` race.
    #[serde(default = "default_max_commit_retries")]
    pub max_commit_retries: u32,

    /// Maximum content size accepted for a commit, in bytes.
    #[serde(default = "default_max_content_size")]
    pub max_content_size: usize,

    /// Maximum note length accepted for a commit, in characters.
    #[serde(default = "default_max_note_len")]
    pub max_note_len: usize,

    /// Submitter identity recorded on ledger anchors.
    #[serde(default)]
    pub submitter: String,

    /// Anchor every commit to the ledger even when the request does not
    /// ask for it.
    #[serde(default)]
    pub anchor_by_default: bool,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            ledger_timeout_ms: DEFAULT_LEDGER_TIMEOUT_MS,
            max_commit_retries: DEFAULT_MAX_COMMIT_RETRIES,
            max_content_size: DEFAULT_MAX_CONTENT_SIZE,
            max_note_len: DEFAULT_MAX_NOTE_LEN,
            submitter: String::new(),
            anchor_by_default: false,
        }
    }
}

impl ChainConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or a value is unusable.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates field values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for zero timeouts, zero retry
    /// budgets, or zero size bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ledger_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                detail: "ledger_timeout_ms must be positive".to_string(),
            });
        }
        if self.max_commit_retries == 0 {
            return Err(ConfigError::Invalid {
                detail: "max_commit_retries must be positive".to_string(),
            });
        }
        if self.max_content_size == 0 {
            return Err(ConfigError::Invalid {
                detail: "max_content_size must be positive".to_string(),
            });
        }
        Ok(())
    }
}

fn default_ledger_timeout_ms() -> u64 {
    DEFAULT_LEDGER_TIMEOUT_MS
}

fn default_max_commit_retries() -> u32 {
    DEFAULT_MAX_COMMIT_RETRIES
}

fn default_max_content_size() -> usize {
    DEFAULT_MAX_CONTENT_SIZE
}

fn default_max_note_len() -> usize {
    DEFAULT_MAX_NOTE_LEN
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ChainConfig::default();
        assert_eq!(config.ledger_timeout_ms, DEFAULT_LEDGER_TIMEOUT_MS);
        assert_eq!(config.max_commit_retries, DEFAULT_MAX_COMMIT_RETRIES);
        assert_eq!(config.max_content_size, DEFAULT_MAX_CONTENT_SIZE);
        assert_eq!(config.max_note_len, DEFAULT_MAX_NOTE_LEN);
        assert!(config.submitter.is_empty());
        assert!(!config.anchor_by_default);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_partial() {
        let config = ChainConfig::from_toml(
            r#"
            ledger_timeout_ms = 250
            submitter = "client-a"
            anchor_by_default = true
            "#,
        )
        .unwrap();

        assert_eq!(config.ledger_timeout_ms, 250);
        assert_eq!(config.submitter, "client-a");
        assert!(config.anchor_by_default);
        assert_eq!(config.max_note_len, DEFAULT_MAX_NOTE_LEN);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let result = ChainConfig::from_toml("ledger_timeout_ms = 0");
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_zero_retries_rejected() {
        let result = ChainConfig::from_toml("max_commit_retries = 0");
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_invalid_toml() {
        let result = ChainConfig::from_toml("ledger_timeout_ms = \"soon\"");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}

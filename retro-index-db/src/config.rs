//! Engine configuration, loadable from TOML.
//!
//! Every field has a default, so an empty document (or no file at all)
//! yields a working setup:
//!
//! ```toml
//! batch_size = 5000
//! read_pool_size = 4
//!
//! [pragmas.write]
//! synchronous = "OFF"
//! temp_store = "MEMORY"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    /// Capacity hint for the batch inserters of a batch-mode transaction.
    pub batch_size: usize,
    /// Read-only connections opened next to the writer. Ignored in memory.
    pub read_pool_size: usize,
    pub busy_timeout_ms: u64,
    pub cache_size_kib: i64,
    pub foreign_keys: bool,
    /// Run `PRAGMA wal_checkpoint(TRUNCATE)` after each commit.
    pub checkpoint_after_commit: bool,
    pub pragmas: PragmaConfig,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            batch_size: 5000,
            read_pool_size: 4,
            busy_timeout_ms: 5000,
            cache_size_kib: 65536,
            foreign_keys: true,
            checkpoint_after_commit: true,
            pragmas: PragmaConfig::default(),
        }
    }
}

impl DbConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: DbConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file, falling back to defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be positive".into()));
        }
        if self.cache_size_kib < 0 {
            return Err(ConfigError::Invalid("cache_size_kib cannot be negative".into()));
        }
        Ok(())
    }
}

/// Pragmas for normal operation and for the span of a write transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PragmaConfig {
    pub default: PragmaSet,
    pub write: PragmaSet,
}

impl Default for PragmaConfig {
    fn default() -> Self {
        Self {
            default: PragmaSet {
                synchronous: Synchronous::Normal,
                temp_store: TempStore::Memory,
            },
            write: PragmaSet {
                synchronous: Synchronous::Off,
                temp_store: TempStore::Memory,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PragmaSet {
    pub synchronous: Synchronous,
    pub temp_store: TempStore,
}

impl PragmaSet {
    pub fn to_sql(&self) -> String {
        format!(
            "PRAGMA synchronous = {}; PRAGMA temp_store = {};",
            self.synchronous.as_str(),
            self.temp_store.as_str()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Synchronous {
    Off,
    Normal,
    Full,
}

impl Synchronous {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Normal => "NORMAL",
            Self::Full => "FULL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TempStore {
    Default,
    File,
    Memory,
}

impl TempStore {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "DEFAULT",
            Self::File => "FILE",
            Self::Memory => "MEMORY",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_default() {
        assert_eq!(DbConfig::from_toml_str("").unwrap(), DbConfig::default());
    }

    #[test]
    fn partial_override() {
        let config = DbConfig::from_toml_str(
            r#"
            batch_size = 200
            read_pool_size = 0

            [pragmas.write]
            synchronous = "FULL"
            temp_store = "FILE"
            "#,
        )
        .unwrap();
        assert_eq!(config.batch_size, 200);
        assert_eq!(config.read_pool_size, 0);
        assert_eq!(config.pragmas.write.synchronous, Synchronous::Full);
        assert_eq!(config.pragmas.default.synchronous, Synchronous::Normal);
        assert_eq!(
            config.pragmas.write.to_sql(),
            "PRAGMA synchronous = FULL; PRAGMA temp_store = FILE;"
        );
    }

    #[test]
    fn zero_batch_size_rejected() {
        assert!(matches!(
            DbConfig::from_toml_str("batch_size = 0"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = DbConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, DbConfig::default());
    }
}

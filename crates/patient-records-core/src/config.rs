//! Runtime configuration.
//!
//! Loaded from TOML, then overridden by `PATIENT_RECORDS_*` environment
//! variables, then validated. Every key is optional.
//!
//! ```toml
//! database_path = "/var/lib/cabinet/patients.db"
//! max_backups = 20
//! log_filter = "patient_records_core=debug"
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::store::DEFAULT_MAX_BACKUPS;

const ENV_DATABASE_PATH: &str = "PATIENT_RECORDS_DATABASE_PATH";
const ENV_MAX_BACKUPS: &str = "PATIENT_RECORDS_MAX_BACKUPS";
const ENV_LOG_FILTER: &str = "PATIENT_RECORDS_LOG_FILTER";

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Patient records configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordsConfig {
    /// SQLite file; `:memory:` for an in-memory database
    pub database_path: String,
    /// Snapshots kept after each backup; 0 keeps all
    pub max_backups: usize,
    /// Default tracing filter when `RUST_LOG` is unset
    pub log_filter: String,
}

impl Default for RecordsConfig {
    fn default() -> Self {
        Self {
            database_path: "patient_records.db".to_string(),
            max_backups: DEFAULT_MAX_BACKUPS,
            log_filter: "info".to_string(),
        }
    }
}

impl RecordsConfig {
    /// In-memory configuration (for testing).
    pub fn in_memory() -> Self {
        Self {
            database_path: ":memory:".to_string(),
            ..Self::default()
        }
    }

    /// Parse TOML without environment overrides.
    pub fn from_toml_str(contents: &str) -> ConfigResult<Self> {
        let config: RecordsConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML file, apply environment overrides and validate.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let mut config: RecordsConfig = toml::from_str(&contents)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `PATIENT_RECORDS_*` variables from the process environment.
    pub fn apply_env_overrides(&mut self) -> ConfigResult<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<()> {
        if let Some(path) = lookup(ENV_DATABASE_PATH) {
            self.database_path = path;
        }
        if let Some(max) = lookup(ENV_MAX_BACKUPS) {
            self.max_backups = max.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("{} must be a non-negative integer", ENV_MAX_BACKUPS))
            })?;
        }
        if let Some(filter) = lookup(ENV_LOG_FILTER) {
            self.log_filter = filter;
        }
        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.database_path.trim().is_empty() {
            return Err(ConfigError::Invalid("database_path cannot be empty".into()));
        }
        if self.log_filter.trim().is_empty() {
            return Err(ConfigError::Invalid("log_filter cannot be empty".into()));
        }
        Ok(())
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_path == ":memory:"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = RecordsConfig::from_toml_str("").unwrap();
        assert_eq!(config, RecordsConfig::default());
        assert_eq!(config.max_backups, 10);
        assert!(!config.is_in_memory());
        assert!(RecordsConfig::in_memory().is_in_memory());
    }

    #[test]
    fn test_partial_toml() {
        let config = RecordsConfig::from_toml_str("max_backups = 3\n").unwrap();
        assert_eq!(config.max_backups, 3);
        assert_eq!(config.database_path, "patient_records.db");
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            RecordsConfig::from_toml_str("database_path = \"  \""),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            RecordsConfig::from_toml_str("max_backups = \"many\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_DATABASE_PATH, "/tmp/override.db"),
            (ENV_MAX_BACKUPS, " 4 "),
        ]
        .into_iter()
        .collect();

        let mut config = RecordsConfig::default();
        config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.database_path, "/tmp/override.db");
        assert_eq!(config.max_backups, 4);
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn test_bad_override() {
        let mut config = RecordsConfig::default();
        let result = config.apply_overrides(|key| {
            (key == ENV_MAX_BACKUPS).then(|| "-1".to_string())
        });
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.toml");
        std::fs::write(&path, "database_path = \"cabinet.db\"\nlog_filter = \"debug\"\n").unwrap();

        let config = RecordsConfig::load(&path).unwrap();
        assert_eq!(config.log_filter, "debug");

        assert!(matches!(
            RecordsConfig::load(dir.path().join("missing.toml")),
            Err(ConfigError::Io { .. })
        ));
    }
}

use crate::error::ConfigError;
use crate::loader::LoadOptions;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Run configuration, read from an optional TOML file. Every key has a default.
///
/// ```toml
/// [database]
/// path = "listings.db"
/// wal = true
///
/// [load]
/// tax_year = 2024
/// reset_before_load = false
///
/// [logging]
/// filter = "property_etl=info"
/// json_dir = "logs"
/// ```
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EtlConfig {
    pub database: DatabaseConfig,
    pub load: LoadConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub wal: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            path: PathBuf::from("listings.db"),
            wal: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LoadConfig {
    pub tax_year: Option<i32>,
    pub reset_before_load: bool,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// EnvFilter directive; RUST_LOG takes precedence when set
    pub filter: String,
    /// Directory for daily-rotated JSON logs; console only when unset
    pub json_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            filter: "property_etl=info".to_string(),
            json_dir: None,
        }
    }
}

impl EtlConfig {
    /// Defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => {
                let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })?;
                Self::from_toml_str(&content)
            }
            None => Ok(EtlConfig::default()),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            tax_year: self.load.tax_year,
            reset_before_load: self.load.reset_before_load,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_file() {
        let config = EtlConfig::load(None).unwrap();

        assert_eq!(config.database.path, PathBuf::from("listings.db"));
        assert!(config.database.wal);
        assert_eq!(config.load.tax_year, None);
        assert!(!config.load.reset_before_load);
        assert_eq!(config.logging.filter, "property_etl=info");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = EtlConfig::from_toml_str(
            "[load]\ntax_year = 2023\n\n[database]\npath = \"/tmp/etl.db\"\n",
        )
        .unwrap();

        assert_eq!(config.load.tax_year, Some(2023));
        assert_eq!(config.database.path, PathBuf::from("/tmp/etl.db"));
        assert!(config.database.wal);
        assert_eq!(config.load_options().tax_year, Some(2023));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let err = EtlConfig::from_toml_str("[database]\nhost = \"localhost\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn test_missing_file_is_error() {
        let err = EtlConfig::load(Some(Path::new("/nonexistent/etl.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}

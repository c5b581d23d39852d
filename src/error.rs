// ⚠️ Error taxonomy for the listing ETL
// Extraction and load errors are fatal to a run; embedded-list parse
// failures never surface here (they degrade to "no child rows").

use crate::loader::LoadPhase;
use thiserror::Error;

/// The source document could not be read or is not an array of objects.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("failed to read source document '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("source document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("source document must be a JSON array of objects, found {found}")]
    NotAnArray { found: &'static str },

    #[error("record {index} is not a JSON object (found {found})")]
    NotAnObject { index: usize, found: &'static str },
}

/// The store rejected a batch; the phase's transaction has been rolled back.
#[derive(Error, Debug)]
#[error("load phase '{phase}' failed: {source}")]
pub struct LoadError {
    pub phase: LoadPhase,
    #[source]
    pub source: rusqlite::Error,
}

impl LoadError {
    pub fn new(phase: LoadPhase, source: rusqlite::Error) -> Self {
        LoadError { phase, source }
    }
}

#[derive(Error, Debug)]
pub enum ValidatorError {
    #[error("validation query failed: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("'{0}' is not a child table keyed by property_id")]
    NotAChildTable(String),

    #[error("unknown table '{0}'")]
    UnknownTable(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("cannot create log directory '{path}': {source}")]
    LogDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot open log file in '{path}': {source}")]
    LogFile {
        path: String,
        #[source]
        source: tracing_appender::rolling::InitError,
    },
}

/// Top-level error for a pipeline run.
#[derive(Error, Debug)]
pub enum EtlError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Validator(#[from] ValidatorError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, EtlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_error_names_phase() {
        let err = LoadError::new(
            LoadPhase::RehabDetails,
            rusqlite::Error::InvalidQuery,
        );
        let message = err.to_string();

        assert!(message.contains("rehab_details"), "message: {}", message);
        assert_eq!(err.phase, LoadPhase::RehabDetails);
    }

    #[test]
    fn test_top_level_error_is_transparent() {
        let err: EtlError = ExtractionError::NotAnObject { index: 3, found: "string" }.into();

        assert_eq!(err.to_string(), "record 3 is not a JSON object (found string)");
    }
}

// Property ETL - Core Library
// Normalizing loader and post-load validator for real-estate listing records

pub mod coercion;
pub mod config;
pub mod db;
pub mod embedded;
pub mod error;
pub mod loader;
pub mod logging;
pub mod models;
pub mod source;
pub mod validator;

// Re-export commonly used types
pub use coercion::{clean, CleanRecord, CoercionRule, TargetType, NUMERIC_FIELDS};
pub use config::EtlConfig;
pub use db::{reset_schema, setup_database, Store, Table};
pub use embedded::{parse_embedded_list, EmbeddedList};
pub use error::{ConfigError, EtlError, ExtractionError, LoadError, ValidatorError};
pub use loader::{run_etl, IdMapping, LoadOptions, LoadPhase, LoadReport, NormalizingLoader};
pub use models::{
    HoaRow, LeadRow, PropertyRow, RehabDetailRow, RehabEstimateRow, RehabFlags, TaxRow,
    ValuationRow,
};
pub use source::{extract, extract_file, SourceDocument, SourceRecord};
pub use validator::{
    FanOut, IntegrityCheck, PostLoadValidator, QualityReport, RangeStat, ValidationReport,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

use crate::config::LoggingConfig;
use crate::error::ConfigError;
use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber: console output plus, when `json_dir` is
/// set, a daily-rotated JSON file. Keep the returned guard alive until exit
/// so buffered file logs are flushed.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>, ConfigError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let console_layer = fmt::layer().with_writer(std::io::stderr);

    let (file_layer, guard) = match &config.json_dir {
        Some(dir) => {
            let file_appender = json_appender(dir)?;
            let (writer, guard) = tracing_appender::non_blocking(file_appender);
            (Some(fmt::layer().json().with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();

    Ok(guard)
}

fn json_appender(dir: &std::path::Path) -> Result<RollingFileAppender, ConfigError> {
    let path = dir.display().to_string();
    fs::create_dir_all(dir).map_err(|source| ConfigError::LogDir {
        path: path.clone(),
        source,
    })?;

    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("property-etl")
        .filename_suffix("log")
        .build(dir)
        .map_err(|source| ConfigError::LogFile { path, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_json_dir_under_a_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "x").unwrap();

        let err = json_appender(&blocker.join("logs")).unwrap_err();

        assert!(matches!(err, ConfigError::LogDir { .. }), "got {:?}", err);
    }

    #[test]
    fn test_json_appender_creates_directory() {
        let dir = TempDir::new().unwrap();
        let logs = dir.path().join("logs");

        json_appender(&logs).unwrap();

        assert!(logs.is_dir());
    }
}

//! Tracing subscriber setup.
//!
//! Console output always; a daily-rolling log file when configured. The
//! filter comes from `RUST_LOG` when set, otherwise from the configured
//! level.
//!
//! ```ignore
//! let _guard = init_logging(&LoggingConfig::default().with_file("/var/log/livetrack/client.log"))?;
//! ```

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Default filter directive.
pub const DEFAULT_LEVEL: &str = "info";

/// Errors from [`init_logging`].
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log level '{level}': {reason}")]
    InvalidLevel { level: String, reason: String },

    #[error("log file path has no file name: {0}")]
    InvalidFile(PathBuf),

    #[error("failed to install tracing subscriber: {0}")]
    Init(String),
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `livetrack=debug,warn`.
    pub level: String,
    /// Also write to this file, rolled daily.
    pub file: Option<PathBuf>,
    /// Colored console output.
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LEVEL.to_string(),
            file: None,
            ansi: true,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_ansi(mut self, ansi: bool) -> Self {
        self.ansi = ansi;
        self
    }
}

/// Keeps the file writer alive; drop it last to flush buffered lines.
#[derive(Debug)]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

/// Install the global tracing subscriber.
///
/// Fails if a subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<LoggingGuard, LoggingError> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| build_filter(&config.level))?;

    let console = fmt::layer()
        .with_target(true)
        .with_ansi(config.ansi)
        .with_timer(LocalTime::rfc_3339());

    let (file_layer, guard) = match &config.file {
        Some(path) => {
            let (directory, file_name) = split_log_path(path)?;
            let appender = tracing_appender::rolling::daily(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_timer(LocalTime::rfc_3339())
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))?;

    Ok(LoggingGuard { _file: guard })
}

/// Filter for `level`, or [`DEFAULT_LEVEL`] when it is blank.
fn build_filter(level: &str) -> Result<EnvFilter, LoggingError> {
    let level = match level.trim() {
        "" => DEFAULT_LEVEL,
        other => other,
    };
    EnvFilter::try_new(level).map_err(|e| LoggingError::InvalidLevel {
        level: level.to_string(),
        reason: e.to_string(),
    })
}

fn split_log_path(path: &Path) -> Result<(PathBuf, PathBuf), LoggingError> {
    let file_name = path
        .file_name()
        .ok_or_else(|| LoggingError::InvalidFile(path.to_path_buf()))?;
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((directory, PathBuf::from(file_name)))
}

/// Structured logging for the air-quality service.
///
/// Every record carries the component that produced it and, where one
/// applies, the sensor or station identifier. Records go through `tracing`;
/// `init_logger` installs a console layer and, optionally, a plain-text file
/// layer for daemon operation.
///
/// Failure helpers classify errors as expected (sensor offline, channel
/// missing), unexpected (HTTP, database, parse failures) or unknown, and
/// pick the log level from that.

use crate::ingest::IngestError;
use crate::model::StoreError;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt as tfmt, prelude::*};

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// Directive understood by `EnvFilter`.
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" | "trace" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    PurpleAir,
    Weather,
    Store,
    Qa,
    Detect,
    Tools,
    System,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::PurpleAir => write!(f, "PURPLEAIR"),
            Component::Weather => write!(f, "WEATHER"),
            Component::Store => write!(f, "DB"),
            Component::Qa => write!(f, "QA"),
            Component::Detect => write!(f, "DETECT"),
            Component::Tools => write!(f, "TOOLS"),
            Component::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// Expected failure - sensor offline, a channel missing, or no data yet
    Expected,
    /// Unexpected failure - indicates service degradation or configuration issue
    Unexpected,
    /// Unknown - cannot determine if this is expected or not
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// ---------------------------------------------------------------------------
// Subscriber setup
// ---------------------------------------------------------------------------

/// Keeps the non-blocking file writer flushing for the life of the process.
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Installs the global subscriber.
///
/// `RUST_LOG`, when set, overrides `min_level`. Calling this more than once
/// is harmless; only the first call installs anything.
pub fn init_logger(min_level: LogLevel, log_file: Option<&Path>, console_timestamps: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(min_level.as_filter()));

    let timed_console = console_timestamps.then(|| {
        tfmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
    });
    let plain_console = (!console_timestamps).then(|| {
        tfmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .without_time()
    });

    let file_layer = log_file.and_then(|path| {
        let file_name = path.file_name()?;
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let appender = tracing_appender::rolling::never(dir, file_name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        if FILE_GUARD.set(guard).is_err() {
            return None;
        }
        Some(tfmt::layer().with_writer(writer).with_ansi(false))
    });

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(timed_console)
        .with(plain_console)
        .with(file_layer)
        .try_init()
        .is_ok();

    if installed {
        debug(Component::System, None, &format!("Logger initialized at {}", min_level));
    }
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

macro_rules! emit {
    ($level:ident, $component:expr, $sensor:expr, $message:expr) => {
        match $sensor {
            Some(id) => tracing::$level!(component = %$component, sensor = id, "{}", $message),
            None => tracing::$level!(component = %$component, "{}", $message),
        }
    };
}

/// Log a general informational message
pub fn info(component: Component, sensor_id: Option<&str>, message: &str) {
    emit!(info, component, sensor_id, message);
}

/// Log a warning message
pub fn warn(component: Component, sensor_id: Option<&str>, message: &str) {
    emit!(warn, component, sensor_id, message);
}

/// Log an error message
pub fn error(component: Component, sensor_id: Option<&str>, message: &str) {
    emit!(error, component, sensor_id, message);
}

/// Log a debug message
pub fn debug(component: Component, sensor_id: Option<&str>, message: &str) {
    emit!(debug, component, sensor_id, message);
}

fn at_level(level: LogLevel, component: Component, sensor_id: Option<&str>, message: &str) {
    match level {
        LogLevel::Debug => debug(component, sensor_id, message),
        LogLevel::Info => info(component, sensor_id, message),
        LogLevel::Warning => warn(component, sensor_id, message),
        LogLevel::Error => error(component, sensor_id, message),
    }
}

fn level_for(failure: &FailureType) -> LogLevel {
    match failure {
        FailureType::Expected => LogLevel::Debug,
        FailureType::Unexpected => LogLevel::Error,
        FailureType::Unknown => LogLevel::Warning,
    }
}

// ---------------------------------------------------------------------------
// Failure Classification Helpers
// ---------------------------------------------------------------------------

/// Classify a store failure. A connection that cannot be used is a service
/// problem; a row that does not map onto the model may be a one-off.
pub fn classify_store_failure(err: &StoreError) -> FailureType {
    match err {
        StoreError::Unavailable(_) | StoreError::Database(_) => FailureType::Unexpected,
        StoreError::CorruptRow { .. } => FailureType::Unknown,
    }
}

/// Classify an ingest failure for one sensor or station.
pub fn classify_ingest_failure(err: &IngestError) -> FailureType {
    match err {
        IngestError::MissingChannel { .. } | IngestError::NoData(_) => FailureType::Expected,
        IngestError::Http(_) | IngestError::Parse(_) | IngestError::MissingApiKey(_) => {
            FailureType::Unexpected
        }
        IngestError::Status { status, .. } if *status >= 500 => FailureType::Unexpected,
        IngestError::Status { .. } => FailureType::Unknown,
    }
}

// ---------------------------------------------------------------------------
// Structured Failure Logging
// ---------------------------------------------------------------------------

/// Log a store failure with automatic classification
pub fn log_store_failure(operation: &str, err: &StoreError) {
    let failure_type = classify_store_failure(err);
    let message = format!("{} failed [{}]: {}", operation, failure_type, err);
    at_level(level_for(&failure_type), Component::Store, None, &message);
}

/// Log an ingest failure with automatic classification
pub fn log_ingest_failure(component: Component, id: &str, operation: &str, err: &IngestError) {
    let failure_type = classify_ingest_failure(err);
    let message = format!("{} failed [{}]: {}", operation, failure_type, err);
    at_level(level_for(&failure_type), component, Some(id), &message);
}

// ---------------------------------------------------------------------------
// Batch Summary Logging
// ---------------------------------------------------------------------------

/// Level a batch summary is logged at: clean runs are info, partial
/// failures warn, total failures error.
pub fn batch_summary_level(successful: usize, failed: usize) -> LogLevel {
    if failed == 0 {
        LogLevel::Info
    } else if successful == 0 {
        LogLevel::Error
    } else {
        LogLevel::Warning
    }
}

/// Log a summary of a batch (one polling cycle, one backfill)
pub fn log_batch_summary(component: Component, operation: &str, successful: usize, failed: usize) {
    let total = successful + failed;
    let message = format!(
        "{} complete: {}/{} successful, {} failed",
        operation, successful, total, failed
    );
    at_level(batch_summary_level(successful, failed), component, None, &message);
}

use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Every failure a store operation can report to its caller.
///
/// None of these are retried inside the store; retry policy belongs to the caller.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The lock was not obtained within the configured bound.
    #[error("timed out after {}ms waiting for lock {}", .waited.as_millis(), .path.display())]
    LockTimeout { path: PathBuf, waited: Duration },

    /// The lock file could not be created, opened or locked.
    #[error("cannot use lock file {}: {source}", .path.display())]
    LockIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document on disk is not a JSON object of groups.
    #[error("corrupt parameter document {}: {source}", .path.display())]
    CorruptDocument {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot {op} {group}.{key}: existing value is a {found}, not a number")]
    NotANumber {
        group: String,
        key: String,
        found: &'static str,
        op: &'static str,
    },

    #[error("counter {group}.{key} would overflow")]
    CounterOverflow { group: String, key: String },

    #[error("{}", missing_message(.group, .key.as_deref()))]
    MissingGroupOrKey { group: String, key: Option<String> },

    #[error("invalid value {value} for lifecycle field '{key}'")]
    InvalidLifecycleValue { key: String, value: Value },

    /// Reading, writing or renaming the document failed.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("store task aborted: {0}")]
    TaskAborted(String),
}

impl StoreError {
    /// Stable short name of the error kind, for operator-facing output.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::LockTimeout { .. } => "LockTimeout",
            StoreError::LockIo { .. } => "LockIOError",
            StoreError::CorruptDocument { .. } => "CorruptDocument",
            StoreError::NotANumber { .. } => "NotANumber",
            StoreError::CounterOverflow { .. } => "CounterOverflow",
            StoreError::MissingGroupOrKey { .. } => "MissingGroupOrKey",
            StoreError::InvalidLifecycleValue { .. } => "InvalidLifecycleValue",
            StoreError::Io { .. } => "IOError",
            StoreError::TaskAborted(_) => "TaskAborted",
        }
    }

    /// Lock contention is the only condition a caller can expect to clear by retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::LockTimeout { .. })
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

fn missing_message(group: &str, key: Option<&str>) -> String {
    match key {
        Some(key) => format!("parameter {}.{} is not set", group, key),
        None => format!("parameter group '{}' does not exist", group),
    }
}

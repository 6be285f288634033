//! Error types for the unicorn-clock daemon.
//!
//! The control core itself is infallible. These enums describe failures at
//! the collaborator edges (files, sysfs, sockets, logging) so they can be
//! logged with context instead of crashing the control loops.

use std::path::PathBuf;
use thiserror::Error;

/// Errors related to configuration management.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("Failed to write configuration: {0}")]
    WriteError(#[from] std::io::Error),
}

/// Errors related to persisting the display settings record.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to write settings file '{path}': {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize settings: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

/// Errors raised by the sysfs hardware adapters.
#[derive(Error, Debug)]
pub enum HardwareError {
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write '{path}': {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unexpected value {value:?} in '{path}'")]
    InvalidValue { path: PathBuf, value: String },
}

/// Errors related to the control socket.
#[derive(Error, Debug)]
pub enum IpcError {
    #[error("Failed to bind socket at '{path}': {source}")]
    SocketBindFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Input queue is full, press dropped")]
    QueueFull,

    #[error("Input queue is closed")]
    QueueClosed,

    #[error("Failed to serialize response: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors related to logging initialization.
#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Could not determine a data directory for log files")]
    DirectoryNotFound,

    #[error("Failed to create log directory '{path}': {source}")]
    DirectoryCreationFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create log file appender: {0}")]
    AppenderCreationFailed(String),
}

/// Top-level daemon errors.
#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Logging error: {0}")]
    Logging(#[from] LoggingError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hardware_error_mentions_path() {
        let err = HardwareError::InvalidValue {
            path: PathBuf::from("/sys/bus/iio/devices/iio:device0/in_illuminance_raw"),
            value: "abc".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("in_illuminance_raw"));
        assert!(msg.contains("\"abc\""));
    }

    #[test]
    fn test_daemon_error_wraps_config_error() {
        let err: DaemonError = ConfigError::ValidationError("manual_level".to_string()).into();
        assert!(err.to_string().starts_with("Configuration error"));
    }
}

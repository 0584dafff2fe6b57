//! Telemetry error types.

use thiserror::Error;

/// Errors that can occur while configuring telemetry.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// A global subscriber was already installed, or installation failed.
    #[error("initialization error: {0}")]
    InitError(String),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

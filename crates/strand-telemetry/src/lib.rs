//! Strand Telemetry - logging setup for the strand command-line tool.
//!
//! # Example
//!
//! ```rust,no_run
//! use strand_telemetry::{LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), strand_telemetry::TelemetryError> {
//! let config = LogConfig::new("info")
//!     .with_format(LogFormat::Compact)
//!     .with_directive("strand_plugins=debug");
//! setup_logging(&config)?;
//! tracing::info!("ready");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{FileRotation, LOG_FILE_PREFIX, LogConfig, LogFormat, LogTarget, setup_logging};

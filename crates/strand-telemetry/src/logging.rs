//! Subscriber setup for the CLI.
//!
//! One `fmt` layer is installed, filtered by an [`EnvFilter`] built from the
//! base level plus per-target directives. It writes to stderr, stdout, or a
//! rolling file in a log directory.

use std::path::PathBuf;
use std::str::FromStr;

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    filter::Directive,
    fmt::{self, MakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::error::{TelemetryError, TelemetryResult};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Prefix of rolled log files, e.g. `strand.2026-01-15`.
pub const LOG_FILE_PREFIX: &str = "strand";

fn unknown(what: &str, value: &str) -> TelemetryError {
    TelemetryError::ConfigError(format!("unknown log {what} '{value}'"))
}

/// How often the log file rolls over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FileRotation {
    /// One file per day.
    #[default]
    Daily,
    /// One file per hour.
    Hourly,
    /// A single file.
    Never,
}

impl FromStr for FileRotation {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Self::Daily),
            "hourly" => Ok(Self::Hourly),
            "never" => Ok(Self::Never),
            other => Err(unknown("rotation", other)),
        }
    }
}

impl From<FileRotation> for Rotation {
    fn from(value: FileRotation) -> Self {
        match value {
            FileRotation::Daily => Self::DAILY,
            FileRotation::Hourly => Self::HOURLY,
            FileRotation::Never => Self::NEVER,
        }
    }
}

/// Line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, for reading by eye.
    Pretty,
    /// One short line per event.
    #[default]
    Compact,
    /// JSON lines.
    Json,
    /// The stock `tracing-subscriber` line.
    Full,
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            "full" => Ok(Self::Full),
            other => Err(unknown("format", other)),
        }
    }
}

/// Where log lines go.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LogTarget {
    /// Standard output.
    Stdout,
    /// Standard error, leaving stdout to command output.
    #[default]
    Stderr,
    /// Rolling files in a directory.
    File {
        /// Directory the files are written to. Created on setup.
        directory: PathBuf,
        /// Rollover period.
        rotation: FileRotation,
    },
}

/// Everything [`setup_logging`] needs.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Base level filter, e.g. `warn`.
    pub level: String,
    /// Line format.
    pub format: LogFormat,
    /// Output.
    pub target: LogTarget,
    /// Prefix lines with a timestamp.
    pub timestamps: bool,
    /// Include source file and line.
    pub file_info: bool,
    /// Colorize output.
    pub ansi: bool,
    /// Extra filter directives such as `strand_plugins=debug`.
    pub directives: Vec<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::new("warn")
    }
}

impl LogConfig {
    /// Compact lines on stderr at `level`.
    #[must_use]
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            format: LogFormat::default(),
            target: LogTarget::default(),
            timestamps: true,
            file_info: false,
            ansi: true,
            directives: Vec::new(),
        }
    }

    /// Set the line format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Write to stdout or stderr.
    #[must_use]
    pub fn with_target(mut self, target: LogTarget) -> Self {
        self.target = target;
        self
    }

    /// Write rolling files into `directory`. Files never get ANSI colors.
    #[must_use]
    pub fn with_file_logging(mut self, directory: impl Into<PathBuf>, rotation: FileRotation) -> Self {
        self.target = LogTarget::File {
            directory: directory.into(),
            rotation,
        };
        self.ansi = false;
        self
    }

    /// Add a filter directive.
    #[must_use]
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    /// Drop timestamps.
    #[must_use]
    pub fn without_timestamps(mut self) -> Self {
        self.timestamps = false;
        self
    }

    /// Include source file and line.
    #[must_use]
    pub fn with_file_info(mut self) -> Self {
        self.file_info = true;
        self
    }

    /// Turn colors off.
    #[must_use]
    pub fn without_ansi(mut self) -> Self {
        self.ansi = false;
        self
    }

    fn filter(&self) -> TelemetryResult<EnvFilter> {
        let config_err = |e: &dyn std::fmt::Display| TelemetryError::ConfigError(e.to_string());
        self.directives.iter().try_fold(
            EnvFilter::try_new(&self.level).map_err(|e| config_err(&e))?,
            |filter, directive| {
                let directive: Directive = directive.parse().map_err(|e| config_err(&e))?;
                Ok(filter.add_directive(directive))
            },
        )
    }

    fn layer<W>(&self, writer: W) -> BoxedLayer
    where
        W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
    {
        let base = fmt::layer()
            .with_writer(writer)
            .with_ansi(self.ansi)
            .with_file(self.file_info)
            .with_line_number(self.file_info);

        if self.timestamps {
            match self.format {
                LogFormat::Json => base.json().boxed(),
                LogFormat::Pretty => base.pretty().boxed(),
                LogFormat::Compact => base.compact().boxed(),
                LogFormat::Full => base.boxed(),
            }
        } else {
            let base = base.without_time();
            match self.format {
                LogFormat::Json => base.json().boxed(),
                LogFormat::Pretty => base.pretty().boxed(),
                LogFormat::Compact => base.compact().boxed(),
                LogFormat::Full => base.boxed(),
            }
        }
    }
}

/// Install the global subscriber for `config`.
///
/// # Errors
///
/// Fails on a bad filter directive, a log directory that cannot be created,
/// or when a global subscriber is already set.
pub fn setup_logging(config: &LogConfig) -> TelemetryResult<()> {
    let filter = config.filter()?;

    let layer = match &config.target {
        LogTarget::Stdout => config.layer(std::io::stdout),
        LogTarget::Stderr => config.layer(std::io::stderr),
        LogTarget::File {
            directory,
            rotation,
        } => {
            std::fs::create_dir_all(directory).map_err(|e| {
                TelemetryError::ConfigError(format!(
                    "cannot create log directory {}: {e}",
                    directory.display()
                ))
            })?;
            let appender = RollingFileAppender::new((*rotation).into(), directory, LOG_FILE_PREFIX);
            config.layer(appender)
        },
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()
        .map_err(|e| TelemetryError::InitError(e.to_string()))
}

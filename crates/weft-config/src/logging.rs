//! Log output formats and installation of the process-wide subscriber.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;
use tracing::Subscriber;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::{EnvFilter, fmt};

use crate::Config;

static INSTALLED: OnceCell<()> = OnceCell::new();

/// Supported logging output formats.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One JSON object per event, fields flattened.
    #[default]
    Json,
    /// Human-readable single line output.
    Compact,
}

impl LogFormat {
    /// Whether records are emitted as machine-readable JSON.
    #[must_use]
    pub const fn is_structured(self) -> bool {
        matches!(self, Self::Json)
    }
}

/// Errors encountered while parsing a [`LogFormat`] from text.
pub type LogFormatParseError = strum::ParseError;

/// Errors raised while installing the log subscriber.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoggingError {
    /// `log_filter` is not a valid filter directive list.
    #[error("invalid log filter {filter:?}: {message}")]
    Filter {
        /// The rejected expression.
        filter: String,
        /// Parser diagnostic.
        message: String,
    },
    /// Another global subscriber was installed first.
    #[error("failed to install log subscriber: {0}")]
    Subscriber(#[from] SetGlobalDefaultError),
}

impl LogFormat {
    fn subscriber(self, filter: EnvFilter) -> Box<dyn Subscriber + Send + Sync> {
        let builder = fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(io::stderr)
            .with_ansi(!self.is_structured() && io::stderr().is_terminal());
        match self {
            Self::Json => Box::new(builder.json().flatten_event(true).finish()),
            Self::Compact => Box::new(builder.compact().finish()),
        }
    }
}

/// Parses the configured `log_filter` without installing anything.
///
/// # Errors
///
/// Returns [`LoggingError::Filter`] when the expression is malformed.
pub fn log_filter(config: &Config) -> Result<EnvFilter, LoggingError> {
    EnvFilter::try_new(config.log_filter()).map_err(|error| LoggingError::Filter {
        filter: config.log_filter().to_owned(),
        message: error.to_string(),
    })
}

/// Routes engine diagnostics to stderr using the configured filter and
/// format.
///
/// Only the first successful call installs a subscriber; it returns `true`.
/// Later calls leave the existing one in place and return `false`.
///
/// # Errors
///
/// Fails when `log_filter` does not parse or a subscriber was installed
/// elsewhere in the process.
pub fn install_logging(config: &Config) -> Result<bool, LoggingError> {
    let mut installed_now = false;
    INSTALLED.get_or_try_init(|| {
        let subscriber = config.log_format().subscriber(log_filter(config)?);
        tracing::subscriber::set_global_default(subscriber)?;
        installed_now = true;
        Ok::<(), LoggingError>(())
    })?;
    Ok(installed_now)
}

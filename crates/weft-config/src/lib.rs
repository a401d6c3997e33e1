//! Configuration for the Weft highlighting engine.
//!
//! [`Config`] carries the engine limits, the logging set-up consumed by
//! [`install_logging`], and the [`ConfigValues`] that grammar queries
//! read through the `test.config` predicate. Configuration is plain JSON;
//! every field is optional and falls back to the values in [`defaults`].

pub mod defaults;
mod logging;
mod values;

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use defaults::{
    DEFAULT_LINE_LENGTH_LIMIT, DEFAULT_LOG_FILTER, default_line_length_limit, default_log_filter,
    default_log_format,
};
pub use logging::{LogFormat, LogFormatParseError, LoggingError, install_logging, log_filter};
pub use values::ConfigValues;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration from {path}: {source}")]
    Read {
        /// Path that was being read.
        path: Utf8PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The configuration document is not valid JSON for [`Config`].
    #[error("invalid configuration: {message}")]
    Parse {
        /// Description of the parse failure.
        message: String,
    },

    /// A configuration file on disk is not valid JSON for [`Config`].
    #[error("invalid configuration in {path}: {message}")]
    ParseFile {
        /// Path of the offending file.
        path: Utf8PathBuf,
        /// Description of the parse failure.
        message: String,
    },
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    log_filter: String,
    log_format: LogFormat,
    line_length_limit: usize,
    dev_mode: bool,
    values: ConfigValues,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: defaults::default_log_filter_string(),
            log_format: default_log_format(),
            line_length_limit: default_line_length_limit(),
            dev_mode: false,
            values: ConfigValues::default(),
        }
    }
}

impl Config {
    /// Parses configuration from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the document is malformed or
    /// names an unknown field.
    pub fn from_json_str(document: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(document).map_err(|error| ConfigError::Parse {
            message: error.to_string(),
        })
    }

    /// Loads configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] when the file cannot be read and
    /// [`ConfigError::ParseFile`] when its contents are invalid.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let document = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&document).map_err(|error| ConfigError::ParseFile {
            path: path.to_path_buf(),
            message: error.to_string(),
        })
    }

    /// Filter expression handed to the tracing subscriber.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Output format for log records.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Column beyond which highlighting requests yield nothing.
    #[must_use]
    pub const fn line_length_limit(&self) -> usize {
        self.line_length_limit
    }

    /// Whether grammar authoring mistakes are reported loudly.
    #[must_use]
    pub const fn dev_mode(&self) -> bool {
        self.dev_mode
    }

    /// Values visible to the `test.config` query predicate.
    #[must_use]
    pub const fn values(&self) -> &ConfigValues {
        &self.values
    }

    /// Mutable access to the predicate-visible values.
    pub const fn values_mut(&mut self) -> &mut ConfigValues {
        &mut self.values
    }

    /// Returns a copy with development mode switched on or off.
    #[must_use]
    pub const fn with_dev_mode(mut self, dev_mode: bool) -> Self {
        self.dev_mode = dev_mode;
        self
    }

    /// Returns a copy with a different line length limit.
    #[must_use]
    pub const fn with_line_length_limit(mut self, limit: usize) -> Self {
        self.line_length_limit = limit;
        self
    }

    /// Returns a copy with a different log format.
    #[must_use]
    pub const fn with_log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }
}

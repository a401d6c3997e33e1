//! Default values shared by [`Config`](crate::Config) and its consumers.

use crate::logging::LogFormat;

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Column limit past which a highlighting request yields no boundaries.
pub const DEFAULT_LINE_LENGTH_LIMIT: usize = 10_000;

/// Default log filter expression.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Default column limit for highlighting requests.
#[must_use]
pub const fn default_line_length_limit() -> usize {
    DEFAULT_LINE_LENGTH_LIMIT
}

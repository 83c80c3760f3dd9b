//! Configuration and data error types.
//!
//! Two families of failure exist below the transport layer:
//!
//! - [`ConfigError`]: a descriptor entry is missing or invalid. Fatal to the
//!   operation that hit it and never replaced by a default.
//! - [`DataError`]: one record carries a malformed or missing field. Scoped to
//!   that record; the sync layer turns it into a result entry.

use thiserror::Error;

/// A missing or invalid configuration entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The source key does not name any known source.
    #[error("unknown source: {0}")]
    UnknownSource(String),

    /// The source is known but has no date handling rule.
    #[error("no date handling rule configured for source {0}")]
    MissingDateRule(String),

    /// A day-shifting extraction was combined with a residual offset.
    #[error(
        "source {source_key}: extraction method {method} already shifts the day, date_offset must be 0 (got {offset})"
    )]
    ConflictingDayShift {
        source_key: String,
        method: String,
        offset: i64,
    },

    /// A config key has no property mapping.
    #[error("source {source_key}: no property mapping for {key}")]
    MissingPropertyMapping { source_key: String, key: String },

    /// Two config keys map onto the same store property.
    #[error("source {source_key}: property {display_name} is mapped more than once")]
    DuplicateProperty {
        source_key: String,
        display_name: String,
    },

    /// A transformer could not resolve a calendar id.
    #[error("no calendar id configured for {0}")]
    MissingCalendarId(String),

    /// A source emits a value that cannot be written as the declared type.
    #[error("source {source_key}: property {key} is declared {declared} but the value is {actual}")]
    PropertyTypeMismatch {
        source_key: String,
        key: String,
        declared: &'static str,
        actual: &'static str,
    },

    /// A calendar routing key does not exist.
    #[error("unknown calendar mapping: {0}")]
    UnknownCalendarMapping(String),

    /// A source has neither a status checkbox nor a reference id property.
    #[error("source {0}: neither a status checkbox nor an event id property is configured")]
    MissingStatusProperty(String),

    /// The configured timezone is not a valid IANA name.
    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),

    /// Any other invalid value.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Creates a generic invalid-configuration error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}

/// A malformed or missing field on a single record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataError {
    /// A date value could not be parsed into the expected format.
    #[error("invalid date {value:?}: {reason}")]
    InvalidDate { value: String, reason: String },

    /// A time-of-day value could not be parsed.
    #[error("invalid time {value:?}")]
    InvalidTime { value: String },

    /// A required field is missing or empty.
    #[error("missing required field {0}")]
    MissingField(String),

    /// A unique id does not match the configured id type.
    #[error("invalid unique id {value:?}: expected a {expected} id")]
    InvalidUniqueId { value: String, expected: String },
}

impl DataError {
    /// Creates an invalid date error.
    pub fn invalid_date(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDate {
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Creates a missing field error.
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingField(field.into())
    }
}

/// Result type for configuration checks.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for per-record data handling.
pub type DataResult<T> = Result<T, DataError>;

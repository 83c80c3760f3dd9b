//! Errors reported by page store and calendar backends.
//!
//! A [`StoreError`] is a transport failure, never a data or configuration
//! problem. Rate limits, 5xx answers and network failures are retryable and
//! go through [`crate::RetryPolicy`]; everything else surfaces on the first
//! attempt.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// What went wrong talking to a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreErrorCode {
    /// Token missing, expired or lacking access to the database.
    AuthenticationFailed,
    NetworkError,
    /// HTTP 429.
    RateLimited,
    /// HTTP 5xx.
    ServerError,
    /// The backend answered with something unparseable.
    InvalidResponse,
    /// Page, database or calendar event does not exist.
    NotFound,
    /// Rejected write: unknown property, wrong value type.
    BadRequest,
    /// Local file trouble (store snapshot, records file).
    Io,
    InternalError,
}

impl StoreErrorCode {
    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkError | Self::RateLimited | Self::ServerError
        )
    }

    /// Classifies an HTTP status from a remote backend.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::AuthenticationFailed,
            404 => Self::NotFound,
            429 => Self::RateLimited,
            400..=499 => Self::BadRequest,
            500..=599 => Self::ServerError,
            _ => Self::InvalidResponse,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed => "authentication_failed",
            Self::NetworkError => "network_error",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::InvalidResponse => "invalid_response",
            Self::NotFound => "not_found",
            Self::BadRequest => "bad_request",
            Self::Io => "io_error",
            Self::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for StoreErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed page store or calendar call.
#[derive(Debug, Error)]
pub struct StoreError {
    code: StoreErrorCode,
    message: String,
    /// Backend name, e.g. `local` or `json-file`.
    backend: Option<String>,
    /// Server-requested wait before the next attempt.
    retry_after: Option<Duration>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl StoreError {
    pub fn new(code: StoreErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            backend: None,
            retry_after: None,
            source: None,
        }
    }

    /// Builds an error from an HTTP status, for remote backends.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::from_http_status(status), message)
    }

    // Shorthands, one per code a backend commonly raises.

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::NetworkError, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::RateLimited, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::ServerError, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::InvalidResponse, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::NotFound, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::BadRequest, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::InternalError, message)
    }

    /// Tags the error with the backend that raised it.
    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    /// Records a `Retry-After` hint. The retry policy waits at least this
    /// long, still bounded by its maximum backoff.
    pub fn with_retry_after(mut self, wait: Duration) -> Self {
        self.retry_after = Some(wait);
        self
    }

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn code(&self) -> StoreErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn backend(&self) -> Option<&str> {
        self.backend.as_deref()
    }

    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(backend) = &self.backend {
            write!(f, "[{backend}] ")?;
        }
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::new(StoreErrorCode::Io, err.to_string()).with_source(err)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::invalid_response(err.to_string()).with_source(err)
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

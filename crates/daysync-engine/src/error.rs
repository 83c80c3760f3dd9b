//! Engine error types.

use std::io;
use std::path::PathBuf;

use daysync_core::{ConfigError, DataError, NormalizeError};
use daysync_store::StoreError;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, SyncError>;

/// Errors that can occur while syncing.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Missing or invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A malformed or missing field on one record.
    #[error(transparent)]
    Data(#[from] DataError),

    /// A page store, calendar or source transport failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The configuration file is not valid TOML for the expected shape.
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl SyncError {
    /// Creates a configuration read error.
    pub fn config_read(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::ConfigRead {
            path: path.into(),
            source,
        }
    }

    /// Returns the error family as a short label.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) | Self::ConfigRead { .. } | Self::ConfigParse(_) => "config",
            Self::Data(_) => "data",
            Self::Store(_) => "store",
        }
    }

    /// Returns true if the operation may succeed when retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_retryable())
    }
}

impl From<NormalizeError> for SyncError {
    fn from(err: NormalizeError) -> Self {
        match err {
            NormalizeError::Config(e) => Self::Config(e),
            NormalizeError::Data(e) => Self::Data(e),
        }
    }
}

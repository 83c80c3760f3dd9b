//! CLI error types.

use std::path::PathBuf;
use std::process::ExitCode;

use daysync_core::{ConfigError, DataError, TracingError};
use daysync_engine::SyncError;
use daysync_store::StoreError;
use thiserror::Error;

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

/// Errors surfaced by the `daysync` binary.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid input: {0}")]
    Data(#[from] DataError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("failed to initialize logging: {0}")]
    Tracing(#[from] TracingError),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("no records file for {source_key} in {}", dir.display())]
    MissingRecords { source_key: String, dir: PathBuf },

    /// The command ran but some items failed.
    #[error("{failed} of {total} items failed")]
    Incomplete { failed: usize, total: usize },
}

impl CliError {
    /// Process exit status: 2 for configuration problems, 1 otherwise.
    pub fn status(&self) -> u8 {
        let config = match self {
            Self::Config(_) | Self::Serialize(_) | Self::MissingRecords { .. } => true,
            Self::Sync(err) => err.category() == "config",
            _ => false,
        };
        if config { 2 } else { 1 }
    }

    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.status())
    }
}

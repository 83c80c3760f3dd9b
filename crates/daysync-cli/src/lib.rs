//! Command-line interface for daysync.
//!
//! This crate provides the `daysync` binary: ingest tracker exports into
//! the local store, push unsynced pages to the calendar, and inspect the
//! configuration.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod source;

pub use cli::Cli;
pub use error::{CliError, CliResult};
pub use source::JsonFileSource;

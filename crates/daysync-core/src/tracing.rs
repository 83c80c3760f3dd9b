//! Log subscriber setup shared by the engine and the `daysync` binary.
//!
//! Interactive runs print compact lines without timestamps; unattended runs
//! (cron, systemd timers) write JSON lines with span events so each sync
//! batch can be followed record by record.
//!
//! ```ignore
//! use daysync_core::tracing::{init_tracing, TracingConfig};
//!
//! init_tracing(TracingConfig::from_flags(debug, json))?;
//! ```
//!
//! `RUST_LOG` always wins over the configured level.

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, format::FmtSpan},
    prelude::*,
};

/// Crates whose events pass the default filter.
const CRATES: [&str; 4] = ["daysync_core", "daysync_store", "daysync_engine", "daysync_cli"];

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to set global tracing subscriber: {0}")]
    SetGlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("failed to parse env filter: {0}")]
    EnvFilter(#[from] tracing_subscriber::filter::ParseError),
}

/// Line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingOutputFormat {
    /// Multi-line, for reading a single run by eye
    Pretty,
    /// One line per event
    #[default]
    Compact,
    /// JSON lines
    Json,
}

/// How the subscriber is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    /// Level for the daysync crates when `RUST_LOG` is unset
    pub default_level: Level,
    pub output_format: TracingOutputFormat,
    /// File and line of each event
    pub include_location: bool,
    /// Module path of each event
    pub include_target: bool,
    pub include_timestamp: bool,
    /// Span open/close events
    pub include_span_events: bool,
    /// Explicit filter directive, replacing the per-crate default
    pub env_filter: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self::cli()
    }
}

impl TracingConfig {
    /// Compact, untimed lines at INFO.
    #[must_use]
    pub fn cli() -> Self {
        Self {
            default_level: Level::INFO,
            output_format: TracingOutputFormat::Compact,
            include_location: false,
            include_target: false,
            include_timestamp: false,
            include_span_events: false,
            env_filter: None,
        }
    }

    /// `--debug`: DEBUG with file, line and module.
    #[must_use]
    pub fn cli_debug() -> Self {
        Self {
            default_level: Level::DEBUG,
            include_location: true,
            include_target: true,
            ..Self::cli()
        }
    }

    /// JSON lines with timestamps and span events.
    #[must_use]
    pub fn scheduled() -> Self {
        Self {
            default_level: Level::INFO,
            output_format: TracingOutputFormat::Json,
            include_location: true,
            include_target: true,
            include_timestamp: true,
            include_span_events: true,
            env_filter: None,
        }
    }

    /// Picks a preset from the CLI flags.
    #[must_use]
    pub fn from_flags(debug: bool, json: bool) -> Self {
        match (json, debug) {
            (true, true) => Self::scheduled().with_level(Level::DEBUG),
            (true, false) => Self::scheduled(),
            (false, true) => Self::cli_debug(),
            (false, false) => Self::cli(),
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.default_level = level;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingOutputFormat) -> Self {
        self.output_format = format;
        self
    }

    #[must_use]
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Filter used when `RUST_LOG` is unset: third-party crates at WARN,
    /// the daysync crates at the configured level.
    pub fn filter_directive(&self) -> String {
        if let Some(filter) = &self.env_filter {
            return filter.clone();
        }
        let level = self.default_level.as_str().to_lowercase();
        let mut directive = String::from("warn");
        for krate in CRATES {
            directive.push_str(&format!(",{krate}={level}"));
        }
        directive
    }

    fn env_filter(&self) -> Result<EnvFilter, TracingError> {
        if self.env_filter.is_none()
            && let Ok(filter) = EnvFilter::try_from_default_env()
        {
            return Ok(filter);
        }
        Ok(EnvFilter::try_new(self.filter_directive())?)
    }

    fn span_events(&self) -> FmtSpan {
        if self.include_span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }

    fn fmt_layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let layer = fmt::layer()
            .with_file(self.include_location)
            .with_line_number(self.include_location)
            .with_target(self.include_target)
            .with_span_events(self.span_events());

        match (self.output_format, self.include_timestamp) {
            (TracingOutputFormat::Pretty, true) => layer.pretty().boxed(),
            (TracingOutputFormat::Pretty, false) => layer.pretty().without_time().boxed(),
            (TracingOutputFormat::Compact, true) => layer.compact().boxed(),
            (TracingOutputFormat::Compact, false) => layer.compact().without_time().boxed(),
            (TracingOutputFormat::Json, true) => layer.json().boxed(),
            (TracingOutputFormat::Json, false) => layer.json().without_time().boxed(),
        }
    }
}

/// Installs the global subscriber. Call once, before the first sync.
///
/// # Errors
///
/// Fails if a subscriber is already installed or the filter directive does
/// not parse.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let filter = config.env_filter()?;
    let subscriber = tracing_subscriber::registry()
        .with(config.fmt_layer())
        .with(filter);
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

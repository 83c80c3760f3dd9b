//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use daysync_core::{CanonicalDate, SourceKind};

/// daysync - Keep a personal database and calendar in step with your trackers
#[derive(Debug, Parser)]
#[command(name = "daysync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, global = true, env = "DAYSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v', global = true)]
    pub debug: bool,

    /// Emit JSON log lines, for cron or systemd timers
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Path to the JSON store file
    #[arg(long, global = true, env = "DAYSYNC_STORE")]
    pub store: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Ingest a JSON batch of records for one source
    Sync {
        /// Source key (sleep, workout, body_measurement, game_session, commit)
        source: SourceKind,

        /// JSON file holding an array of records
        #[arg(long)]
        records: PathBuf,

        #[command(flatten)]
        range: RangeArgs,
    },

    /// Create calendar events for unsynced pages
    Calendar {
        /// Event transformer name from the config
        event: String,

        #[command(flatten)]
        range: RangeArgs,
    },

    /// Ingest every configured source, then run every event transformer
    RunAll {
        /// Directory holding one `<source>.json` file per source
        #[arg(long)]
        records_dir: PathBuf,

        /// Skip the calendar pass
        #[arg(long)]
        no_calendar: bool,

        #[command(flatten)]
        range: RangeArgs,
    },

    /// Delete the calendar event recorded on a page and mark it unsynced
    Unsync {
        /// Event transformer name from the config
        event: String,

        /// Page id in the store
        page_id: String,
    },

    /// Show the canonical date a raw source value maps to
    Normalize {
        /// Source key
        source: SourceKind,

        /// Raw date as the source writes it
        raw: String,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Date window flags shared by the sync commands.
#[derive(Debug, Clone, Copy, Default, Args)]
pub struct RangeArgs {
    /// First day, inclusive (YYYY-MM-DD). Defaults to today.
    #[arg(long)]
    pub from: Option<CanonicalDate>,

    /// Last day, inclusive (YYYY-MM-DD). Defaults to --from.
    #[arg(long)]
    pub to: Option<CanonicalDate>,
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Validate configuration
    Validate,

    /// Show configuration file path
    Path,
}

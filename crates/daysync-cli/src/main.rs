//! daysync CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use daysync_core::{TracingConfig, init_tracing};

use daysync_cli::cli::{Cli, Command, ConfigAction};
use daysync_cli::commands::{self, sync::Context};
use daysync_cli::config::Paths;
use daysync_cli::error::CliResult;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_config = TracingConfig::from_flags(cli.debug, cli.log_json);
    if let Err(e) = init_tracing(log_config) {
        eprintln!("error: {e}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            e.exit_code()
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let paths = Paths::resolve(cli.config, cli.store);

    match cli.command {
        Command::Sync {
            source,
            records,
            range,
        } => {
            let ctx = Context::open(&paths)?;
            commands::sync::records(&ctx, source, &records, range).await
        }
        Command::Calendar { event, range } => {
            let ctx = Context::open(&paths)?;
            commands::sync::calendar(&ctx, &event, range).await
        }
        Command::RunAll {
            records_dir,
            no_calendar,
            range,
        } => {
            let ctx = Context::open(&paths)?;
            commands::sync::run_all(&ctx, &records_dir, !no_calendar, range).await
        }
        Command::Unsync { event, page_id } => {
            let ctx = Context::open(&paths)?;
            commands::sync::unsync(&ctx, &event, &page_id).await
        }
        Command::Normalize { source, raw } => {
            let (_, settings) = paths.load_settings()?;
            let date = commands::sync::normalize(&settings, source, &raw)?;
            println!("{date}");
            Ok(())
        }
        Command::Config { action } => match action {
            ConfigAction::Dump => commands::config::dump(&paths),
            ConfigAction::Validate => commands::config::validate(&paths),
            ConfigAction::Path => commands::config::path(&paths),
        },
    }
}

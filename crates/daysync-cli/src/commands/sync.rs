//! Sync commands: record ingestion, calendar events, removal, date checks.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use chrono_tz::Tz;
use daysync_core::{CanonicalDate, DateRange, RawDate, SourceFormat, SourceKind};
use daysync_engine::{
    Settings, Source, SourceOutcome, SyncError, SyncOrchestrator, SyncResult,
};
use daysync_store::{CalendarSink, LocalStore, PageStore};
use tracing::{info, warn};

use super::render_result;
use crate::cli::RangeArgs;
use crate::config::{Paths, records_file};
use crate::error::{CliError, CliResult};
use crate::source::JsonFileSource;

/// Everything a sync command needs: validated settings and an orchestrator
/// over the page store and calendar.
pub struct Context {
    pub settings: Arc<Settings>,
    pub orchestrator: SyncOrchestrator,
}

impl Context {
    /// Loads the config and opens the store.
    pub fn open(paths: &Paths) -> CliResult<Self> {
        let (_, settings) = paths.load_settings()?;
        let store = paths.open_store()?;
        Ok(Self::new(settings, store))
    }

    /// Uses the local store as both page store and calendar.
    pub fn new(settings: Arc<Settings>, store: Arc<LocalStore>) -> Self {
        Self::with_backends(settings, store.clone(), store)
    }

    pub fn with_backends(
        settings: Arc<Settings>,
        store: Arc<dyn PageStore>,
        calendar: Arc<dyn CalendarSink>,
    ) -> Self {
        let orchestrator = SyncOrchestrator::new(settings.clone(), store, calendar);
        Self {
            settings,
            orchestrator,
        }
    }
}

/// Resolves the date flags, defaulting to today in the configured timezone.
pub fn date_range(args: RangeArgs, tz: Tz) -> CliResult<DateRange> {
    let today = CanonicalDate::new(Utc::now().with_timezone(&tz).date_naive());
    let from = args.from.unwrap_or(today);
    let to = args.to.unwrap_or(from);
    Ok(DateRange::new(from, to)?)
}

/// Tally across batches for the exit status.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Tally {
    failed: usize,
    total: usize,
}

impl Tally {
    fn add(&mut self, result: &SyncResult) {
        self.failed += result.errors.len();
        self.total += result.total;
    }

    fn finish(self) -> CliResult<()> {
        if self.failed == 0 {
            Ok(())
        } else {
            Err(CliError::Incomplete {
                failed: self.failed,
                total: self.total,
            })
        }
    }
}

/// `daysync sync <source> --records <file>`
pub async fn records(
    ctx: &Context,
    kind: SourceKind,
    path: &Path,
    range: RangeArgs,
) -> CliResult<()> {
    let range = date_range(range, ctx.settings.timezone)?;
    let source = JsonFileSource::new(kind, path);
    let result = ctx.orchestrator.sync_source(&source, &range).await?;
    println!("{}", render_result(kind.as_str(), &result));

    let mut tally = Tally::default();
    tally.add(&result);
    tally.finish()
}

/// `daysync calendar <event>`
pub async fn calendar(ctx: &Context, event: &str, range: RangeArgs) -> CliResult<()> {
    let range = date_range(range, ctx.settings.timezone)?;
    let transformer = ctx.settings.transformer(event)?;
    let result = ctx.orchestrator.sync_calendar(transformer, &range).await?;
    println!("{}", render_result(event, &result));

    let mut tally = Tally::default();
    tally.add(&result);
    tally.finish()
}

/// `daysync run-all --records-dir <dir>`
///
/// Ingests every configured source that has a `<source>.json` file, then
/// runs each event transformer over the same range. A failed source or
/// transformer counts as one failed item and the run moves on.
pub async fn run_all(
    ctx: &Context,
    dir: &Path,
    with_calendar: bool,
    range: RangeArgs,
) -> CliResult<()> {
    let range = date_range(range, ctx.settings.timezone)?;

    let mut sources: Vec<Arc<dyn Source>> = Vec::new();
    for kind in ctx.settings.source_kinds() {
        let path = records_file(dir, kind.as_str());
        if path.exists() {
            sources.push(Arc::new(JsonFileSource::new(kind, path)));
        } else {
            info!(source = %kind, path = %path.display(), "no records file, skipping");
        }
    }
    if sources.is_empty() {
        return Err(CliError::MissingRecords {
            source_key: "any configured source".to_string(),
            dir: dir.to_path_buf(),
        });
    }

    let mut tally = Tally::default();
    let report = ctx.orchestrator.run_all(&sources, &range).await;
    for (kind, outcome) in &report.entries {
        match outcome {
            SourceOutcome::Synced(result) => {
                println!("{}", render_result(kind.as_str(), result));
                tally.add(result);
            }
            SourceOutcome::Failed(err) => {
                println!("{kind}: failed: {err}");
                tally.failed += 1;
                tally.total += 1;
            }
        }
    }

    if with_calendar {
        for (name, transformer) in &ctx.settings.events {
            match ctx.orchestrator.sync_calendar(transformer, &range).await {
                Ok(result) => {
                    println!("{}", render_result(name, &result));
                    tally.add(&result);
                }
                Err(err) => {
                    warn!(event = %name, error = %err, "event transformer failed");
                    println!("{name}: failed: {err}");
                    tally.failed += 1;
                    tally.total += 1;
                }
            }
        }
    }
    tally.finish()
}

/// `daysync unsync <event> <page-id>`
pub async fn unsync(ctx: &Context, event: &str, page_id: &str) -> CliResult<()> {
    let transformer = ctx.settings.transformer(event)?;
    let deleted = ctx
        .orchestrator
        .remove_calendar_event(transformer, page_id)
        .await?;
    if deleted {
        println!("{page_id}: calendar event deleted, page marked unsynced");
    } else {
        println!("{page_id}: no calendar event found, page marked unsynced");
    }
    Ok(())
}

/// `daysync normalize <source> <raw>`
pub fn normalize(settings: &Settings, kind: SourceKind, raw: &str) -> CliResult<CanonicalDate> {
    let rule = settings.normalizer.rule(kind)?;
    let raw = match raw.trim().parse::<i64>() {
        Ok(secs) if rule.format() == SourceFormat::UnixSeconds => RawDate::UnixSeconds(secs),
        _ => RawDate::Text(raw.to_string()),
    };
    settings
        .normalizer
        .normalize(kind, &raw)
        .map_err(|e| SyncError::from(e).into())
}

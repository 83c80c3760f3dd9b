//! The sync loop.
//!
//! Records are processed one at a time: fetched, checked against the store
//! by unique id, created or skipped. A failure on one record is recorded in
//! the [`SyncResult`] and the batch carries on. A fixed pause between
//! records and between sources keeps the request rate under the store's
//! limits.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use daysync_core::{CanonicalDate, DateRange, SourceKind};
use daysync_store::{CalendarSink, PageStore, StoreErrorCode};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::error::{EngineResult, SyncError};
use crate::record_store::RecordStore;
use crate::source::{Source, SourceRecord};
use crate::transform::EventTransformer;

/// A record or page that was created or skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncItem {
    /// Unique id for records, page id for calendar syncs.
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<CanonicalDate>,
    /// Calendar event id, for calendar syncs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
}

impl SyncItem {
    fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            page_id: None,
            date: None,
            external_id: None,
        }
    }
}

/// A record or page that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncFailure {
    pub key: String,
    /// `config`, `data` or `store`.
    pub category: &'static str,
    pub message: String,
}

/// Outcome of one batch. `created + skipped + errors == total`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    pub created: Vec<SyncItem>,
    pub skipped: Vec<SyncItem>,
    pub errors: Vec<SyncFailure>,
    pub total: usize,
}

impl SyncResult {
    fn with_total(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    fn fail(&mut self, key: impl Into<String>, err: &SyncError) {
        self.errors.push(SyncFailure {
            key: key.into(),
            category: err.category(),
            message: err.to_string(),
        });
    }

    /// Returns true if every input is accounted for exactly once.
    pub fn is_consistent(&self) -> bool {
        self.created.len() + self.skipped.len() + self.errors.len() == self.total
    }

    /// Returns true if no record failed.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for SyncResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} total, {} created, {} skipped, {} failed",
            self.total,
            self.created.len(),
            self.skipped.len(),
            self.errors.len()
        )
    }
}

/// Outcome of one source in a "run all".
#[derive(Debug)]
pub enum SourceOutcome {
    Synced(SyncResult),
    /// The source could not be fetched or is not configured.
    Failed(SyncError),
}

/// Per-source outcomes of a "run all", in run order.
#[derive(Debug, Default)]
pub struct RunReport {
    pub entries: Vec<(SourceKind, SourceOutcome)>,
}

impl RunReport {
    /// Returns true if every source synced without record errors.
    pub fn is_success(&self) -> bool {
        self.entries
            .iter()
            .all(|(_, o)| matches!(o, SourceOutcome::Synced(r) if r.is_success()))
    }

    /// Total records created across sources.
    pub fn created(&self) -> usize {
        self.entries
            .iter()
            .filter_map(|(_, o)| match o {
                SourceOutcome::Synced(r) => Some(r.created.len()),
                SourceOutcome::Failed(_) => None,
            })
            .sum()
    }
}

/// Drives fetch, dedup, create and calendar sync.
pub struct SyncOrchestrator {
    settings: Arc<Settings>,
    store: Arc<dyn PageStore>,
    calendar: Arc<dyn CalendarSink>,
}

impl fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("store", &self.store.name())
            .field("calendar", &self.calendar.name())
            .finish()
    }
}

impl SyncOrchestrator {
    /// Creates an orchestrator over a page store and a calendar.
    pub fn new(
        settings: Arc<Settings>,
        store: Arc<dyn PageStore>,
        calendar: Arc<dyn CalendarSink>,
    ) -> Self {
        Self {
            settings,
            store,
            calendar,
        }
    }

    /// Returns the settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Returns the record store of a configured source.
    pub fn record_store(&self, kind: SourceKind) -> EngineResult<RecordStore> {
        let source = self.settings.source(kind)?.clone();
        Ok(RecordStore::new(
            source,
            self.store.clone(),
            self.settings.retry.clone(),
        ))
    }

    /// Ingests already-fetched records of one source.
    ///
    /// Fails only when the source itself is not usable; per-record failures
    /// end up in [`SyncResult::errors`].
    pub async fn sync_records(
        &self,
        kind: SourceKind,
        records: Vec<SourceRecord>,
    ) -> EngineResult<SyncResult> {
        let store = self.record_store(kind)?;
        self.settings.normalizer.rule(kind)?;

        let mut result = SyncResult::with_total(records.len());
        info!(source = %kind, count = records.len(), "syncing records");

        for (index, record) in records.iter().enumerate() {
            if index > 0 {
                pause(self.settings.record_delay).await;
            }
            let key = record.unique_id();
            if record.kind() != kind {
                let err = SyncError::Config(daysync_core::ConfigError::invalid(format!(
                    "{} record passed to {kind} sync",
                    record.kind()
                )));
                warn!(source = %kind, record_id = %key, error = %err, "record failed");
                result.fail(key, &err);
                continue;
            }

            match self.sync_one(&store, record).await {
                Ok((item, true)) => result.created.push(item),
                Ok((item, false)) => result.skipped.push(item),
                Err(err) => {
                    warn!(source = %kind, record_id = %key, error = %err, "record failed");
                    result.fail(key, &err);
                }
            }
        }

        info!(source = %kind, %result, "sync finished");
        Ok(result)
    }

    /// Returns the item and whether it was created.
    async fn sync_one(
        &self,
        store: &RecordStore,
        record: &SourceRecord,
    ) -> EngineResult<(SyncItem, bool)> {
        let row = record.ingest(&self.settings.normalizer)?;
        let mut item = SyncItem::new(&row.unique_id);
        item.date = Some(row.date);

        if let Some(existing) = store.find_by_unique_id(&row.unique_id).await? {
            debug!(source = %row.kind, record_id = %row.unique_id, page_id = %existing.id, "already stored, skipping");
            item.page_id = Some(existing.id);
            return Ok((item, false));
        }

        let page = store.create(&row).await?;
        item.page_id = Some(page.id);
        Ok((item, true))
    }

    /// Fetches a source over `range` and ingests the records dated inside it.
    ///
    /// The fetch window is widened by one day on each side because a
    /// source's own date can differ from the canonical one.
    pub async fn sync_source(&self, source: &dyn Source, range: &DateRange) -> EngineResult<SyncResult> {
        let kind = source.kind();
        self.record_store(kind)?;

        let window = range.widen(1);
        let records = self
            .settings
            .retry
            .run("fetch", || source.fetch(&window))
            .await?;
        debug!(source = %kind, fetched = records.len(), %window, "fetched records");

        let normalizer = &self.settings.normalizer;
        let in_range: Vec<SourceRecord> = records
            .into_iter()
            .filter(|r| match normalizer.normalize(kind, &r.raw_date()) {
                Ok(day) => range.contains(day),
                // Malformed dates are reported by the sync, not dropped.
                Err(_) => true,
            })
            .collect();

        self.sync_records(kind, in_range).await
    }

    /// Creates calendar events for unsynced pages dated inside `range`.
    pub async fn sync_calendar(
        &self,
        transformer: &EventTransformer,
        range: &DateRange,
    ) -> EngineResult<SyncResult> {
        let kind = transformer.source();
        let store = self.record_store(kind)?;
        let pages = store.query_unsynced(range).await?;

        let mut result = SyncResult::with_total(pages.len());
        info!(event = %transformer.name(), source = %kind, count = pages.len(), "syncing calendar");

        for (index, page) in pages.iter().enumerate() {
            if index > 0 {
                pause(self.settings.record_delay).await;
            }
            match self.sync_page(&store, transformer, page).await {
                Ok(external_id) => {
                    let mut item = SyncItem::new(&page.id);
                    item.page_id = Some(page.id.clone());
                    item.external_id = Some(external_id);
                    result.created.push(item);
                }
                Err(err) => {
                    warn!(event = %transformer.name(), page_id = %page.id, error = %err, "page failed");
                    result.fail(&page.id, &err);
                }
            }
        }

        info!(event = %transformer.name(), %result, "calendar sync finished");
        Ok(result)
    }

    async fn sync_page(
        &self,
        store: &RecordStore,
        transformer: &EventTransformer,
        page: &daysync_core::Page,
    ) -> EngineResult<String> {
        let event = transformer.transform(page)?;
        let external_id = self
            .settings
            .retry
            .run("create_event", || self.calendar.create_event(&event))
            .await?;

        if let Err(err) = store.mark_synced(&page.id, &external_id).await {
            warn!(page_id = %page.id, event_id = %external_id, error = %err, "marking failed, deleting event");
            if let Err(cleanup) = self
                .settings
                .retry
                .run("delete_event", || {
                    self.calendar.delete_event(&event.calendar_id, &external_id)
                })
                .await
            {
                warn!(event_id = %external_id, error = %cleanup, "could not delete orphaned event");
            }
            return Err(err);
        }
        debug!(page_id = %page.id, event_id = %external_id, "event created");
        Ok(external_id)
    }

    /// Deletes the calendar event recorded on a page and clears its status.
    ///
    /// Returns `true` if an event was deleted. An event already gone from
    /// the calendar still clears the page.
    pub async fn remove_calendar_event(
        &self,
        transformer: &EventTransformer,
        page_id: &str,
    ) -> EngineResult<bool> {
        let store = self.record_store(transformer.source())?;
        if store.settings().status.reference().is_none() {
            return Err(daysync_core::ConfigError::invalid(format!(
                "source {} has no event id property, cannot locate the event",
                transformer.source()
            ))
            .into());
        }

        let page = self
            .settings
            .retry
            .run("retrieve", || self.store.retrieve(page_id))
            .await?;

        let mut deleted = false;
        if let Some(event_id) = store.event_id(&page) {
            let calendar_id = transformer.calendar_id(&page)?;
            match self
                .settings
                .retry
                .run("delete_event", || self.calendar.delete_event(&calendar_id, event_id))
                .await
            {
                Ok(()) => deleted = true,
                Err(err) if err.code() == StoreErrorCode::NotFound => {
                    debug!(page_id, event_id, "event already gone");
                }
                Err(err) => return Err(err.into()),
            }
        }
        store.clear_synced(page_id).await?;
        info!(page_id, deleted, "calendar event removed");
        Ok(deleted)
    }

    /// Syncs every source in order, pausing between sources.
    ///
    /// A source that cannot be fetched is recorded and the run continues.
    pub async fn run_all(&self, sources: &[Arc<dyn Source>], range: &DateRange) -> RunReport {
        let mut report = RunReport::default();
        for (index, source) in sources.iter().enumerate() {
            if index > 0 {
                pause(self.settings.source_delay).await;
            }
            let kind = source.kind();
            let outcome = match self.sync_source(source.as_ref(), range).await {
                Ok(result) => SourceOutcome::Synced(result),
                Err(err) => {
                    warn!(source = %kind, error = %err, "source failed");
                    SourceOutcome::Failed(err)
                }
            };
            report.entries.push((kind, outcome));
        }
        info!(sources = report.entries.len(), created = report.created(), "run finished");
        report
    }
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

//! In-memory page store and calendar, optionally persisted to a JSON file.
//!
//! [`LocalStore`] implements both [`PageStore`] and [`CalendarSink`]. When
//! opened with a path, every write flushes a snapshot of the whole state
//! so that a later process sees the same pages and events.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use daysync_core::{CalendarEvent, Page, PropertyMap};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::error::{StoreError, StoreResult};
use crate::store::{BoxFuture, CalendarSink, Filter, PageStore, QueryPage};

const BACKEND: &str = "local";

/// Default number of pages returned per query call.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// A stored calendar event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub id: String,
    pub event: CalendarEvent,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    databases: BTreeMap<String, Vec<Page>>,
    #[serde(default)]
    events: Vec<StoredEvent>,
}

impl Snapshot {
    fn find_page_mut(&mut self, page_id: &str) -> Option<&mut Page> {
        self.databases
            .values_mut()
            .flat_map(|pages| pages.iter_mut())
            .find(|p| p.id == page_id)
    }
}

/// Page store and calendar backed by memory and an optional JSON file.
#[derive(Debug)]
pub struct LocalStore {
    path: Option<PathBuf>,
    page_size: usize,
    state: Mutex<Snapshot>,
}

impl Default for LocalStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl LocalStore {
    /// Creates an empty store that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            page_size: DEFAULT_PAGE_SIZE,
            state: Mutex::new(Snapshot::default()),
        }
    }

    /// Opens a store persisted at `path`, loading it if the file exists.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let snapshot = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                Snapshot::default()
            } else {
                serde_json::from_str(&content).map_err(|e| {
                    StoreError::invalid_response(format!(
                        "corrupt store file {}: {e}",
                        path.display()
                    ))
                    .with_backend(BACKEND)
                })?
            }
        } else {
            Snapshot::default()
        };
        debug!(path = %path.display(), "opened local store");
        Ok(Self {
            path: Some(path),
            page_size: DEFAULT_PAGE_SIZE,
            state: Mutex::new(snapshot),
        })
    }

    /// Builder: set the number of pages returned per query call.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Returns the backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns every page of a database in insertion order.
    pub async fn pages(&self, database_id: &str) -> Vec<Page> {
        let state = self.state.lock().await;
        state.databases.get(database_id).cloned().unwrap_or_default()
    }

    /// Returns every stored calendar event.
    pub async fn events(&self) -> Vec<StoredEvent> {
        self.state.lock().await.events.clone()
    }

    async fn persist(&self, snapshot: &Snapshot) -> StoreResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(snapshot)?;
        tokio::fs::write(path, json).await?;
        trace!(path = %path.display(), "flushed local store");
        Ok(())
    }

    /// Flushes `snapshot`, running `undo` on it when the flush fails so
    /// memory never holds a write the file does not.
    async fn commit(
        &self,
        snapshot: &mut Snapshot,
        undo: impl FnOnce(&mut Snapshot),
    ) -> StoreResult<()> {
        if let Err(err) = self.persist(snapshot).await {
            undo(snapshot);
            return Err(err.with_backend(BACKEND));
        }
        Ok(())
    }
}

impl PageStore for LocalStore {
    fn name(&self) -> &str {
        BACKEND
    }

    fn query<'a>(
        &'a self,
        database_id: &'a str,
        filter: &'a Filter,
        cursor: Option<String>,
    ) -> BoxFuture<'a, StoreResult<QueryPage>> {
        Box::pin(async move {
            let offset = match cursor {
                Some(c) => c.parse::<usize>().map_err(|_| {
                    StoreError::bad_request(format!("invalid cursor: {c}")).with_backend(BACKEND)
                })?,
                None => 0,
            };

            let state = self.state.lock().await;
            let matching: Vec<&Page> = state
                .databases
                .get(database_id)
                .map(|pages| pages.iter().filter(|p| filter.matches(p)).collect())
                .unwrap_or_default();

            let end = (offset + self.page_size).min(matching.len());
            let pages = matching
                .get(offset..end)
                .unwrap_or_default()
                .iter()
                .map(|p| (*p).clone())
                .collect();
            let next_cursor = (end < matching.len()).then(|| end.to_string());

            Ok(QueryPage { pages, next_cursor })
        })
    }

    fn retrieve<'a>(&'a self, page_id: &'a str) -> BoxFuture<'a, StoreResult<Page>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            state
                .databases
                .values()
                .flat_map(|pages| pages.iter())
                .find(|p| p.id == page_id)
                .cloned()
                .ok_or_else(|| {
                    StoreError::not_found(format!("page {page_id}")).with_backend(BACKEND)
                })
        })
    }

    fn create<'a>(
        &'a self,
        database_id: &'a str,
        properties: PropertyMap,
    ) -> BoxFuture<'a, StoreResult<Page>> {
        Box::pin(async move {
            let page = Page::new(uuid::Uuid::new_v4().to_string(), properties.into_inner());
            let mut state = self.state.lock().await;
            state
                .databases
                .entry(database_id.to_string())
                .or_default()
                .push(page.clone());
            self.commit(&mut state, |s| {
                if let Some(pages) = s.databases.get_mut(database_id) {
                    pages.pop();
                }
            })
            .await?;
            debug!(database_id, page_id = %page.id, "created page");
            Ok(page)
        })
    }

    fn update<'a>(
        &'a self,
        page_id: &'a str,
        properties: PropertyMap,
    ) -> BoxFuture<'a, StoreResult<Page>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let page = state.find_page_mut(page_id).ok_or_else(|| {
                StoreError::not_found(format!("page {page_id}")).with_backend(BACKEND)
            })?;
            let previous = page.clone();
            page.apply(properties);
            let updated = page.clone();
            self.commit(&mut state, |s| {
                if let Some(page) = s.find_page_mut(page_id) {
                    *page = previous;
                }
            })
            .await?;
            debug!(page_id, "updated page");
            Ok(updated)
        })
    }
}

impl CalendarSink for LocalStore {
    fn name(&self) -> &str {
        BACKEND
    }

    fn create_event<'a>(&'a self, event: &'a CalendarEvent) -> BoxFuture<'a, StoreResult<String>> {
        Box::pin(async move {
            let id = uuid::Uuid::new_v4().simple().to_string();
            let mut state = self.state.lock().await;
            state.events.push(StoredEvent {
                id: id.clone(),
                event: event.clone(),
            });
            self.commit(&mut state, |s| {
                s.events.pop();
            })
            .await?;
            debug!(calendar_id = %event.calendar_id, event_id = %id, "created event");
            Ok(id)
        })
    }

    fn delete_event<'a>(
        &'a self,
        calendar_id: &'a str,
        event_id: &'a str,
    ) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let Some(index) = state
                .events
                .iter()
                .position(|e| e.id == event_id && e.event.calendar_id == calendar_id)
            else {
                return Err(StoreError::not_found(format!(
                    "event {event_id} in calendar {calendar_id}"
                ))
                .with_backend(BACKEND));
            };
            let removed = state.events.remove(index);
            self.commit(&mut state, |s| s.events.insert(index, removed))
                .await?;
            debug!(calendar_id, event_id, "deleted event");
            Ok(())
        })
    }
}

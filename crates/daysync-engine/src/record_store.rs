//! Per-source access to the destination page store.
//!
//! A [`RecordStore`] is fully parameterized by a [`SourceSettings`]: which
//! database, which property holds the unique id, which holds the date, and
//! how the synced status is recorded.

use std::sync::Arc;

use daysync_core::{
    ConfigError, ConfigResult, DataError, DateRange, DateValue, Page, PropertyConfig, PropertyMap,
    PropertyValue, SourceKind,
};
use daysync_store::{Filter, PageStore, RetryPolicy};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::EngineResult;
use crate::source::DestinationRecord;

/// The type of the unique id property.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UniqueIdType {
    /// Compared by exact text match.
    #[default]
    Text,
    /// Compared numerically.
    Number,
}

impl UniqueIdType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
        }
    }
}

/// The property holding a record's unique id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueIdProperty {
    pub name: String,
    pub kind: UniqueIdType,
}

/// How a record's "synced to calendar" status is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusProperty {
    /// A checkbox.
    Checkbox(String),
    /// The external event id; empty means unsynced.
    Reference(String),
    /// Both. The checkbox is authoritative for the unsynced query.
    Hybrid { checkbox: String, reference: String },
}

impl StatusProperty {
    /// Picks the pattern from which properties are configured.
    pub fn detect(
        kind: SourceKind,
        checkbox: Option<&str>,
        reference: Option<&str>,
    ) -> ConfigResult<Self> {
        let checkbox = checkbox.map(str::trim).filter(|s| !s.is_empty());
        let reference = reference.map(str::trim).filter(|s| !s.is_empty());
        match (checkbox, reference) {
            (Some(c), Some(r)) => Ok(Self::Hybrid {
                checkbox: c.to_string(),
                reference: r.to_string(),
            }),
            (Some(c), None) => Ok(Self::Checkbox(c.to_string())),
            (None, Some(r)) => Ok(Self::Reference(r.to_string())),
            (None, None) => Err(ConfigError::MissingStatusProperty(kind.to_string())),
        }
    }

    /// Returns the checkbox property, if any.
    pub fn checkbox(&self) -> Option<&str> {
        match self {
            Self::Checkbox(c) | Self::Hybrid { checkbox: c, .. } => Some(c),
            Self::Reference(_) => None,
        }
    }

    /// Returns the reference property, if any.
    pub fn reference(&self) -> Option<&str> {
        match self {
            Self::Reference(r) | Self::Hybrid { reference: r, .. } => Some(r),
            Self::Checkbox(_) => None,
        }
    }

    /// Filter selecting unsynced pages.
    fn unsynced_filter(&self) -> Filter {
        match self {
            Self::Checkbox(c) | Self::Hybrid { checkbox: c, .. } => Filter::CheckboxEquals {
                property: c.clone(),
                value: false,
            },
            Self::Reference(r) => Filter::IsEmpty {
                property: r.clone(),
            },
        }
    }

    /// Property names written by this pattern.
    pub fn property_names(&self) -> Vec<&str> {
        self.checkbox().into_iter().chain(self.reference()).collect()
    }
}

/// Validated settings of one source.
#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub kind: SourceKind,
    pub database_id: String,
    pub unique_id: Option<UniqueIdProperty>,
    pub date_property: String,
    pub status: StatusProperty,
    pub properties: PropertyConfig,
}

/// CRUD over one source's database.
#[derive(Clone)]
pub struct RecordStore {
    settings: Arc<SourceSettings>,
    store: Arc<dyn PageStore>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("source", &self.settings.kind)
            .field("database_id", &self.settings.database_id)
            .field("backend", &self.store.name())
            .finish()
    }
}

impl RecordStore {
    /// Creates a record store for one source.
    pub fn new(settings: Arc<SourceSettings>, store: Arc<dyn PageStore>, retry: RetryPolicy) -> Self {
        Self {
            settings,
            store,
            retry,
        }
    }

    /// Returns the source settings.
    pub fn settings(&self) -> &SourceSettings {
        &self.settings
    }

    /// Finds the page holding `id`. Returns `None` when no unique id
    /// property is configured.
    pub async fn find_by_unique_id(&self, id: &str) -> EngineResult<Option<Page>> {
        let Some(unique) = &self.settings.unique_id else {
            return Ok(None);
        };
        let filter = match unique.kind {
            UniqueIdType::Number => Filter::NumberEquals {
                property: unique.name.clone(),
                value: parse_numeric_id(id)?,
            },
            UniqueIdType::Text => Filter::TextEquals {
                property: unique.name.clone(),
                value: id.to_string(),
            },
        };
        let db = self.settings.database_id.as_str();
        let result = self
            .retry
            .run("query", || self.store.query(db, &filter, None))
            .await?;
        trace!(source = %self.settings.kind, id, found = !result.pages.is_empty(), "unique id lookup");
        Ok(result.pages.into_iter().next())
    }

    /// Returns every unsynced page dated within `range`, following the
    /// store's cursor until exhausted.
    pub async fn query_unsynced(&self, range: &DateRange) -> EngineResult<Vec<Page>> {
        let date = &self.settings.date_property;
        let filter = Filter::and(vec![
            Filter::DateOnOrAfter {
                property: date.clone(),
                date: range.start.date(),
            },
            Filter::DateOnOrBefore {
                property: date.clone(),
                date: range.end.date(),
            },
            self.settings.status.unsynced_filter(),
        ]);

        let db = self.settings.database_id.as_str();
        let mut pages = Vec::new();
        let mut cursor = None;
        loop {
            let batch = self
                .retry
                .run("query", || self.store.query(db, &filter, cursor.clone()))
                .await?;
            pages.extend(batch.pages);
            match batch.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        debug!(source = %self.settings.kind, %range, count = pages.len(), "queried unsynced pages");
        Ok(pages)
    }

    /// Returns true if the page is marked as synced.
    pub fn is_synced(&self, page: &Page) -> bool {
        match &self.settings.status {
            StatusProperty::Checkbox(c) | StatusProperty::Hybrid { checkbox: c, .. } => {
                page.checkbox(c)
            }
            StatusProperty::Reference(r) => page.text(r).is_some_and(|s| !s.is_empty()),
        }
    }

    /// Returns the external event id recorded on the page.
    pub fn event_id<'p>(&self, page: &'p Page) -> Option<&'p str> {
        self.settings
            .status
            .reference()
            .and_then(|r| page.text(r))
            .filter(|s| !s.is_empty())
    }

    /// Records that `page_id` was synced as `external_id`.
    ///
    /// Returns `false` without writing when the page already carries this
    /// status.
    pub async fn mark_synced(&self, page_id: &str, external_id: &str) -> EngineResult<bool> {
        let page = self
            .retry
            .run("retrieve", || self.store.retrieve(page_id))
            .await?;

        let status = &self.settings.status;
        let mut update = PropertyMap::new();
        if let Some(c) = status.checkbox()
            && !page.checkbox(c)
        {
            update.insert(c, PropertyValue::Checkbox(true));
        }
        if let Some(r) = status.reference()
            && page.text(r) != Some(external_id)
        {
            update.insert(r, PropertyValue::RichText(external_id.to_string()));
        }

        if update.is_empty() {
            trace!(page_id, "already marked synced");
            return Ok(false);
        }
        self.retry
            .run("update", || self.store.update(page_id, update.clone()))
            .await?;
        debug!(source = %self.settings.kind, page_id, external_id, "marked synced");
        Ok(true)
    }

    /// Resets the synced status of a page.
    ///
    /// Returns `false` without writing when the page is already unsynced.
    pub async fn clear_synced(&self, page_id: &str) -> EngineResult<bool> {
        let page = self
            .retry
            .run("retrieve", || self.store.retrieve(page_id))
            .await?;

        let status = &self.settings.status;
        let mut update = PropertyMap::new();
        if let Some(c) = status.checkbox()
            && page.checkbox(c)
        {
            update.insert(c, PropertyValue::Checkbox(false));
        }
        if let Some(r) = status.reference()
            && page.text(r).is_some_and(|s| !s.is_empty())
        {
            update.insert(r, PropertyValue::RichText(String::new()));
        }

        if update.is_empty() {
            return Ok(false);
        }
        self.retry
            .run("update", || self.store.update(page_id, update.clone()))
            .await?;
        debug!(source = %self.settings.kind, page_id, "cleared synced status");
        Ok(true)
    }

    /// Writes a new destination record.
    pub async fn create(&self, record: &DestinationRecord) -> EngineResult<Page> {
        let payload = self.payload(record)?;
        let db = self.settings.database_id.as_str();
        let page = self
            .retry
            .run("create", || self.store.create(db, payload.clone()))
            .await?;
        debug!(
            source = %self.settings.kind,
            record_id = %record.unique_id,
            page_id = %page.id,
            "created page"
        );
        Ok(page)
    }

    /// Builds the create payload: unique id, date, initial status and the
    /// enabled data properties.
    pub fn payload(&self, record: &DestinationRecord) -> EngineResult<PropertyMap> {
        let settings = &self.settings;
        let values = record
            .values
            .iter()
            .filter(|(key, _)| settings.properties.descriptor(key).is_ok())
            .cloned();
        let mut payload = settings.properties.payload(values)?;

        if let Some(unique) = &settings.unique_id {
            let value = match unique.kind {
                UniqueIdType::Number => PropertyValue::Number(Some(parse_numeric_id(&record.unique_id)?)),
                UniqueIdType::Text => PropertyValue::RichText(record.unique_id.clone()),
            };
            payload.insert(unique.name.clone(), value);
        }
        payload.insert(
            settings.date_property.clone(),
            PropertyValue::Date(Some(DateValue::from(record.date))),
        );
        if let Some(c) = settings.status.checkbox() {
            payload.insert(c, PropertyValue::Checkbox(false));
        }
        Ok(payload)
    }
}

fn parse_numeric_id(id: &str) -> Result<f64, DataError> {
    id.trim()
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .ok_or_else(|| DataError::InvalidUniqueId {
            value: id.to_string(),
            expected: UniqueIdType::Number.as_str().to_string(),
        })
}

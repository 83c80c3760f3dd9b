//! Destination store and calendar traits.
//!
//! This module defines the two ports the engine writes through:
//!
//! - [`PageStore`]: a database of typed pages (query, retrieve, create, update)
//! - [`CalendarSink`]: a calendar service (create and delete events)
//!
//! Both traits return boxed futures so they stay object safe and can be
//! injected as `&dyn` / `Arc<dyn>`.

use std::future::Future;
use std::pin::Pin;

use chrono::NaiveDate;
use daysync_core::{CalendarEvent, Page, PropertyMap};
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;

/// A boxed future for async trait methods.
///
/// This is used because async functions in traits are not yet stable in a way
/// that works well with dynamic dispatch. Using boxed futures allows the trait
/// to be object-safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A query filter over page properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Filter {
    /// Every sub-filter must match. An empty list matches everything.
    And { filters: Vec<Filter> },
    /// A textual property equals the value exactly.
    TextEquals { property: String, value: String },
    /// A number property equals the value.
    NumberEquals { property: String, value: f64 },
    /// A checkbox equals the value. An unset checkbox reads as `false`.
    CheckboxEquals { property: String, value: bool },
    /// A date property falls on or after the day.
    DateOnOrAfter { property: String, date: NaiveDate },
    /// A date property falls on or before the day.
    DateOnOrBefore { property: String, date: NaiveDate },
    /// The property is absent or empty.
    IsEmpty { property: String },
}

impl Filter {
    /// Combines filters with logical AND.
    pub fn and(filters: Vec<Filter>) -> Self {
        Self::And { filters }
    }

    /// Evaluates the filter against a page.
    pub fn matches(&self, page: &Page) -> bool {
        match self {
            Self::And { filters } => filters.iter().all(|f| f.matches(page)),
            Self::TextEquals { property, value } => page.text(property) == Some(value.as_str()),
            Self::NumberEquals { property, value } => page.number(property) == Some(*value),
            Self::CheckboxEquals { property, value } => page.checkbox(property) == *value,
            Self::DateOnOrAfter { property, date } => {
                page.date(property).is_some_and(|d| d.day() >= *date)
            }
            Self::DateOnOrBefore { property, date } => {
                page.date(property).is_some_and(|d| d.day() <= *date)
            }
            Self::IsEmpty { property } => page.property(property).is_none_or(|v| v.is_empty()),
        }
    }
}

/// One page of query results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPage {
    /// Matching pages.
    pub pages: Vec<Page>,
    /// Cursor for the next page of results, `None` when exhausted.
    pub next_cursor: Option<String>,
}

/// A destination database of typed pages.
///
/// # Implementation Notes
///
/// - `query` returns at most one backend page of results; callers follow
///   `next_cursor` until it is `None`
/// - `update` merges the given properties into the page, leaving the others
///   untouched
/// - transient failures must be reported with a retryable error code
pub trait PageStore: Send + Sync {
    /// Returns the backend name (e.g., "local", "notion").
    fn name(&self) -> &str;

    /// Queries a database, starting at `cursor`.
    fn query<'a>(
        &'a self,
        database_id: &'a str,
        filter: &'a Filter,
        cursor: Option<String>,
    ) -> BoxFuture<'a, StoreResult<QueryPage>>;

    /// Fetches a single page by id.
    fn retrieve<'a>(&'a self, page_id: &'a str) -> BoxFuture<'a, StoreResult<Page>>;

    /// Creates a page in a database.
    fn create<'a>(
        &'a self,
        database_id: &'a str,
        properties: PropertyMap,
    ) -> BoxFuture<'a, StoreResult<Page>>;

    /// Updates properties of an existing page.
    fn update<'a>(
        &'a self,
        page_id: &'a str,
        properties: PropertyMap,
    ) -> BoxFuture<'a, StoreResult<Page>>;
}

/// A calendar service receiving derived events.
pub trait CalendarSink: Send + Sync {
    /// Returns the backend name.
    fn name(&self) -> &str;

    /// Creates an event and returns its external id.
    fn create_event<'a>(&'a self, event: &'a CalendarEvent) -> BoxFuture<'a, StoreResult<String>>;

    /// Deletes an event.
    fn delete_event<'a>(
        &'a self,
        calendar_id: &'a str,
        event_id: &'a str,
    ) -> BoxFuture<'a, StoreResult<()>>;
}

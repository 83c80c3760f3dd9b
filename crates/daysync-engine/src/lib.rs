//! Sync engine: record store, event transformers, calendar routing.
//!
//! This crate drives the reconciliation of source records against a
//! destination page store:
//! - Per-source CRUD and synced-status handling ([`RecordStore`])
//! - Config-driven page → calendar event transformation
//!   ([`EventTransformerBuilder`])
//! - Calendar routing by direct id, property value or category
//!   ([`CalendarIdResolver`])
//! - The fetch → dedup → create loop and calendar sync ([`SyncOrchestrator`])
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use daysync_core::SourceKind;
//! use daysync_engine::{EngineConfig, SyncOrchestrator, SourceRecord};
//! use daysync_store::LocalStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EngineConfig::load("config.toml".as_ref())?;
//!     let settings = Arc::new(config.validate()?);
//!     let store = Arc::new(LocalStore::open("store.json")?);
//!     let orchestrator = SyncOrchestrator::new(settings, store.clone(), store);
//!
//!     let records = SourceRecord::parse_batch(SourceKind::Sleep, "[]")?;
//!     let result = orchestrator.sync_records(SourceKind::Sleep, records).await?;
//!     println!("{result}");
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod orchestrator;
mod record_store;
mod resolver;
mod source;
mod transform;

pub use config::{EngineConfig, RetrySettings, Settings, SourceConfig};
pub use error::{EngineResult, SyncError};
pub use orchestrator::{
    RunReport, SourceOutcome, SyncFailure, SyncItem, SyncOrchestrator, SyncResult,
};
pub use record_store::{
    RecordStore, SourceSettings, StatusProperty, UniqueIdProperty, UniqueIdType,
};
pub use resolver::{CalendarIdResolver, CalendarMapping, CategoryRule};
pub use source::{
    BodyMeasurementRecord, CommitRecord, DestinationRecord, FieldValue, GameSessionRecord,
    MemorySource, SleepRecord, Source, SourceRecord, WorkoutRecord, property_keys,
    required_property_keys,
};
pub use transform::{
    DEFAULT_FALLBACK_SUMMARY, DurationSpec, DurationUnit, EventConfig, EventTransformer,
    EventTransformerBuilder, EventType, Extracted, TextFn, TimeSource, parse_time_of_day,
};

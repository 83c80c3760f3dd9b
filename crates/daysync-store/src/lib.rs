//! Ports between the sync engine and the outside world.
//!
//! - [`PageStore`] - A database of typed pages (the destination store)
//! - [`CalendarSink`] - A calendar service receiving derived events
//! - [`StoreError`] - Transport failures, tagged retryable or permanent
//! - [`RetryPolicy`] - Bounded exponential backoff over retryable failures
//! - [`LocalStore`] - In-memory implementation of both ports, optionally
//!   persisted to a JSON file
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐    ┌─────────────────┐
//! │  SyncOrchestr.  │    │  RecordStore    │
//! └────────┬────────┘    └────────┬────────┘
//!          │ CalendarSink         │ PageStore
//!          └──────────┬───────────┘
//!                     ▼
//!              ┌─────────────┐
//!              │ LocalStore  │  (or a remote backend)
//!              └─────────────┘
//! ```

pub mod error;
pub mod local;
pub mod retry;
pub mod store;

// Re-export main types at crate root
pub use error::{StoreError, StoreErrorCode, StoreResult};
pub use local::{LocalStore, StoredEvent};
pub use retry::RetryPolicy;
pub use store::{BoxFuture, CalendarSink, Filter, PageStore, QueryPage};

//! Records read from JSON files exported by the trackers.

use std::path::PathBuf;

use daysync_core::{DateRange, SourceKind};
use daysync_engine::{Source, SourceRecord};
use daysync_store::{BoxFuture, StoreError, StoreResult};
use tracing::debug;

/// A source backed by a JSON array on disk.
///
/// The whole file is returned on every fetch; the orchestrator keeps the
/// records dated inside the requested range.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    kind: SourceKind,
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(kind: SourceKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    async fn read(&self) -> StoreResult<Vec<SourceRecord>> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        let records = SourceRecord::parse_batch(self.kind, &content).map_err(|e| {
            StoreError::invalid_response(format!("{}: {e}", self.path.display()))
                .with_backend("json-file")
        })?;
        debug!(source = %self.kind, path = %self.path.display(), count = records.len(), "read records");
        Ok(records)
    }
}

impl Source for JsonFileSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn fetch<'a>(&'a self, _range: &'a DateRange) -> BoxFuture<'a, StoreResult<Vec<SourceRecord>>> {
        Box::pin(self.read())
    }
}

//! Log Ingestion
//!
//! The write path between ingestion callers and the column store:
//! records accumulate in a bounded in-memory buffer and leave it as bulk
//! inserts, either when a batch fills or when the flush timer fires.
//!
//! The buffer is deliberately lossy under sustained overload: when the
//! pending queue would exceed its bound, the **oldest** records are
//! dropped first and a counter is bumped. Log ingestion favors
//! availability over completeness; a full queue must never stall
//! producers or take the process down with it.

mod buffer;

pub use buffer::{BufferConfig, BufferStats, LogBuffer};

use async_trait::async_trait;

use crate::storage::{LogRecord, StorageResult};

/// Bulk-insert capability of a storage backend
///
/// The buffer depends on nothing else about the store.
#[async_trait]
pub trait BulkInsert: Send + Sync {
    /// Insert a batch of records, returning how many were written
    async fn insert_logs(&self, records: &[LogRecord]) -> StorageResult<u64>;
}

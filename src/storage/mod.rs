//! Loghouse storage layer
//!
//! Everything between a request contract and the column store:
//!
//! - **Types**: `LogRecord`, `LogFilter`, `AggregationFilter`, results
//! - **SQL**: statement builders (time-pruned, fully parameterized)
//! - **Repository**: statement execution and row decoding over a backend
//!
//! The target schema is one wide event table keyed for ordered scan by
//! `(agent_id, type, level, timestamp, id)`, partitioned by month, with
//! JSON-encoded text columns for `fields`/`labels` and token-bloom
//! secondary indexes over `message`/`source`/`file_path`.

mod error;
mod repository;
pub mod sql;
mod types;

pub use error::{StorageError, StorageResult};
pub use repository::{Backend, LogRepository};
pub use types::{
    AggregationFilter, ErrorRateSummary, Granularity, HttpStats, LogFilter, LogRecord,
    QueryPage, SearchMode, SortColumn, SortOrder, SourceCount, SqlValue, StatusClassCount,
    UriCount, VolumeBucket,
};

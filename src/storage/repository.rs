//! Log repository
//!
//! Executes the built statements against a [`Backend`] and decodes the
//! JSON rows it returns. The repository adds no retry and no
//! reinterpretation of failures - execution errors propagate unchanged,
//! and cancellation/timeouts are the caller's concern.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;

use crate::ingest::BulkInsert;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::sql;
use crate::storage::types::{
    AggregationFilter, ErrorRateSummary, Granularity, HttpStats, LogFilter, LogRecord,
    QueryPage, SourceCount, SqlValue, StatusClassCount, UriCount, VolumeBucket,
};

/// Default LIMIT for the top-URIs statement
const TOP_URI_LIMIT: u64 = 10;

/// Statement execution surface of the column store
///
/// Rows come back as JSON objects (JSONEachRow style), one per result
/// row. Implementations own connection handling and wire formats.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Bulk-insert records into the event table
    async fn insert(&self, records: &[LogRecord]) -> StorageResult<u64>;

    /// Execute a parameterized statement and return its rows
    async fn select(&self, sql: &str, args: &[SqlValue]) -> StorageResult<Vec<serde_json::Value>>;
}

/// High-level query/aggregation surface over a backend
pub struct LogRepository<B: Backend> {
    backend: Arc<B>,
}

impl<B: Backend> LogRepository<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    /// Fetch one page of records plus the total match count
    pub async fn query(&self, filter: &LogFilter) -> StorageResult<QueryPage> {
        let (query_sql, query_args) = sql::build_query(filter);
        let (count_sql, count_args) = sql::build_count(filter);

        // Independent read-only statements; run them concurrently
        let (rows, count_rows) = tokio::join!(
            self.backend.select(&query_sql, &query_args),
            self.backend.select(&count_sql, &count_args),
        );

        let records = decode_rows::<LogRecord>(rows?)?;
        let total = single_u64(count_rows?, "total")?;
        let has_more = filter.page.saturating_mul(filter.page_size) < total;

        Ok(QueryPage {
            records,
            total,
            has_more,
        })
    }

    /// Count matching records without fetching them
    pub async fn count(&self, filter: &LogFilter) -> StorageResult<u64> {
        let (count_sql, count_args) = sql::build_count(filter);
        let rows = self.backend.select(&count_sql, &count_args).await?;
        single_u64(rows, "total")
    }

    /// Error-rate summary over the filtered range
    pub async fn error_rates(&self, filter: &AggregationFilter) -> StorageResult<ErrorRateSummary> {
        #[derive(Deserialize)]
        struct Row {
            total: u64,
            error: u64,
            warning: u64,
            fatal: u64,
        }

        let (rates_sql, rates_args) = sql::build_error_rates(filter);
        let rows = self.backend.select(&rates_sql, &rates_args).await?;

        let summary = match rows.into_iter().next() {
            Some(row) => {
                let row: Row = serde_json::from_value(row)?;
                ErrorRateSummary::from_counts(row.total, row.error, row.warning, row.fatal)
            }
            None => ErrorRateSummary::from_counts(0, 0, 0, 0),
        };
        Ok(summary)
    }

    /// Top-N sources by event count
    pub async fn top_sources(
        &self,
        filter: &AggregationFilter,
        limit: u64,
    ) -> StorageResult<Vec<SourceCount>> {
        let (sources_sql, sources_args) = sql::build_top_sources(filter, limit);
        let rows = self.backend.select(&sources_sql, &sources_args).await?;
        decode_rows(rows)
    }

    /// Time-bucketed event volume
    pub async fn volume(
        &self,
        filter: &AggregationFilter,
        granularity: Granularity,
    ) -> StorageResult<Vec<VolumeBucket>> {
        let (volume_sql, volume_args) = sql::build_volume(filter, granularity);
        let rows = self.backend.select(&volume_sql, &volume_args).await?;
        decode_rows(rows)
    }

    /// HTTP status-class distribution and top URIs
    ///
    /// Two independent statements, issued concurrently.
    pub async fn http_stats(&self, filter: &AggregationFilter) -> StorageResult<HttpStats> {
        let (classes_sql, classes_args) = sql::build_http_status_classes(filter);
        let (uris_sql, uris_args) = sql::build_http_top_uris(filter, TOP_URI_LIMIT);

        let (class_rows, uri_rows) = tokio::join!(
            self.backend.select(&classes_sql, &classes_args),
            self.backend.select(&uris_sql, &uris_args),
        );

        Ok(HttpStats {
            classes: decode_rows::<StatusClassCount>(class_rows?)?,
            top_uris: decode_rows::<UriCount>(uri_rows?)?,
        })
    }
}

/// The repository is itself a valid buffer sink
#[async_trait]
impl<B: Backend> BulkInsert for LogRepository<B> {
    async fn insert_logs(&self, records: &[LogRecord]) -> StorageResult<u64> {
        self.backend.insert(records).await
    }
}

fn decode_rows<T: DeserializeOwned>(rows: Vec<serde_json::Value>) -> StorageResult<Vec<T>> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(StorageError::from))
        .collect()
}

/// Pull one u64 column out of a single-row result
fn single_u64(rows: Vec<serde_json::Value>, column: &'static str) -> StorageResult<u64> {
    match rows.first() {
        Some(row) => row
            .get(column)
            .and_then(serde_json::Value::as_u64)
            .ok_or(StorageError::MissingColumn(column)),
        None => Ok(0),
    }
}

//! Core data types for the loghouse storage layer
//!
//! This module defines the fundamental types used throughout the engine:
//! - `LogRecord`: a single ingested log event
//! - `LogFilter` / `AggregationFilter`: request-scoped query descriptions
//! - `SqlValue`: a positional SQL argument
//! - Aggregation result types (`ErrorRateSummary`, `VolumeBucket`, ...)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::query::CompiledFilter;

/// A single log event
///
/// Created by ingestion callers, owned by the buffer until flushed,
/// storage-owned thereafter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogRecord {
    /// Unique event id
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    /// Event timestamp
    pub timestamp: DateTime<Utc>,
    /// Severity: debug, info, warning, error, fatal
    #[serde(default)]
    pub level: String,
    /// Log message body
    #[serde(default)]
    pub message: String,
    /// Originating service or host
    #[serde(default)]
    pub source: String,
    /// Event type classifier (e.g. "app", "access", "syslog")
    #[serde(rename = "type", default)]
    pub record_type: String,
    /// Raw, unparsed line as received
    #[serde(default)]
    pub raw: String,
    /// Id of the agent that shipped the event
    #[serde(default)]
    pub agent_id: String,
    /// Path of the file the event was read from
    #[serde(default)]
    pub file_path: String,
    /// Line number within the file
    #[serde(default)]
    pub line_number: u32,
    /// Semi-structured extracted fields
    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
    /// String-keyed labels attached at ingestion
    #[serde(default)]
    pub labels: HashMap<String, String>,
    /// Denormalized HTTP status (0 when not an HTTP event)
    #[serde(default)]
    pub http_status: u16,
    /// Denormalized HTTP method
    #[serde(default)]
    pub http_method: String,
    /// Denormalized request URI
    #[serde(default)]
    pub uri: String,
}

impl LogRecord {
    /// Create a minimal record with the current timestamp
    pub fn new(level: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            level: level.into(),
            message: message.into(),
            source: String::new(),
            record_type: String::new(),
            raw: String::new(),
            agent_id: String::new(),
            file_path: String::new(),
            line_number: 0,
            fields: serde_json::Map::new(),
            labels: HashMap::new(),
            http_status: 0,
            http_method: String::new(),
            uri: String::new(),
        }
    }

    /// Builder method: set the event timestamp
    pub fn timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.timestamp = ts;
        self
    }

    /// Builder method: set the source
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Builder method: set the agent id
    pub fn agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = agent_id.into();
        self
    }

    /// Builder method: set the event type
    pub fn record_type(mut self, record_type: impl Into<String>) -> Self {
        self.record_type = record_type.into();
        self
    }

    /// Builder method: set file origin
    pub fn file(mut self, path: impl Into<String>, line: u32) -> Self {
        self.file_path = path.into();
        self.line_number = line;
        self
    }

    /// Builder method: attach a label
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Builder method: attach an extracted field
    pub fn field(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// Builder method: set the denormalized HTTP triple
    pub fn http(mut self, status: u16, method: impl Into<String>, uri: impl Into<String>) -> Self {
        self.http_status = status;
        self.http_method = method.into();
        self.uri = uri.into();
        self
    }
}

/// A positional SQL statement argument
///
/// The compiler and statement builders never embed values in SQL text;
/// every value travels through this type instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Str(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Str(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::Str(v.format("%Y-%m-%d %H:%M:%S").to_string())
    }
}

/// How free-text search is matched against the message column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Whole-word match via the token index (fast, exact-word)
    Token,
    /// Raw substring test (no index use, matches inside words)
    Substring,
    /// Every whitespace-separated word must match as a token.
    ///
    /// Note: despite the name this is co-occurrence, not adjacency -
    /// the words may appear anywhere in the message, in any order.
    /// Preserved as shipped; callers may depend on either reading.
    Phrase,
}

impl Default for SearchMode {
    fn default() -> Self {
        SearchMode::Token
    }
}

/// Sort column for log queries (timestamp is the default)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortColumn {
    Timestamp,
    Level,
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Query description for fetching log records
///
/// Immutable once built; consumed by the statement builders. When
/// `expression` is set it replaces every discrete filter below it
/// (including free-text search) - structured expression wins outright.
#[derive(Debug, Clone)]
pub struct LogFilter {
    /// Inclusive lower time bound
    pub start: DateTime<Utc>,
    /// Inclusive upper time bound
    pub end: DateTime<Utc>,
    /// Restrict to one agent
    pub agent_id: Option<String>,
    /// Restrict to any of these levels
    pub levels: Vec<String>,
    /// Restrict to any of these event types
    pub types: Vec<String>,
    /// Restrict to one source
    pub source: Option<String>,
    /// Restrict to one file path
    pub file_path: Option<String>,
    /// Free-text search over the message column
    pub search: Option<String>,
    /// How `search` is matched
    pub search_mode: SearchMode,
    /// Pre-compiled filter expression; replaces all discrete filters
    pub expression: Option<CompiledFilter>,
    /// 1-based page number
    pub page: u64,
    /// Page size
    pub page_size: u64,
    /// Sort column
    pub sort: SortColumn,
    /// Sort direction
    pub order: SortOrder,
}

impl LogFilter {
    /// Create a filter over a time range with default paging and sort
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            agent_id: None,
            levels: Vec::new(),
            types: Vec::new(),
            source: None,
            file_path: None,
            search: None,
            search_mode: SearchMode::default(),
            expression: None,
            page: 1,
            page_size: 100,
            sort: SortColumn::Timestamp,
            order: SortOrder::Desc,
        }
    }

    /// Builder method: restrict to an agent
    pub fn agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    /// Builder method: restrict to levels
    pub fn levels(mut self, levels: &[&str]) -> Self {
        self.levels = levels.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Builder method: restrict to event types
    pub fn types(mut self, types: &[&str]) -> Self {
        self.types = types.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Builder method: restrict to one source
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Builder method: restrict to one file path
    pub fn file_path(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    /// Builder method: free-text search
    pub fn search(mut self, text: impl Into<String>, mode: SearchMode) -> Self {
        self.search = Some(text.into());
        self.search_mode = mode;
        self
    }

    /// Builder method: attach a compiled filter expression
    pub fn expression(mut self, compiled: CompiledFilter) -> Self {
        self.expression = Some(compiled);
        self
    }

    /// Builder method: pagination (1-based page)
    pub fn page(mut self, page: u64, page_size: u64) -> Self {
        self.page = page.max(1);
        self.page_size = page_size;
        self
    }

    /// Builder method: sort column and direction
    pub fn sort(mut self, sort: SortColumn, order: SortOrder) -> Self {
        self.sort = sort;
        self.order = order;
        self
    }

    /// OFFSET value implied by the 1-based page number
    ///
    /// `page` is a public field, so a caller can hold a zero in it
    /// without going through the builder's clamp; treat that as page 1.
    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.page_size)
    }
}

/// Narrower filter for aggregation statements: time range, agent and
/// type only - no free text, no pagination.
#[derive(Debug, Clone)]
pub struct AggregationFilter {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub agent_id: Option<String>,
    pub record_type: Option<String>,
}

impl AggregationFilter {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            agent_id: None,
            record_type: None,
        }
    }

    /// Builder method: restrict to an agent
    pub fn agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    /// Builder method: restrict to an event type
    pub fn record_type(mut self, record_type: impl Into<String>) -> Self {
        self.record_type = Some(record_type.into());
        self
    }
}

/// Time-bucket granularity for volume aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Minute,
    Hour,
    Day,
}

/// One page of query results
#[derive(Debug, Clone, Serialize)]
pub struct QueryPage {
    pub records: Vec<LogRecord>,
    pub total: u64,
    pub has_more: bool,
}

/// Error-rate summary over a time range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRateSummary {
    pub total: u64,
    pub error: u64,
    pub warning: u64,
    pub fatal: u64,
    /// (error + fatal) / total; 0 when total is 0
    pub rate: f64,
}

impl ErrorRateSummary {
    /// Compute the summary from raw level counts
    pub fn from_counts(total: u64, error: u64, warning: u64, fatal: u64) -> Self {
        let rate = if total == 0 {
            0.0
        } else {
            (error + fatal) as f64 / total as f64
        };
        Self {
            total,
            error,
            warning,
            fatal,
            rate,
        }
    }
}

/// One source with its event count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceCount {
    pub source: String,
    pub hits: u64,
}

/// One time bucket with its event count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeBucket {
    pub bucket: String,
    pub hits: u64,
}

/// Count of events in one HTTP status class (2xx, 4xx, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusClassCount {
    /// Status class: 2 for 2xx, 4 for 4xx, ...
    pub class: u8,
    pub hits: u64,
}

/// One URI with its request count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UriCount {
    pub uri: String,
    pub hits: u64,
}

/// HTTP statistics: status-class distribution plus top URIs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HttpStats {
    pub classes: Vec<StatusClassCount>,
    pub top_uris: Vec<UriCount>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_record_builder() {
        let rec = LogRecord::new("error", "connection refused")
            .source("api-1")
            .agent("agent-7")
            .record_type("app")
            .file("/var/log/app.log", 42)
            .label("env", "prod")
            .http(502, "GET", "/healthz");

        assert_eq!(rec.level, "error");
        assert_eq!(rec.agent_id, "agent-7");
        assert_eq!(rec.line_number, 42);
        assert_eq!(rec.labels.get("env").map(String::as_str), Some("prod"));
        assert_eq!(rec.http_status, 502);
    }

    #[test]
    fn test_record_serde_type_rename() {
        let rec = LogRecord::new("info", "ok").record_type("access");
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["type"], "access");

        let back: LogRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back.record_type, "access");
    }

    #[test]
    fn test_filter_offset() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();

        let filter = LogFilter::new(start, end).page(3, 50);
        assert_eq!(filter.offset(), 100);

        // page is 1-based; page 0 is clamped
        let filter = LogFilter::new(start, end).page(0, 50);
        assert_eq!(filter.offset(), 0);

        // A zero written straight into the public field must not underflow
        let mut filter = LogFilter::new(start, end);
        filter.page = 0;
        filter.page_size = 50;
        assert_eq!(filter.offset(), 0);
    }

    #[test]
    fn test_error_rate_arithmetic() {
        // {info: 2, warning: 1, error: 1, fatal: 1} out of 5
        let summary = ErrorRateSummary::from_counts(5, 1, 1, 1);
        assert_eq!(summary.total, 5);
        assert_eq!(summary.error, 1);
        assert_eq!(summary.warning, 1);
        assert_eq!(summary.fatal, 1);
        assert!((summary.rate - 0.4).abs() < f64::EPSILON);
    }

    #[test]
    fn test_error_rate_empty() {
        let summary = ErrorRateSummary::from_counts(0, 0, 0, 0);
        assert_eq!(summary.rate, 0.0);
    }

    #[test]
    fn test_sql_value_from_datetime() {
        let ts = Utc.with_ymd_and_hms(2024, 6, 1, 12, 30, 0).unwrap();
        assert_eq!(SqlValue::from(ts), SqlValue::Str("2024-06-01 12:30:00".into()));
    }
}

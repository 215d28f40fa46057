//! # Loghouse
//!
//! A log ingestion and analytics engine: batched, backpressured writes
//! into a column-oriented store, and a compiler that turns untrusted
//! filter expressions into safe, parameterized SQL against it.
//!
//! ## Features
//!
//! - **Safe filter compiler**: every expression literal leaves the SQL
//!   text as a positional placeholder; nothing the caller wrote is ever
//!   interpolated
//! - **Bounded ingestion buffer**: size- and timer-triggered bulk
//!   inserts, oldest-first eviction under pressure
//! - **Time-pruned queries**: range bounds ride in a PREWHERE clause so
//!   the store skips irrelevant data blocks before filtering
//! - **Side-by-side aggregations**: error rates, top sources, volume
//!   buckets, HTTP stats - independent statements, issued concurrently
//!
//! ## Modules
//!
//! - [`query`]: expression parser and SQL compiler
//! - [`ingest`]: batching ingestion buffer
//! - [`storage`]: record/filter types, statement builders, repository
//! - [`config`]: TOML configuration and logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use loghouse::query::compile_expression;
//! use loghouse::storage::{LogFilter, SearchMode};
//! use chrono::{Duration, Utc};
//!
//! // Compile an untrusted filter expression
//! let compiled = compile_expression(
//!     r#"level == "error" and http_status >= 500"#,
//! ).unwrap();
//! assert_eq!(compiled.sql, "((lower(level) = ?) AND (http_status >= ?))");
//!
//! // Describe a query over the last hour
//! let now = Utc::now();
//! let filter = LogFilter::new(now - Duration::hours(1), now)
//!     .search("timeout", SearchMode::Token)
//!     .page(1, 50);
//! ```

pub mod config;
pub mod ingest;
pub mod query;
pub mod storage;

// Re-export top-level types for convenience
pub use query::{
    compile, compile_expression, parse_expression, CompileError, CompiledFilter, Expr,
    ExpressionError, ParseError,
};

pub use ingest::{BufferConfig, BufferStats, BulkInsert, LogBuffer};

pub use storage::{
    AggregationFilter, Backend, ErrorRateSummary, Granularity, HttpStats, LogFilter,
    LogRecord, LogRepository, QueryPage, SearchMode, SortColumn, SortOrder, SqlValue,
    StorageError, StorageResult,
};

pub use config::{Config, ConfigError, LoggingConfig};

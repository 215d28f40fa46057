//! SQL statement builders
//!
//! Assembles full statements for the column store from `LogFilter` /
//! `AggregationFilter`. Time-range bounds always go into a PREWHERE
//! clause so the store prunes partitions and granules on the ordered
//! timestamp column before evaluating the general predicate; everything
//! else is rendered as parameterized equality or `IN (...)`.
//!
//! When a filter carries a compiled expression fragment, the fragment
//! **replaces** all discrete flat filters (including free-text search).
//! Structured expression wins outright; it is not AND-ed with the rest.

use crate::storage::types::{
    AggregationFilter, Granularity, LogFilter, SearchMode, SortColumn, SortOrder, SqlValue,
};

/// The wide event table
pub const LOG_TABLE: &str = "logs";

/// Columns selected for full records, in `LogRecord` field order
const RECORD_COLUMNS: &str = "id, timestamp, level, message, source, type, raw, agent_id, \
     file_path, line_number, fields, labels, http_status, http_method, uri";

/// A full statement: SQL text plus positional arguments
pub type Statement = (String, Vec<SqlValue>);

/// Build the record-fetch statement for a `LogFilter`
pub fn build_query(filter: &LogFilter) -> Statement {
    let (mut sql, mut args) = base_select(&format!("SELECT {RECORD_COLUMNS}"), filter);

    sql.push_str(&format!(" ORDER BY {}", order_by(filter.sort, filter.order)));
    sql.push_str(" LIMIT ? OFFSET ?");
    args.push(SqlValue::Int(filter.page_size as i64));
    args.push(SqlValue::Int(filter.offset() as i64));

    (sql, args)
}

/// Build the matching-count statement for a `LogFilter`
pub fn build_count(filter: &LogFilter) -> Statement {
    base_select("SELECT count() AS total", filter)
}

/// Error-rate summary: total plus per-severity counts
pub fn build_error_rates(filter: &AggregationFilter) -> Statement {
    let (clause, args) = aggregation_where(filter);
    let sql = format!(
        "SELECT count() AS total, countIf(level = 'error') AS error, \
         countIf(level = 'warning') AS warning, countIf(level = 'fatal') AS fatal \
         FROM {LOG_TABLE}{clause}"
    );
    (sql, args)
}

/// Top-N sources by event count
pub fn build_top_sources(filter: &AggregationFilter, limit: u64) -> Statement {
    let (clause, mut args) = aggregation_where(filter);
    let sql = format!(
        "SELECT source, count() AS hits FROM {LOG_TABLE}{clause} \
         GROUP BY source ORDER BY hits DESC LIMIT ?"
    );
    args.push(SqlValue::Int(limit as i64));
    (sql, args)
}

/// Time-bucketed event volume
pub fn build_volume(filter: &AggregationFilter, granularity: Granularity) -> Statement {
    let bucket_fn = match granularity {
        Granularity::Minute => "toStartOfMinute",
        Granularity::Hour => "toStartOfHour",
        Granularity::Day => "toStartOfDay",
    };
    let (clause, args) = aggregation_where(filter);
    let sql = format!(
        "SELECT {bucket_fn}(timestamp) AS bucket, count() AS hits \
         FROM {LOG_TABLE}{clause} GROUP BY bucket ORDER BY bucket"
    );
    (sql, args)
}

/// HTTP status-class distribution (2xx/3xx/4xx/5xx)
pub fn build_http_status_classes(filter: &AggregationFilter) -> Statement {
    let (clause, args) = aggregation_where_with(filter, Some("http_status > 0"));
    let sql = format!(
        "SELECT intDiv(http_status, 100) AS class, count() AS hits \
         FROM {LOG_TABLE}{clause} GROUP BY class ORDER BY class"
    );
    (sql, args)
}

/// Most-requested URIs among HTTP events
pub fn build_http_top_uris(filter: &AggregationFilter, limit: u64) -> Statement {
    let (clause, mut args) = aggregation_where_with(filter, Some("http_status > 0"));
    let sql = format!(
        "SELECT uri, count() AS hits FROM {LOG_TABLE}{clause} \
         GROUP BY uri ORDER BY hits DESC LIMIT ?"
    );
    args.push(SqlValue::Int(limit as i64));
    (sql, args)
}

/// Shared SELECT ... PREWHERE ... [WHERE ...] prefix for log queries
fn base_select(select: &str, filter: &LogFilter) -> Statement {
    let mut sql = format!(
        "{select} FROM {LOG_TABLE} PREWHERE timestamp >= ? AND timestamp <= ?"
    );
    let mut args: Vec<SqlValue> = vec![filter.start.into(), filter.end.into()];

    let (terms, mut term_args) = predicates(filter);
    if !terms.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&terms.join(" AND "));
        args.append(&mut term_args);
    }

    (sql, args)
}

/// General-predicate terms for a `LogFilter`
fn predicates(filter: &LogFilter) -> (Vec<String>, Vec<SqlValue>) {
    // Structured expression replaces every flat filter
    if let Some(compiled) = &filter.expression {
        return (vec![compiled.sql.clone()], compiled.args.clone());
    }

    let mut terms = Vec::new();
    let mut args = Vec::new();

    if let Some(agent_id) = &filter.agent_id {
        terms.push("agent_id = ?".to_string());
        args.push(SqlValue::Str(agent_id.clone()));
    }
    if !filter.levels.is_empty() {
        terms.push(format!("level IN ({})", placeholders(filter.levels.len())));
        args.extend(filter.levels.iter().map(|l| SqlValue::Str(l.clone())));
    }
    if !filter.types.is_empty() {
        terms.push(format!("type IN ({})", placeholders(filter.types.len())));
        args.extend(filter.types.iter().map(|t| SqlValue::Str(t.clone())));
    }
    if let Some(source) = &filter.source {
        terms.push("source = ?".to_string());
        args.push(SqlValue::Str(source.clone()));
    }
    if let Some(file_path) = &filter.file_path {
        terms.push("file_path = ?".to_string());
        args.push(SqlValue::Str(file_path.clone()));
    }
    if let Some(search) = &filter.search {
        if let Some((term, mut search_args)) = search_term(search, filter.search_mode) {
            terms.push(term);
            args.append(&mut search_args);
        }
    }

    (terms, args)
}

/// Free-text search predicate for one of the three modes
fn search_term(search: &str, mode: SearchMode) -> Option<(String, Vec<SqlValue>)> {
    let search = search.trim();
    if search.is_empty() {
        return None;
    }

    match mode {
        // Whole-word match through the token index
        SearchMode::Token => Some((
            "hasToken(lower(message), ?)".to_string(),
            vec![SqlValue::Str(search.to_lowercase())],
        )),
        // Raw substring scan; matches inside words, skips the index
        SearchMode::Substring => Some((
            "position(lower(message), ?) > 0".to_string(),
            vec![SqlValue::Str(search.to_lowercase())],
        )),
        // Every word must match as a token - co-occurrence, not adjacency
        SearchMode::Phrase => {
            let words: Vec<&str> = search.split_whitespace().collect();
            let terms: Vec<String> = words
                .iter()
                .map(|_| "hasToken(lower(message), ?)".to_string())
                .collect();
            let args = words
                .iter()
                .map(|w| SqlValue::Str(w.to_lowercase()))
                .collect();
            let clause = if terms.len() == 1 {
                terms.into_iter().next()?
            } else {
                format!("({})", terms.join(" AND "))
            };
            Some((clause, args))
        }
    }
}

/// PREWHERE + optional WHERE for the narrower aggregation filter
fn aggregation_where(filter: &AggregationFilter) -> (String, Vec<SqlValue>) {
    aggregation_where_with(filter, None)
}

fn aggregation_where_with(
    filter: &AggregationFilter,
    extra: Option<&str>,
) -> (String, Vec<SqlValue>) {
    let mut clause = " PREWHERE timestamp >= ? AND timestamp <= ?".to_string();
    let mut args: Vec<SqlValue> = vec![filter.start.into(), filter.end.into()];

    let mut terms: Vec<String> = Vec::new();
    if let Some(extra) = extra {
        terms.push(extra.to_string());
    }
    if let Some(agent_id) = &filter.agent_id {
        terms.push("agent_id = ?".to_string());
        args.push(SqlValue::Str(agent_id.clone()));
    }
    if let Some(record_type) = &filter.record_type {
        terms.push("type = ?".to_string());
        args.push(SqlValue::Str(record_type.clone()));
    }

    if !terms.is_empty() {
        clause.push_str(" WHERE ");
        clause.push_str(&terms.join(" AND "));
    }

    (clause, args)
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn order_by(sort: SortColumn, order: SortOrder) -> String {
    let dir = match order {
        SortOrder::Asc => "ASC",
        SortOrder::Desc => "DESC",
    };
    match sort {
        // id tiebreak keeps pagination stable within one timestamp
        SortColumn::Timestamp => format!("timestamp {dir}, id {dir}"),
        SortColumn::Level => format!("level {dir}, timestamp DESC"),
    }
}

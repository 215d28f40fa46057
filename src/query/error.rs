//! Query error types
//!
//! Defines all error conditions that can occur while parsing a filter
//! expression or compiling it to SQL. Both families are surfaced to the
//! caller verbatim as a rejection of the request and are never retried.

use thiserror::Error;

/// Errors produced while parsing an expression into an AST
#[derive(Error, Debug, PartialEq)]
pub enum ParseError {
    /// The expression was empty or whitespace only
    #[error("Empty expression")]
    Empty,

    /// The expression exceeds the maximum accepted length
    #[error("Expression too long: {0} characters (max {max})", max = crate::query::MAX_EXPRESSION_LEN)]
    TooLong(usize),

    /// The expression is not valid under the grammar
    #[error("Syntax error near: '{0}'")]
    Syntax(String),

    /// An identifier does not name a queryable field
    #[error("Unknown field: {0}")]
    UnknownField(String),
}

/// Errors produced while compiling an AST to SQL
///
/// On any of these, no SQL is returned - compilation is all or nothing.
#[derive(Error, Debug, PartialEq)]
pub enum CompileError {
    /// The identifier does not resolve in the field registry
    #[error("Unknown field: {0}")]
    UnknownField(String),

    /// The operator is not permitted for this field's type
    #[error("Operator '{op}' not allowed for field '{field}'")]
    OperatorNotAllowed { field: String, op: String },

    /// The AST contains a shape the compiler does not support
    #[error("Unsupported expression: {0}")]
    Unsupported(String),

    /// Member access on a field that is not JSON-typed
    #[error("Field '{0}' does not support member access")]
    NotJsonField(String),

    /// JSON property name failed the identifier allow-list
    #[error("Invalid JSON property name: '{0}'")]
    InvalidJsonProperty(String),

    /// Regex pattern with a catastrophic-backtracking shape
    #[error("Regex pattern rejected (nested quantifier): '{0}'")]
    RedosPattern(String),

    /// Regex pattern that does not compile at all
    #[error("Invalid regex pattern: {0}")]
    InvalidRegex(String),

    /// Malformed or unsupported duration literal
    #[error("Invalid duration literal: '{0}'")]
    BadDuration(String),

    /// A function other than now() or duration()
    #[error("Unknown function: {0}")]
    UnknownFunction(String),
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, ParseError>;

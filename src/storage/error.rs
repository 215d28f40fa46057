//! Storage error types

use thiserror::Error;

/// Errors that can occur in the storage layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// The backing store rejected or failed a statement
    #[error("Backend error: {0}")]
    Backend(String),

    /// A result row could not be decoded into the expected shape
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// A result row was missing an expected column
    #[error("Missing column in result row: {0}")]
    MissingColumn(&'static str),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

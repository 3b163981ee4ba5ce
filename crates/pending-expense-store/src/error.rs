//! Store error types.

use thiserror::Error;

/// Store error type.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(String),

    /// A buffer lock was poisoned by a panicking holder
    #[error("Lock poisoned: {0}")]
    Lock(String),

    /// Stored slot is not a JSON array
    #[error("Invalid slot data: {0}")]
    InvalidSlot(String),
}

/// Result type alias using StoreError.
pub type StoreResult<T> = Result<T, StoreError>;

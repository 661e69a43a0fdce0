//! Error types for the trade journal

use thiserror::Error;

/// Errors surfaced by the journal store and the broker-file importer.
#[derive(Debug, Error)]
pub enum JournalError {
    /// Required field missing or invalid on write; names the offending field.
    #[error("invalid {field}: {reason}")]
    Constraint { field: &'static str, reason: String },

    /// Update target id does not exist. Deletes are idempotent and never
    /// raise this.
    #[error("trade {0} not found")]
    NotFound(i64),

    /// A selected import file matches neither known broker table shape, or
    /// its rows cannot be read.
    #[error("unrecognized source format: {0}")]
    Format(String),

    /// Caller asked for something outside the supported set, e.g. a
    /// non-whitelisted column in a distinct-values query.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation attempted after `Database::close`.
    #[error("database connection is closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, JournalError>;

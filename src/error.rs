//! Error types for the subscriber state store.

use thiserror::Error;

/// Errors raised by a blob backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid table name: {0:?}")]
    InvalidTableName(String),

    #[error("Write attempted in a read-only transaction")]
    ReadOnlyTransaction,
}

/// Result type for backend operations.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Main error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing schema could not be created or verified.
    #[error("Schema error: {0}")]
    Schema(#[source] BackendError),

    /// A backend read or write failed. The operation can be retried as a whole.
    #[error("Storage error: {0}")]
    Storage(#[from] BackendError),

    /// A stored document could not be decoded.
    #[error("Corrupt document: {reason}")]
    CorruptDocument { reason: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Duplicate imsi in snapshot: {0}")]
    DuplicateImsi(String),

    #[error("Invalid scope: {0}")]
    InvalidScope(String),
}

impl StoreError {
    pub(crate) fn corrupt(reason: impl Into<String>) -> Self {
        StoreError::CorruptDocument {
            reason: reason.into(),
        }
    }

    /// Whether re-issuing the same call can succeed.
    ///
    /// Only backend failures qualify. Every store operation is idempotent, so
    /// the caller may replay the whole call; the store never retries itself.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Storage(_))
    }
}

impl From<rmp_serde::encode::Error> for StoreError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for StoreError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        StoreError::corrupt(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

use thiserror::Error;

/// Errors that can occur when interacting with a participant store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No live row with the given key.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// A live row with the same unique key already exists.
    #[error("{kind} already exists: {key}")]
    Duplicate { kind: &'static str, key: String },

    /// A transient write conflict (deadlock or serialization failure).
    /// Safe to retry the whole statement.
    #[error("transient write conflict on {kind}")]
    WriteConflict { kind: &'static str },

    /// The request deadline passed before the operation completed.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// The backing store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A cache operation failed.
    #[error("cache error: {0}")]
    Cache(String),

    /// A database error occurred.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A serialization/deserialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn not_found(kind: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Returns true for errors that a blind retry of the same write may clear.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::WriteConflict { .. })
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

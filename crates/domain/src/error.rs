//! Application error taxonomy.

use saga::SagaError;
use store::StoreError;
use thiserror::Error;

/// Errors returned by use-case and query handlers.
#[derive(Debug, Error)]
pub enum AppError {
    /// The command is malformed.
    #[error("invalid request: {0}")]
    Validation(String),

    /// A referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller may not perform this action.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The action conflicts with current state, or was already applied.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A peer service call failed.
    #[error("{service} service unavailable: {reason}")]
    Unavailable {
        service: &'static str,
        reason: String,
    },

    /// A peer service call timed out.
    #[error("{service} service timed out during {method}")]
    Timeout {
        service: &'static str,
        method: &'static str,
    },

    /// The request deadline passed.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("store error: {0}")]
    Store(StoreError),

    #[error("saga error: {0}")]
    Saga(SagaError),
}

/// Coarse classification of an [`AppError`], used by transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Forbidden,
    Conflict,
    Unavailable,
    Timeout,
    Internal,
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation(_) => ErrorKind::Validation,
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::Forbidden(_) => ErrorKind::Forbidden,
            AppError::Conflict(_) => ErrorKind::Conflict,
            AppError::Unavailable { .. } => ErrorKind::Unavailable,
            AppError::Timeout { .. } | AppError::DeadlineExceeded => ErrorKind::Timeout,
            AppError::Store(_) | AppError::Saga(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub(crate) fn forbidden(msg: impl Into<String>) -> Self {
        AppError::Forbidden(msg.into())
    }

    pub(crate) fn conflict(msg: impl Into<String>) -> Self {
        AppError::Conflict(msg.into())
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { kind, id } => AppError::NotFound(format!("{kind} {id}")),
            StoreError::Duplicate { kind, key } => {
                AppError::Conflict(format!("{kind} {key} already exists"))
            }
            StoreError::DeadlineExceeded => AppError::DeadlineExceeded,
            StoreError::Unavailable(reason) => AppError::Unavailable {
                service: "store",
                reason,
            },
            other => AppError::Store(other),
        }
    }
}

impl From<SagaError> for AppError {
    fn from(e: SagaError) -> Self {
        match e {
            SagaError::DeadlineExceeded { .. } => AppError::DeadlineExceeded,
            other => AppError::Saga(other),
        }
    }
}

/// Result type for handler operations.
pub type Result<T> = std::result::Result<T, AppError>;

//! Saga error types.

use thiserror::Error;

/// Errors raised by the coordinator itself.
///
/// Business errors flow through the coordinator untouched; a saga's error
/// type converts from this one so coordinator failures can be reported in
/// the caller's own taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SagaError {
    /// The saga definition is malformed and cannot be registered.
    #[error("Invalid saga registration: {0}")]
    InvalidRegistration(String),

    /// The request deadline passed while the saga was running.
    #[error("Saga '{saga}' exceeded its deadline")]
    DeadlineExceeded { saga: &'static str },
}

/// Convenience type alias for coordinator results.
pub type Result<T> = std::result::Result<T, SagaError>;

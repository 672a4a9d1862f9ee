//! Handler configuration.

use std::time::Duration;

use store::RetryPolicy;

/// Knobs shared by every use-case handler.
#[derive(Debug, Clone, Copy)]
pub struct HandlerConfig {
    /// Deadline applied to each command, saga and compensations included.
    pub request_timeout: Duration,
    /// Backoff for inserts that hit a transient write conflict.
    pub retry: RetryPolicy,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            retry: RetryPolicy::default(),
        }
    }
}

//! Request-scoped deadlines.

use std::time::Duration;

use tokio::time::Instant;

/// The point in time after which a request's work must stop.
///
/// Passed explicitly into saga execution and store retries so the bound on
/// retry loops and remote calls is visible at every call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// A deadline that never expires.
    pub fn none() -> Self {
        Self(None)
    }

    /// A deadline `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        Self(Some(Instant::now() + timeout))
    }

    /// A deadline at a fixed instant.
    pub fn at(instant: Instant) -> Self {
        Self(Some(instant))
    }

    /// Returns the expiry instant, if bounded.
    pub fn instant(&self) -> Option<Instant> {
        self.0
    }

    /// Returns true once the deadline has passed.
    pub fn is_expired(&self) -> bool {
        self.0.is_some_and(|at| Instant::now() >= at)
    }

    /// Time left before expiry. `None` means unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.0.map(|at| at.saturating_duration_since(Instant::now()))
    }
}

//! Deadlock-safe inserts.

use std::time::Duration;

use common::Deadline;

use crate::table::{Entity, Table};
use crate::{Result, StoreError};

/// Pause between attempts after a transient write conflict.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff: Duration::from_millis(5),
        }
    }
}

/// Inserts `entity`, retrying the whole insert on transient write conflicts.
///
/// The loop has no attempt cap; it ends on success, on any other error, or
/// when `deadline` passes, in which case `DeadlineExceeded` is returned.
/// The insert is not conditioned on prior reads, so a blind retry cannot
/// produce a duplicate row.
#[tracing::instrument(skip(table, entity, deadline, policy), fields(entity = E::KIND))]
pub async fn create_with_retry<E, T>(
    table: &T,
    entity: E,
    deadline: Deadline,
    policy: RetryPolicy,
) -> Result<E>
where
    E: Entity,
    T: Table<E> + ?Sized,
{
    let mut conflicts = 0u32;
    loop {
        if deadline.is_expired() {
            tracing::warn!(conflicts, "deadline exceeded while retrying insert");
            return Err(StoreError::DeadlineExceeded);
        }

        let attempt = table.insert(entity.clone());
        let result = match deadline.instant() {
            Some(at) => tokio::time::timeout_at(at, attempt)
                .await
                .map_err(|_| StoreError::DeadlineExceeded)?,
            None => attempt.await,
        };

        match result {
            Err(e) if e.is_transient() => {
                conflicts += 1;
                metrics::counter!("store_write_conflict_retries_total", "entity" => E::KIND)
                    .increment(1);
                tracing::debug!(conflicts, "write conflict, retrying insert");
                backoff(deadline, policy.backoff).await;
            }
            other => return other,
        }
    }
}

async fn backoff(deadline: Deadline, pause: Duration) {
    let pause = match deadline.remaining() {
        Some(left) => pause.min(left),
        None => pause,
    };
    if !pause.is_zero() {
        tokio::time::sleep(pause).await;
    }
}

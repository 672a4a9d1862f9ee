//! Saga coordinator for orchestrating multi-step sagas.

use std::fmt::Display;

use async_trait::async_trait;
use common::{Deadline, GlobalId};

use crate::error::SagaError;
use crate::report::{CompensationFailure, SagaOutcome, WorkflowReport};
use crate::workflow::Workflow;

/// A business operation spanning several participants.
///
/// `run` performs the forward actions in order and, after each one that
/// succeeds, records it with `wf.step(..)` and its undo with
/// `.on_rollback(..)`. Returning an error at any point makes the
/// coordinator unwind the recorded steps.
#[async_trait]
pub trait Saga: Send + Sync {
    type Payload: Send + 'static;
    type Output: Send;
    type Error: From<SagaError> + Display + Send + 'static;

    /// Workflow name, unique per saga type (e.g. `create_group_workflow`).
    fn name(&self) -> &'static str;

    async fn run(
        &self,
        wf: &mut Workflow<Self::Error>,
        payload: Self::Payload,
    ) -> Result<Self::Output, Self::Error>;
}

/// Entry point for turning saga definitions into executable handles.
///
/// The coordinator keeps no registry: each registration yields its own
/// handle, and each execution owns a private [`Workflow`], so concurrent
/// sagas never contend on coordinator state.
#[derive(Debug, Clone, Copy, Default)]
pub struct SagaCoordinator;

impl SagaCoordinator {
    /// Validates a saga definition and returns a handle that can run it.
    ///
    /// Workflow names must be non-empty lowercase snake case starting with
    /// a letter.
    pub fn register<S: Saga>(saga: S) -> Result<SagaHandle<S>, SagaError> {
        let name = saga.name();
        let valid = name.starts_with(|c: char| c.is_ascii_lowercase())
            && name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
        if !valid {
            return Err(SagaError::InvalidRegistration(format!(
                "workflow name {name:?} must be lowercase snake case"
            )));
        }
        tracing::debug!(saga = name, "saga registered");
        Ok(SagaHandle { saga, name })
    }
}

/// A registered saga, ready to execute.
#[derive(Debug)]
pub struct SagaHandle<S> {
    saga: S,
    name: &'static str,
}

impl<S: Saga> SagaHandle<S> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Runs the saga.
    ///
    /// On failure every recorded compensation runs in reverse order and the
    /// original error is returned, whatever the compensations did.
    pub async fn execute(
        &self,
        global_id: GlobalId,
        deadline: Deadline,
        payload: S::Payload,
    ) -> Result<S::Output, S::Error> {
        self.execute_with_report(global_id, deadline, payload)
            .await
            .0
    }

    /// Runs the saga and also returns a report of what happened.
    #[tracing::instrument(skip(self, deadline, payload), fields(saga = self.name, %global_id))]
    pub async fn execute_with_report(
        &self,
        global_id: GlobalId,
        deadline: Deadline,
        payload: S::Payload,
    ) -> (Result<S::Output, S::Error>, WorkflowReport) {
        metrics::counter!("saga_executions_total", "saga" => self.name).increment(1);
        let saga_start = std::time::Instant::now();

        let mut wf = Workflow::new(self.name, global_id, deadline);
        let result = match deadline.instant() {
            Some(at) => {
                let outcome = tokio::time::timeout_at(at, self.saga.run(&mut wf, payload)).await;
                match outcome {
                    Ok(result) => result,
                    Err(_) => Err(SagaError::DeadlineExceeded { saga: self.name }.into()),
                }
            }
            None => self.saga.run(&mut wf, payload).await,
        };

        let completed_steps: Vec<String> =
            wf.steps().iter().map(|step| step.name().to_string()).collect();

        // Only the rendered error crosses the compensation awaits.
        let failure = result.as_ref().err().map(ToString::to_string);
        let report = match failure {
            None => {
                metrics::counter!("saga_completed_total", "saga" => self.name).increment(1);
                tracing::info!(steps = completed_steps.len(), "saga completed successfully");
                WorkflowReport {
                    saga: self.name,
                    global_id,
                    completed_steps,
                    compensated: Vec::new(),
                    failed_compensations: Vec::new(),
                    outcome: SagaOutcome::Completed,
                }
            }
            Some(e) => {
                metrics::counter!("saga_failed_total", "saga" => self.name).increment(1);
                tracing::warn!(
                    error = %e,
                    steps = completed_steps.len(),
                    "saga step failed, compensating"
                );
                let (compensated, failed_compensations) = self.compensate(wf).await;
                let outcome = if failed_compensations.is_empty() {
                    SagaOutcome::Compensated
                } else {
                    SagaOutcome::CompensationIncomplete
                };
                tracing::warn!(reason = %e, %outcome, "saga failed");
                WorkflowReport {
                    saga: self.name,
                    global_id,
                    completed_steps,
                    compensated,
                    failed_compensations,
                    outcome,
                }
            }
        };

        metrics::histogram!("saga_duration_seconds", "saga" => self.name)
            .record(saga_start.elapsed().as_secs_f64());
        (result, report)
    }

    /// Runs compensating actions in reverse order of completed steps.
    ///
    /// A failed or skipped compensation is logged and does not stop the
    /// remaining ones.
    async fn compensate(
        &self,
        wf: Workflow<S::Error>,
    ) -> (Vec<String>, Vec<CompensationFailure>) {
        let global_id = wf.global_id();
        let deadline = wf.deadline();
        let mut compensated = Vec::new();
        let mut failures = Vec::new();

        for step in wf.into_steps().into_iter().rev() {
            let (step, compensation) = step.into_parts();
            let Some(compensation) = compensation else {
                tracing::debug!(%step, "no compensation registered, skipping");
                continue;
            };

            metrics::counter!("saga_compensations_total", "saga" => self.name).increment(1);
            let attempt = compensation();
            let result = match deadline.instant() {
                Some(at) => match tokio::time::timeout_at(at, attempt).await {
                    Ok(result) => result.map_err(|e| e.to_string()),
                    Err(_) => Err("deadline exceeded before compensation finished".to_string()),
                },
                None => attempt.await.map_err(|e| e.to_string()),
            };

            match result {
                Ok(()) => {
                    tracing::info!(%step, "compensation step completed");
                    compensated.push(step);
                }
                Err(reason) => {
                    metrics::counter!("saga_compensation_failures_total", "saga" => self.name)
                        .increment(1);
                    tracing::error!(
                        %step,
                        %global_id,
                        %reason,
                        "compensation step failed; manual reconciliation required"
                    );
                    failures.push(CompensationFailure { step, reason });
                }
            }
        }

        (compensated, failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    #[async_trait]
    impl Saga for Named {
        type Payload = ();
        type Output = ();
        type Error = SagaError;

        fn name(&self) -> &'static str {
            self.0
        }

        async fn run(&self, _wf: &mut Workflow<SagaError>, _payload: ()) -> Result<(), SagaError> {
            Ok(())
        }
    }

    #[test]
    fn test_register_accepts_snake_case() {
        let handle = SagaCoordinator::register(Named("create_group_workflow")).unwrap();
        assert_eq!(handle.name(), "create_group_workflow");
    }

    #[test]
    fn test_register_rejects_malformed_names() {
        for name in ["", "CreateGroup", "9lives", "delete group", "delete-group"] {
            let result = SagaCoordinator::register(Named(name));
            assert!(
                matches!(result, Err(SagaError::InvalidRegistration(_))),
                "{name:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_empty_saga_completes() {
        let handle = SagaCoordinator::register(Named("noop_workflow")).unwrap();
        let (result, report) = handle
            .execute_with_report(GlobalId::new(), Deadline::none(), ())
            .await;
        assert!(result.is_ok());
        assert_eq!(report.outcome, SagaOutcome::Completed);
        assert!(report.completed_steps.is_empty());
    }
}

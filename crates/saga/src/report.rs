//! Outcome of one saga execution.

use common::GlobalId;

/// How a saga execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SagaOutcome {
    /// Every forward step committed; nothing was compensated.
    Completed,
    /// A step failed and every registered compensation succeeded.
    Compensated,
    /// A step failed and at least one compensation failed or was skipped.
    /// Requires manual reconciliation.
    CompensationIncomplete,
}

impl SagaOutcome {
    /// Returns true when the participants are back in a consistent state.
    pub fn is_consistent(&self) -> bool {
        !matches!(self, SagaOutcome::CompensationIncomplete)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SagaOutcome::Completed => "completed",
            SagaOutcome::Compensated => "compensated",
            SagaOutcome::CompensationIncomplete => "compensation_incomplete",
        }
    }
}

impl std::fmt::Display for SagaOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A compensation that did not take effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompensationFailure {
    pub step: String,
    pub reason: String,
}

/// What one `execute` call did, for logging and assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowReport {
    pub saga: &'static str,
    pub global_id: GlobalId,
    /// Committed forward steps, in forward order.
    pub completed_steps: Vec<String>,
    /// Compensations that succeeded, in the order they ran.
    pub compensated: Vec<String>,
    pub failed_compensations: Vec<CompensationFailure>,
    pub outcome: SagaOutcome,
}

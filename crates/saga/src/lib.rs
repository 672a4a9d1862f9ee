//! Saga orchestration across independently owned participants.
//!
//! A saga runs an ordered sequence of remote, side-effecting steps. After
//! each forward action commits, the saga records it on its [`Workflow`]
//! together with a compensating action. If any step fails, the recorded
//! compensations run in reverse order and the original error is returned.
//!
//! There is no distributed lock and no durable saga log: a workflow lives
//! only for the request that created it, and an in-flight saga is lost if
//! the process crashes.

pub mod coordinator;
pub mod error;
pub mod report;
pub mod workflow;

pub use coordinator::{Saga, SagaCoordinator, SagaHandle};
pub use error::SagaError;
pub use report::{CompensationFailure, SagaOutcome, WorkflowReport};
pub use workflow::{Compensation, Step, Workflow};

//! Per-execution workflow handle.

use std::fmt;
use std::future::Future;

use common::{Deadline, GlobalId};
use futures_util::future::BoxFuture;

/// A compensating action, run at most once by the coordinator.
pub type Compensation<E> = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), E>> + Send>;

/// A forward action that has already committed, with its optional undo.
pub struct Step<E> {
    name: String,
    compensation: Option<Compensation<E>>,
    one_way: bool,
}

impl<E> Step<E> {
    fn new(name: String) -> Self {
        Self {
            name,
            compensation: None,
            one_way: false,
        }
    }

    /// Registers the action that semantically undoes this step.
    ///
    /// The action must tolerate running after a partial forward effect and
    /// must be idempotent (clear a marker rather than re-insert a row).
    pub fn on_rollback<F, Fut>(&mut self, compensate: F) -> &mut Self
    where
        E: 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
    {
        self.compensation = Some(Box::new(
            move || -> BoxFuture<'static, Result<(), E>> { Box::pin(compensate()) },
        ));
        self.one_way = false;
        self
    }

    /// Marks this step as a deliberate one-way side effect with no undo.
    pub fn one_way(&mut self) -> &mut Self {
        self.compensation = None;
        self.one_way = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_compensation(&self) -> bool {
        self.compensation.is_some()
    }

    pub fn is_one_way(&self) -> bool {
        self.one_way
    }

    pub(crate) fn into_parts(self) -> (String, Option<Compensation<E>>) {
        (self.name, self.compensation)
    }
}

impl<E> fmt::Debug for Step<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("compensation", &self.compensation.is_some())
            .field("one_way", &self.one_way)
            .finish()
    }
}

/// The process-local control structure of one saga execution.
///
/// Created by the coordinator for a single `execute` call and handed to the
/// saga body by mutable reference. Steps are appended only after their
/// forward action succeeded, so the list always describes committed work.
/// Nothing here is persisted.
pub struct Workflow<E> {
    name: &'static str,
    global_id: GlobalId,
    deadline: Deadline,
    steps: Vec<Step<E>>,
}

impl<E> Workflow<E> {
    pub(crate) fn new(name: &'static str, global_id: GlobalId, deadline: Deadline) -> Self {
        Self {
            name,
            global_id,
            deadline,
            steps: Vec::new(),
        }
    }

    /// Records a committed forward step and returns it for `on_rollback`.
    pub fn step(&mut self, name: impl Into<String>) -> &mut Step<E> {
        let name = name.into();
        tracing::debug!(saga = self.name, global_id = %self.global_id, step = %name, "saga step committed");
        let index = self.steps.len();
        self.steps.push(Step::new(name));
        &mut self.steps[index]
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn global_id(&self) -> GlobalId {
        self.global_id
    }

    /// Deadline every forward and compensating call must respect.
    pub fn deadline(&self) -> Deadline {
        self.deadline
    }

    /// Committed steps in forward order.
    pub fn steps(&self) -> &[Step<E>] {
        &self.steps
    }

    /// Names of the steps that would be compensated, in unwind order.
    pub fn rollback_plan(&self) -> Vec<&str> {
        self.steps
            .iter()
            .rev()
            .filter(|step| step.has_compensation())
            .map(Step::name)
            .collect()
    }

    pub(crate) fn into_steps(self) -> Vec<Step<E>> {
        self.steps
    }
}

impl<E> fmt::Debug for Workflow<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workflow")
            .field("name", &self.name)
            .field("global_id", &self.global_id)
            .field("steps", &self.steps)
            .finish()
    }
}

use std::collections::{BTreeSet, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use tracing::{debug, error, info, warn};

use tuyau_core::{
    panic_message, NodeId, Status, StatusCell, Step, StepCell, TuyauError, VarRef,
};

use super::condition::{Condition, ConditionResult};
use crate::barrier::{Arrival, Barrier};

/// A unit of scheduling: an ordered list of steps plus its graph edges.
///
/// Nodes are created standalone, then handed to a
/// [`PipelineBuilder`](super::PipelineBuilder) which owns them and wires
/// edges by id. A node body runs at most once.
pub struct Node<C> {
    id: NodeId,
    name: String,
    steps: Vec<StepCell<C>>,
    pub(crate) parents: BTreeSet<NodeId>,
    pub(crate) children: BTreeSet<NodeId>,
    conditions: Vec<Condition>,
    inputs: HashSet<VarRef>,
    outputs: HashSet<VarRef>,
    /// Ancestor set, filled in during build.
    pub(crate) branch: HashSet<NodeId>,

    pub(crate) barrier: Barrier,
    status: StatusCell,
    error: OnceLock<Arc<TuyauError>>,
    executed: AtomicBool,
    condition_results: OnceLock<Vec<ConditionResult>>,
}

impl<C: 'static> Node<C> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: NodeId::new(),
            name: name.into(),
            steps: Vec::new(),
            parents: BTreeSet::new(),
            children: BTreeSet::new(),
            conditions: Vec::new(),
            inputs: HashSet::new(),
            outputs: HashSet::new(),
            branch: HashSet::new(),
            barrier: Barrier::default(),
            status: StatusCell::new(),
            error: OnceLock::new(),
            executed: AtomicBool::new(false),
            condition_results: OnceLock::new(),
        }
    }

    /// Append a step; its declared variable accesses join the node's
    /// input/output sets.
    pub fn with_step(mut self, step: impl Step<C>) -> Self {
        self.push_step(Box::new(step));
        self
    }

    pub fn with_steps(mut self, steps: impl IntoIterator<Item = Box<dyn Step<C>>>) -> Self {
        for step in steps {
            self.push_step(step);
        }
        self
    }

    /// Add a guard that must evaluate true for the body to run.
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub(crate) fn push_step(&mut self, step: Box<dyn Step<C>>) {
        for access in step.variables() {
            if access.mode.reads() {
                self.inputs.insert(access.var.clone());
            }
            if access.mode.writes() {
                self.outputs.insert(access.var);
            }
        }
        self.steps.push(StepCell::new(step));
    }

    pub(crate) fn push_condition(&mut self, condition: Condition) {
        self.conditions.push(condition);
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[StepCell<C>] {
        &self.steps
    }

    pub fn parents(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.parents.iter().copied()
    }

    pub fn children(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.children.iter().copied()
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn inputs(&self) -> &HashSet<VarRef> {
        &self.inputs
    }

    pub fn outputs(&self) -> &HashSet<VarRef> {
        &self.outputs
    }

    /// Transitive closure of the parents (empty before build).
    pub fn branch(&self) -> &HashSet<NodeId> {
        &self.branch
    }

    pub fn is_ancestor_of(&self, other: &Node<C>) -> bool {
        other.branch.contains(&self.id)
    }

    pub fn status(&self) -> Status {
        self.status.get()
    }

    pub fn error(&self) -> Option<Arc<TuyauError>> {
        self.error.get().cloned()
    }

    /// Whether the body has been entered and finished, whatever the outcome.
    pub fn executed(&self) -> bool {
        self.executed.load(Ordering::Acquire)
    }

    pub fn condition_results(&self) -> &[ConditionResult] {
        self.condition_results.get().map_or(&[], Vec::as_slice)
    }

    /// Deliver one parent notification and run the body if it was the last.
    ///
    /// On [`Arrival::Admitted`] the body has run to a terminal state before
    /// this returns.
    pub(crate) fn notify(
        &self,
        ctx: &C,
        lookup: &dyn Fn(NodeId) -> Option<Status>,
        names: &dyn Fn(NodeId) -> String,
    ) -> Arrival {
        let arrival = self.barrier.arrive();
        match arrival {
            Arrival::Waiting => debug!(
                node = %self.name,
                remaining = self.barrier.remaining(),
                "Node cannot run yet, waiting for parents"
            ),
            Arrival::Duplicate => {}
            Arrival::Admitted => self.run(ctx, lookup, names),
        }
        arrival
    }

    fn run(
        &self,
        ctx: &C,
        lookup: &dyn Fn(NodeId) -> Option<Status>,
        names: &dyn Fn(NodeId) -> String,
    ) {
        if self.executed() {
            return;
        }
        self.status.transition(Status::Running);

        if !self.check_conditions(lookup, names) {
            self.executed.store(true, Ordering::Release);
            return;
        }

        for step in &self.steps {
            let status = step.execute(ctx);
            if !status.is_passed() {
                let err = step.error().unwrap_or_else(|| {
                    Arc::new(TuyauError::step(
                        step.step().name(),
                        format!("ended with status {status}"),
                    ))
                });
                error!(node = %self.name, step = %step.step().name(), error = %err, "Node failed");
                let _ = self.error.set(err);
                self.status.transition(Status::Error);
                self.executed.store(true, Ordering::Release);
                return;
            }
        }

        self.status.transition(Status::Complete);
        self.executed.store(true, Ordering::Release);
        info!(node = %self.name, steps = self.steps.len(), "Node complete");
    }

    fn check_conditions(
        &self,
        lookup: &dyn Fn(NodeId) -> Option<Status>,
        names: &dyn Fn(NodeId) -> String,
    ) -> bool {
        let evaluated = catch_unwind(AssertUnwindSafe(|| {
            self.conditions
                .iter()
                .map(|c| ConditionResult {
                    description: c.describe(names),
                    passed: c.evaluate(lookup),
                })
                .collect::<Vec<_>>()
        }));
        let results = match evaluated {
            Ok(results) => results,
            Err(payload) => {
                let err = TuyauError::ConditionPanicked {
                    node: self.name.clone(),
                    message: panic_message(payload.as_ref()),
                };
                error!(node = %self.name, error = %err, "Node condition panicked");
                let _ = self.error.set(Arc::new(err));
                self.status.transition(Status::Error);
                return false;
            }
        };
        let failed: Vec<String> = results
            .iter()
            .filter(|r| !r.passed)
            .map(|r| r.description.clone())
            .collect();
        let _ = self.condition_results.set(results);

        if failed.is_empty() {
            return true;
        }
        warn!(node = %self.name, failed = ?failed, "Node conditions not met, skipping");
        let _ = self.error.set(Arc::new(TuyauError::ConditionFailed {
            node: self.name.clone(),
            failed,
        }));
        self.status.transition(Status::ConditionFailed);
        false
    }
}

impl<C: 'static> std::fmt::Display for Node<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let steps: Vec<&str> = self.steps.iter().map(|s| s.step().name()).collect();
        write!(f, "{}: {}", self.name, steps.join(" -> "))
    }
}

/// A set of nodes used by the composite wiring helpers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeGroup(Vec<NodeId>);

impl NodeGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Union with another group, keeping first-seen order.
    pub fn and(mut self, other: impl Into<NodeGroup>) -> Self {
        for id in other.into().0 {
            if !self.0.contains(&id) {
                self.0.push(id);
            }
        }
        self
    }

    pub fn ids(&self) -> &[NodeId] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<NodeId> for NodeGroup {
    fn from(id: NodeId) -> Self {
        Self(vec![id])
    }
}

impl From<&[NodeId]> for NodeGroup {
    fn from(ids: &[NodeId]) -> Self {
        NodeGroup::new().and(NodeGroup(ids.to_vec()))
    }
}

impl<const N: usize> From<[NodeId; N]> for NodeGroup {
    fn from(ids: [NodeId; N]) -> Self {
        NodeGroup::from(&ids[..])
    }
}

impl From<Vec<NodeId>> for NodeGroup {
    fn from(ids: Vec<NodeId>) -> Self {
        NodeGroup::from(ids.as_slice())
    }
}

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use tuyau_core::{NodeId, Status};

/// Caller-supplied zero-argument guard.
pub type Predicate = Arc<dyn Fn() -> bool + Send + Sync>;

/// Guard that must hold before a node body runs.
///
/// Either a boolean expression over node statuses or an opaque predicate.
/// All guards of a node are evaluated when the node is admitted; if any of
/// them is false the node is soft-skipped with `Status::ConditionFailed`.
#[derive(Clone)]
pub enum Condition {
    /// The node ended `Complete` or `Skipped`.
    Passed(NodeId),
    /// The node is currently in exactly this status.
    Status { node: NodeId, status: Status },
    Not(Box<Condition>),
    All(Vec<Condition>),
    Any(Vec<Condition>),
    Predicate {
        description: String,
        predicate: Predicate,
    },
}

impl Condition {
    /// Wrap a closure with a human readable description.
    pub fn when(
        description: impl Into<String>,
        predicate: impl Fn() -> bool + Send + Sync + 'static,
    ) -> Self {
        Self::Predicate {
            description: description.into(),
            predicate: Arc::new(predicate),
        }
    }

    pub fn passed(node: NodeId) -> Self {
        Self::Passed(node)
    }

    pub fn status(node: NodeId, status: Status) -> Self {
        Self::Status { node, status }
    }

    pub fn all(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Self::All(conditions.into_iter().collect())
    }

    pub fn any(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Self::Any(conditions.into_iter().collect())
    }

    /// Evaluate against a status lookup. Unknown nodes never satisfy a
    /// status test.
    pub fn evaluate(&self, lookup: &dyn Fn(NodeId) -> Option<Status>) -> bool {
        match self {
            Condition::Passed(node) => lookup(*node).is_some_and(Status::is_passed),
            Condition::Status { node, status } => lookup(*node) == Some(*status),
            Condition::Not(inner) => !inner.evaluate(lookup),
            Condition::All(inner) => inner.iter().all(|c| c.evaluate(lookup)),
            Condition::Any(inner) => inner.iter().any(|c| c.evaluate(lookup)),
            Condition::Predicate { predicate, .. } => predicate(),
        }
    }

    /// Render the condition, naming nodes through `names`.
    pub fn describe(&self, names: &dyn Fn(NodeId) -> String) -> String {
        let join = |inner: &[Condition], sep: &str| {
            inner
                .iter()
                .map(|c| c.describe(names))
                .collect::<Vec<_>>()
                .join(sep)
        };
        match self {
            Condition::Passed(node) => format!("passed({})", names(*node)),
            Condition::Status { node, status } => format!("{} == {}", names(*node), status),
            Condition::Not(inner) => format!("not({})", inner.describe(names)),
            Condition::All(inner) => format!("({})", join(inner, " and ")),
            Condition::Any(inner) => format!("({})", join(inner, " or ")),
            Condition::Predicate { description, .. } => description.clone(),
        }
    }

    /// Node ids this condition looks up.
    pub fn referenced_nodes(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_nodes(&mut out);
        out
    }

    fn collect_nodes(&self, out: &mut Vec<NodeId>) {
        match self {
            Condition::Passed(node) | Condition::Status { node, .. } => out.push(*node),
            Condition::Not(inner) => inner.collect_nodes(out),
            Condition::All(inner) | Condition::Any(inner) => {
                inner.iter().for_each(|c| c.collect_nodes(out))
            }
            Condition::Predicate { .. } => {}
        }
    }
}

impl std::ops::Not for Condition {
    type Output = Condition;

    fn not(self) -> Self::Output {
        Condition::Not(Box::new(self))
    }
}

impl std::fmt::Debug for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.describe(&|id| id.to_string()))
    }
}

/// Eagerly evaluated guard, kept on the node for inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionResult {
    pub description: String,
    pub passed: bool,
}

//! Serializable, read-only snapshots of a pipeline for renderers and reports.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tuyau_core::{NodeId, Status, StepId};

use super::condition::ConditionResult;
use super::node::Node;
use crate::pipeline::Graph;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepView {
    pub id: StepId,
    pub name: String,
    pub label: String,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeView {
    pub id: NodeId,
    pub name: String,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub executed: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<ConditionResult>,
    pub steps: Vec<StepView>,
    pub parents: Vec<NodeId>,
    pub children: Vec<NodeId>,
}

impl NodeView {
    fn of<C: 'static>(node: &Node<C>) -> Self {
        Self {
            id: node.id(),
            name: node.name().to_string(),
            status: node.status(),
            error: node.error().map(|e| e.to_string()),
            executed: node.executed(),
            conditions: node.condition_results().to_vec(),
            steps: node
                .steps()
                .iter()
                .map(|cell| StepView {
                    id: cell.id(),
                    name: cell.step().name().to_string(),
                    label: cell.step().label(),
                    status: cell.status(),
                    error: cell.error().map(|e| e.to_string()),
                })
                .collect(),
            parents: node.parents().collect(),
            children: node.children().collect(),
        }
    }
}

/// Whole-graph snapshot: node names, edges, statuses and labels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphView {
    pub name: String,
    pub root: NodeId,
    pub final_node: NodeId,
    /// Dependency order.
    pub nodes: Vec<NodeView>,
}

impl GraphView {
    pub(crate) fn from_graph<C: 'static>(graph: &Graph<C>) -> Self {
        Self {
            name: graph.name.clone(),
            root: graph.root,
            final_node: graph.last,
            nodes: graph
                .order
                .iter()
                .filter_map(|id| graph.nodes.get(id))
                .map(NodeView::of)
                .collect(),
        }
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeView> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// Outcome counts of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub pipeline: String,
    pub complete: bool,
    pub by_status: BTreeMap<String, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunSummary {
    pub(crate) fn from_graph<C: 'static>(graph: &Graph<C>) -> Self {
        let mut by_status = BTreeMap::new();
        for node in graph.nodes.values() {
            *by_status.entry(node.status().to_string()).or_insert(0) += 1;
        }
        Self {
            pipeline: graph.name.clone(),
            complete: graph.final_executed(),
            by_status,
            error: graph.runtime_error.get().map(|e| e.to_string()),
            started_at: graph.started.get().copied(),
            finished_at: graph.finished.get().copied(),
        }
    }

    pub fn count(&self, status: Status) -> usize {
        self.by_status.get(&status.to_string()).copied().unwrap_or(0)
    }

    /// Wall-clock run time, once finished.
    pub fn elapsed_ms(&self) -> Option<i64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: Vec<String> = self
            .by_status
            .iter()
            .map(|(status, n)| format!("{status}={n}"))
            .collect();
        write!(f, "{}: {}", self.pipeline, counts.join(" "))?;
        if let Some(ms) = self.elapsed_ms() {
            write!(f, " ({ms} ms)")?;
        }
        if let Some(err) = &self.error {
            write!(f, "\nerror: {err}")?;
        }
        Ok(())
    }
}

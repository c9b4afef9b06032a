//! The built, immutable graph and its execution API.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use tracing::{debug, error};

use tuyau_core::{
    ConflictReport, EngineConfig, NodeId, PipelineContext, Result, Status, TuyauError,
};

use crate::barrier::Arrival;
use crate::graph::hazard;
use crate::graph::node::Node;
use crate::graph::view::{GraphView, RunSummary};
use crate::scheduler;

/// What a single dispatch of a node did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// The node was already resolved; nothing happened.
    Resolved,
    /// The barrier absorbed the notification; parents are still outstanding.
    Waiting,
    /// Another notification already claimed the body.
    Duplicate,
    /// The body ran and these children should be notified.
    Release(Vec<NodeId>),
    /// The body ran and failed; this branch stops here.
    Halted,
}

pub(crate) struct Graph<C> {
    pub(crate) name: String,
    pub(crate) nodes: HashMap<NodeId, Node<C>>,
    pub(crate) root: NodeId,
    pub(crate) last: NodeId,
    /// Dependency order computed during build.
    pub(crate) order: Vec<NodeId>,
    pub(crate) parallel: HashMap<NodeId, BTreeSet<NodeId>>,
    pub(crate) config: EngineConfig,
    pub(crate) runtime_error: OnceLock<Arc<TuyauError>>,
    pub(crate) executed_once: AtomicBool,
    pub(crate) started: OnceLock<DateTime<Utc>>,
    pub(crate) finished: OnceLock<DateTime<Utc>>,
}

impl<C: 'static> Graph<C> {
    pub(crate) fn node(&self, id: NodeId) -> Result<&Node<C>> {
        self.nodes
            .get(&id)
            .ok_or_else(|| TuyauError::UnknownNode(id.to_string()))
    }

    pub(crate) fn name_of(&self, id: NodeId) -> String {
        self.nodes
            .get(&id)
            .map_or_else(|| id.to_string(), |n| n.name().to_string())
    }

    /// Deliver one notification to `id` and report what to do next.
    pub(crate) fn dispatch(&self, ctx: &C, id: NodeId) -> Result<Dispatch> {
        let node = self.node(id)?;
        if node.status() != Status::Unknown {
            debug!(node = %node.name(), status = %node.status(), "Node already resolved");
            return Ok(Dispatch::Resolved);
        }

        let lookup = |n: NodeId| self.nodes.get(&n).map(Node::status);
        let names = |n: NodeId| self.name_of(n);
        match node.notify(ctx, &lookup, &names) {
            Arrival::Waiting => return Ok(Dispatch::Waiting),
            Arrival::Duplicate => return Ok(Dispatch::Duplicate),
            Arrival::Admitted => {}
        }

        let status = node.status();
        if status.releases_children() {
            return Ok(Dispatch::Release(node.children().collect()));
        }

        if let Some(err) = node.error() {
            self.record_error(err);
        }
        Ok(Dispatch::Halted)
    }

    /// Keep the first runtime error; later ones are dropped.
    pub(crate) fn record_error(&self, err: Arc<TuyauError>) {
        if self.runtime_error.set(err.clone()).is_ok() {
            error!(error = %err, "First runtime error captured, stopping dispatch");
        } else {
            debug!(error = %err, "Runtime error dropped, another one was captured first");
        }
    }

    pub(crate) fn final_executed(&self) -> bool {
        self.nodes.get(&self.last).is_some_and(Node::executed)
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.final_executed() || self.runtime_error.get().is_some()
    }

    pub(crate) fn conflicts(&self) -> ConflictReport {
        hazard::check(&self.nodes, &self.parallel)
    }
}

/// A validated pipeline, ready to run once.
///
/// Created by [`PipelineBuilder::build`](crate::PipelineBuilder::build).
/// Cloning is cheap and shares the same run state.
pub struct Pipeline<C> {
    pub(crate) graph: Arc<Graph<C>>,
}

impl<C> Clone for Pipeline<C> {
    fn clone(&self) -> Self {
        Self {
            graph: Arc::clone(&self.graph),
        }
    }
}

impl<C: PipelineContext> Pipeline<C> {
    pub fn name(&self) -> &str {
        &self.graph.name
    }

    /// Run the whole graph on the worker pool and block until it terminates.
    ///
    /// Returns `Ok(())` whether or not a node failed; check
    /// [`runtime_error`](Self::runtime_error) afterwards. Fails with
    /// [`TuyauError::AlreadyExecuted`] on a second call. Must not be called
    /// from inside an async runtime.
    pub fn execute(&self, ctx: Arc<C>) -> Result<()> {
        if self.graph.executed_once.swap(true, Ordering::AcqRel) {
            return Err(TuyauError::AlreadyExecuted);
        }
        scheduler::run(Arc::clone(&self.graph), ctx)
    }

    /// Dispatch a single node on the calling thread without propagating to
    /// its children.
    pub fn notify(&self, ctx: &C, id: NodeId) -> Result<Dispatch> {
        self.graph.dispatch(ctx, id)
    }

    /// The first error raised by a node during the run.
    pub fn runtime_error(&self) -> Option<Arc<TuyauError>> {
        self.graph.runtime_error.get().cloned()
    }

    /// Whether the synthetic final node ran.
    pub fn is_complete(&self) -> bool {
        self.graph.final_executed()
    }

    /// Re-run the input/output hazard check, even if it was disabled at build.
    pub fn validate_io(&self) -> Result<()> {
        let report = self.graph.conflicts();
        if report.is_empty() {
            Ok(())
        } else {
            Err(TuyauError::IoConflict(report))
        }
    }

    /// Nodes with no ordering relative to `id`.
    pub fn parallel_with(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.graph
            .parallel
            .get(&id)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    pub fn root(&self) -> NodeId {
        self.graph.root
    }

    pub fn final_node(&self) -> NodeId {
        self.graph.last
    }

    pub fn node(&self, id: NodeId) -> Option<&Node<C>> {
        self.graph.nodes.get(&id)
    }

    /// First node with this display name, in dependency order.
    pub fn node_by_name(&self, name: &str) -> Option<&Node<C>> {
        self.nodes().find(|n| n.name() == name)
    }

    /// All nodes in dependency order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node<C>> + '_ {
        self.graph
            .order
            .iter()
            .filter_map(|id| self.graph.nodes.get(id))
    }

    pub fn len(&self) -> usize {
        self.graph.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.nodes.is_empty()
    }

    /// Read-only snapshot for renderers.
    pub fn view(&self) -> GraphView {
        GraphView::from_graph(&self.graph)
    }

    /// Per-status counts and timing of the last run.
    pub fn summary(&self) -> RunSummary {
        RunSummary::from_graph(&self.graph)
    }
}

impl<C: PipelineContext> std::fmt::Display for Pipeline<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", self.name())?;
        for node in self.nodes() {
            let children: Vec<String> = node.children().map(|c| self.graph.name_of(c)).collect();
            if children.is_empty() {
                writeln!(f, "  {node}")?;
            } else {
                writeln!(f, "  {node}  =>  {}", children.join(", "))?;
            }
        }
        Ok(())
    }
}

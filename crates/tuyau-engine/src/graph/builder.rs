use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, OnceLock};

use tracing::{error, info};

use tuyau_core::{EngineConfig, NodeId, PipelineContext, Result, TuyauError};

use super::condition::Condition;
use super::node::{Node, NodeGroup};
use super::{ancestry, hazard};
use crate::barrier::Barrier;
use crate::pipeline::{Graph, Pipeline};
use crate::steps::SnapshotStep;

/// Display name of the synthetic sink.
pub const FINAL_NODE_NAME: &str = "FINAL NODE";

/// Assembles nodes and edges, then validates them into a [`Pipeline`].
///
/// The builder starts with two synthetic endpoints: a root named after the
/// pipeline and a final node. `build` wires every parentless node under the
/// root and every childless node into the final node, so callers only
/// describe the dependencies they care about.
pub struct PipelineBuilder<C> {
    name: String,
    nodes: HashMap<NodeId, Node<C>>,
    root: NodeId,
    last: NodeId,
    config: EngineConfig,
}

impl<C: PipelineContext> PipelineBuilder<C> {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let root = Node::new(name.clone()).with_step(SnapshotStep::start());
        let last = Node::new(FINAL_NODE_NAME).with_step(SnapshotStep::end());
        let (root_id, last_id) = (root.id(), last.id());

        let mut nodes = HashMap::new();
        nodes.insert(root_id, root);
        nodes.insert(last_id, last);
        Self {
            name,
            nodes,
            root: root_id,
            last: last_id,
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Enable or disable the build-time input/output validation.
    pub fn check_io(mut self, enabled: bool) -> Self {
        self.config.check_io = enabled;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn final_node(&self) -> NodeId {
        self.last
    }

    /// Take ownership of a node and return its id for wiring.
    pub fn add_node(&mut self, node: Node<C>) -> NodeId {
        let id = node.id();
        self.nodes.insert(id, node);
        id
    }

    pub fn add_nodes(&mut self, nodes: impl IntoIterator<Item = Node<C>>) -> NodeGroup {
        let ids: Vec<NodeId> = nodes.into_iter().map(|n| self.add_node(n)).collect();
        NodeGroup::from(ids)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node<C>> {
        self.nodes.get(&id)
    }

    pub fn add_child_to(&mut self, parent: NodeId, child: NodeId) -> Result<&mut Self> {
        self.connect(parent, child)?;
        Ok(self)
    }

    pub fn add_children_to(
        &mut self,
        parent: NodeId,
        children: impl Into<NodeGroup>,
    ) -> Result<&mut Self> {
        for child in children.into().ids() {
            self.connect(parent, *child)?;
        }
        Ok(self)
    }

    pub fn add_parent_to(&mut self, child: NodeId, parent: NodeId) -> Result<&mut Self> {
        self.connect(parent, child)?;
        Ok(self)
    }

    pub fn add_parents_to(
        &mut self,
        child: NodeId,
        parents: impl Into<NodeGroup>,
    ) -> Result<&mut Self> {
        for parent in parents.into().ids() {
            self.connect(*parent, child)?;
        }
        Ok(self)
    }

    /// Attach nodes directly under the root.
    pub fn start_nodes(&mut self, nodes: impl Into<NodeGroup>) -> Result<&mut Self> {
        let root = self.root;
        self.add_children_to(root, nodes)
    }

    /// Make every node of `from` a parent of every node of `to`.
    ///
    /// Returns the union of both groups so links can be chained.
    pub fn link(
        &mut self,
        from: impl Into<NodeGroup>,
        to: impl Into<NodeGroup>,
    ) -> Result<NodeGroup> {
        let (from, to) = (from.into(), to.into());
        for parent in from.ids() {
            for child in to.ids() {
                self.connect(*parent, *child)?;
            }
        }
        Ok(from.and(to))
    }

    /// Guard every node of `group` with `condition`.
    pub fn when(&mut self, group: impl Into<NodeGroup>, condition: Condition) -> Result<&mut Self> {
        for id in group.into().ids() {
            self.nodes
                .get_mut(id)
                .ok_or_else(|| TuyauError::UnknownNode(id.to_string()))?
                .push_condition(condition.clone());
        }
        Ok(self)
    }

    fn connect(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        for id in [parent, child] {
            if !self.nodes.contains_key(&id) {
                return Err(TuyauError::UnknownNode(id.to_string()));
            }
        }
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.insert(child);
        }
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parents.insert(parent);
        }
        Ok(())
    }

    fn wire_endpoints(&mut self) -> Result<()> {
        let (root, last) = (self.root, self.last);
        let inner: Vec<NodeId> = self
            .nodes
            .keys()
            .copied()
            .filter(|id| *id != root && *id != last)
            .collect();

        let sources: Vec<NodeId> = inner
            .iter()
            .copied()
            .filter(|id| self.nodes.get(id).is_some_and(|n| n.parents.is_empty()))
            .collect();
        for id in sources {
            self.connect(root, id)?;
        }

        let sinks: Vec<NodeId> = inner
            .iter()
            .copied()
            .filter(|id| self.nodes.get(id).is_some_and(|n| n.children.is_empty()))
            .collect();
        for id in sinks {
            self.connect(id, last)?;
        }

        if self.nodes.get(&root).is_some_and(|n| n.children.is_empty()) {
            self.connect(root, last)?;
        }
        Ok(())
    }

    fn check_condition_refs(&self) -> Result<()> {
        for node in self.nodes.values() {
            for condition in node.conditions() {
                if let Some(missing) = condition
                    .referenced_nodes()
                    .into_iter()
                    .find(|id| !self.nodes.contains_key(id))
                {
                    return Err(TuyauError::UnknownNode(missing.to_string()));
                }
            }
        }
        Ok(())
    }

    /// Wire endpoints, reject cycles and (unless disabled) input/output
    /// hazards, and freeze the graph.
    pub fn build(mut self) -> Result<Pipeline<C>> {
        self.wire_endpoints()?;
        self.check_condition_refs()?;

        for node in self.nodes.values_mut() {
            node.barrier = Barrier::new(node.parents.len());
        }

        let order = ancestry::compute_branches(&mut self.nodes).map_err(|e| {
            error!(pipeline = %self.name, error = %e, "Pipeline rejected");
            e
        })?;
        let parallel = hazard::parallel_table(&self.nodes);

        let graph = Graph {
            name: self.name,
            nodes: self.nodes,
            root: self.root,
            last: self.last,
            order,
            parallel,
            config: self.config,
            runtime_error: OnceLock::new(),
            executed_once: AtomicBool::new(false),
            started: OnceLock::new(),
            finished: OnceLock::new(),
        };

        if graph.config.check_io {
            let report = graph.conflicts();
            if !report.is_empty() {
                error!(pipeline = %graph.name, hazards = report.hazards.len(), "Input/output conflicts found");
                return Err(TuyauError::IoConflict(report));
            }
        }

        info!(pipeline = %graph.name, nodes = graph.nodes.len(), "Pipeline built");
        Ok(Pipeline {
            graph: Arc::new(graph),
        })
    }
}

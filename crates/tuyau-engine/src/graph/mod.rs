//! Graph model: nodes, guard conditions, assembly and build-time validation.
//!
//! Nodes live in an arena keyed by [`NodeId`](tuyau_core::NodeId) and refer
//! to each other by id only. The builder owns the arena until `build`, which
//! synthesizes the root and final wiring, computes every node's ancestor set
//! (rejecting cycles) and checks parallel nodes for input/output hazards.

pub(crate) mod ancestry;
pub mod builder;
pub mod condition;
pub(crate) mod hazard;
pub mod node;
pub mod view;

pub use builder::{PipelineBuilder, FINAL_NODE_NAME};
pub use condition::{Condition, ConditionResult, Predicate};
pub use node::{Node, NodeGroup};
pub use view::{GraphView, NodeView, RunSummary, StepView};

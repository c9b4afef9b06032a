pub mod barrier;
pub mod graph;
pub mod pipeline;
mod scheduler;
pub mod steps;

pub use graph::{
    Condition, ConditionResult, GraphView, Node, NodeGroup, NodeView, PipelineBuilder,
    RunSummary, StepView, FINAL_NODE_NAME,
};
pub use pipeline::{Dispatch, Pipeline};
pub use steps::{FnStep, SnapshotStep};

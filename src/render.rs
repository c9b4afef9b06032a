//! Report output: plain text and Graphviz DOT.

use std::fmt::Write;

use tuyau_core::Status;
use tuyau_engine::{GraphView, NodeView, RunSummary};

fn color(status: Status) -> &'static str {
    match status {
        Status::Unknown => "gray",
        Status::Running => "lightblue",
        Status::Complete => "palegreen",
        Status::Skipped => "khaki",
        Status::Error => "tomato",
        Status::ConditionFailed => "orange",
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

/// One cluster per node, one box per step, edges between clusters.
pub fn dot(view: &GraphView) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "digraph \"{}\" {{", escape(&view.name));
    let _ = writeln!(out, "  compound=true;");
    let _ = writeln!(out, "  node [shape=box, style=filled];");

    for (i, node) in view.nodes.iter().enumerate() {
        let _ = writeln!(out, "  subgraph cluster_{i} {{");
        let _ = writeln!(out, "    label=\"{}\";", escape(&node.name));
        let _ = writeln!(out, "    color={};", color(node.status));
        for step in &node.steps {
            let _ = writeln!(
                out,
                "    \"{}\" [label=\"{}\", fillcolor={}];",
                step.id,
                escape(&step.label),
                color(step.status)
            );
        }
        let _ = writeln!(out, "  }}");
    }

    for node in &view.nodes {
        for child in &node.children {
            let Some(child) = view.node(*child) else {
                continue;
            };
            if let (Some(from), Some(to)) = (node.steps.last(), child.steps.first()) {
                let _ = writeln!(out, "  \"{}\" -> \"{}\";", from.id, to.id);
            }
        }
    }
    out.push_str("}\n");
    out
}

fn node_line(node: &NodeView) -> String {
    let mut line = format!("  [{}] {}", node.status, node.name);
    if let Some(err) = &node.error {
        line.push_str(&format!(" ({err})"));
    }
    line
}

pub fn text(view: &GraphView, summary: &RunSummary) -> String {
    let mut out = String::new();
    for node in &view.nodes {
        let _ = writeln!(out, "{}", node_line(node));
        for step in &node.steps {
            let _ = writeln!(out, "      {} - {}", step.status, step.name);
        }
    }
    let _ = writeln!(out, "{summary}");
    out
}

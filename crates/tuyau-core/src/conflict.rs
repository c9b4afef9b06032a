use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Kind of data race between two parallel-candidate nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HazardKind {
    /// Read by one node, written by the other.
    ReadWrite,
    /// Written by both nodes.
    WriteWrite,
}

/// One hazardous variable and every node taking part in the race.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hazard {
    pub variable: String,
    pub kind: HazardKind,
    pub nodes: BTreeSet<String>,
}

/// Aggregated result of the build-time input/output validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictReport {
    pub hazards: Vec<Hazard>,
}

impl ConflictReport {
    pub fn is_empty(&self) -> bool {
        self.hazards.is_empty()
    }

    /// Whether `variable` is reported with `node` among its participants.
    pub fn involves(&self, variable: &str, node: &str) -> bool {
        self.hazards
            .iter()
            .any(|h| h.variable == variable && h.nodes.contains(node))
    }

    pub fn of_kind(&self, kind: HazardKind) -> impl Iterator<Item = &Hazard> {
        self.hazards.iter().filter(move |h| h.kind == kind)
    }
}

impl std::fmt::Display for ConflictReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sections = [
            (
                HazardKind::ReadWrite,
                "Forbidden inputs: used in a node while also used as outputs in parallel nodes",
            ),
            (
                HazardKind::WriteWrite,
                "Forbidden outputs: used as outputs in a node while also used as outputs in parallel nodes",
            ),
        ];
        for (kind, title) in sections {
            let mut hazards = self.of_kind(kind).peekable();
            if hazards.peek().is_none() {
                continue;
            }
            writeln!(f, "/!\\ {title}:")?;
            for hazard in hazards {
                let nodes: Vec<&str> = hazard.nodes.iter().map(String::as_str).collect();
                writeln!(f, "  - {}: {}", hazard.variable, nodes.join(", "))?;
            }
        }
        Ok(())
    }
}

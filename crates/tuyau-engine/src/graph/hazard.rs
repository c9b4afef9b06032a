//! Static input/output hazard validation.
//!
//! Two nodes are parallel candidates when neither is in the other's branch;
//! the scheduler gives no ordering between them, so any variable one writes
//! must not be read or written by the other.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::debug;

use tuyau_core::{ConflictReport, Hazard, HazardKind, NodeId, VarRef};

use super::node::Node;

/// Map each node to the nodes it may run concurrently with.
pub(crate) fn parallel_table<C: 'static>(
    nodes: &HashMap<NodeId, Node<C>>,
) -> HashMap<NodeId, BTreeSet<NodeId>> {
    let mut table: HashMap<NodeId, BTreeSet<NodeId>> =
        nodes.keys().map(|id| (*id, BTreeSet::new())).collect();
    let ids: Vec<NodeId> = nodes.keys().copied().collect();
    for (i, a) in ids.iter().enumerate() {
        for b in &ids[i + 1..] {
            if is_parallel(&nodes[a], &nodes[b]) {
                table.entry(*a).or_default().insert(*b);
                table.entry(*b).or_default().insert(*a);
            }
        }
    }
    table
}

fn is_parallel<C: 'static>(a: &Node<C>, b: &Node<C>) -> bool {
    !a.is_ancestor_of(b) && !b.is_ancestor_of(a)
}

/// Collect every read/write and write/write overlap between parallel nodes.
pub(crate) fn check<C: 'static>(
    nodes: &HashMap<NodeId, Node<C>>,
    parallel: &HashMap<NodeId, BTreeSet<NodeId>>,
) -> ConflictReport {
    let mut found: BTreeMap<(VarRef, HazardKind), BTreeSet<String>> = BTreeMap::new();
    let mut record = |var: &VarRef, kind: HazardKind, a: &Node<C>, b: &Node<C>| {
        let names = found.entry((var.clone(), kind)).or_default();
        names.insert(a.name().to_string());
        names.insert(b.name().to_string());
    };

    for (id, peers) in parallel {
        let a = &nodes[id];
        // Each unordered pair once.
        for peer in peers.range(*id..).filter(|p| **p != *id) {
            let b = &nodes[peer];
            for var in a.inputs().intersection(b.outputs()) {
                record(var, HazardKind::ReadWrite, a, b);
            }
            for var in b.inputs().intersection(a.outputs()) {
                record(var, HazardKind::ReadWrite, a, b);
            }
            for var in a.outputs().intersection(b.outputs()) {
                record(var, HazardKind::WriteWrite, a, b);
            }
        }
    }

    let hazards: Vec<Hazard> = found
        .into_iter()
        .map(|((var, kind), nodes)| Hazard {
            variable: var.name.to_string(),
            kind,
            nodes,
        })
        .collect();
    debug!(hazards = hazards.len(), "Input/output validation finished");
    ConflictReport { hazards }
}

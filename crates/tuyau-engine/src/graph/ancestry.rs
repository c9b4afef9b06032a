//! Ancestor sets and cycle detection.
//!
//! Nodes are visited in dependency order (a node is taken once every parent
//! has been taken), and each node's branch is the union of its parents plus
//! their branches. Nodes that never become ready sit on or behind a cycle.

use std::collections::{HashMap, HashSet, VecDeque};

use tuyau_core::{NodeId, Result, TuyauError};

use super::node::Node;

/// Fill in `branch` for every node and return the nodes in dependency order.
pub(crate) fn compute_branches<C: 'static>(
    nodes: &mut HashMap<NodeId, Node<C>>,
) -> Result<Vec<NodeId>> {
    let mut pending: HashMap<NodeId, usize> =
        nodes.iter().map(|(id, n)| (*id, n.parents.len())).collect();
    let mut branches: HashMap<NodeId, HashSet<NodeId>> = HashMap::with_capacity(nodes.len());

    let mut ready: Vec<NodeId> = pending
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(id, _)| *id)
        .collect();
    ready.sort_by(|a, b| nodes[a].name().cmp(nodes[b].name()).then(a.cmp(b)));
    let mut queue: VecDeque<NodeId> = ready.into();
    let mut order = Vec::with_capacity(nodes.len());

    while let Some(id) = queue.pop_front() {
        let mut inherited = branches.get(&id).cloned().unwrap_or_default();
        inherited.insert(id);
        for child in nodes[&id].children() {
            branches
                .entry(child)
                .or_default()
                .extend(inherited.iter().copied());
            if let Some(count) = pending.get_mut(&child) {
                *count -= 1;
                if *count == 0 {
                    queue.push_back(child);
                }
            }
        }
        order.push(id);
    }

    if order.len() < nodes.len() {
        let node = cycle_member(nodes, &order);
        return Err(TuyauError::Cycle { node });
    }

    for (id, node) in nodes.iter_mut() {
        node.branch = branches.remove(id).unwrap_or_default();
    }
    Ok(order)
}

/// Name a node from the unresolved remainder that reaches itself through its
/// parents. Falls back to the first unresolved name.
fn cycle_member<C: 'static>(nodes: &HashMap<NodeId, Node<C>>, resolved: &[NodeId]) -> String {
    let resolved: HashSet<NodeId> = resolved.iter().copied().collect();
    let mut unresolved: Vec<&Node<C>> = nodes
        .values()
        .filter(|n| !resolved.contains(&n.id()))
        .collect();
    unresolved.sort_by(|a, b| a.name().cmp(b.name()).then(a.id().cmp(&b.id())));

    unresolved
        .iter()
        .find(|n| reaches_itself(nodes, n.id()))
        .or_else(|| unresolved.first())
        .map(|n| n.name().to_string())
        .unwrap_or_default()
}

fn reaches_itself<C: 'static>(nodes: &HashMap<NodeId, Node<C>>, start: NodeId) -> bool {
    let mut seen = HashSet::new();
    let mut stack: Vec<NodeId> = nodes[&start].parents().collect();
    while let Some(id) = stack.pop() {
        if id == start {
            return true;
        }
        if seen.insert(id) {
            if let Some(node) = nodes.get(&id) {
                stack.extend(node.parents());
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena(names: &[&str]) -> (HashMap<NodeId, Node<()>>, Vec<NodeId>) {
        let mut nodes = HashMap::new();
        let mut ids = Vec::new();
        for name in names {
            let node = Node::new(*name);
            ids.push(node.id());
            nodes.insert(node.id(), node);
        }
        (nodes, ids)
    }

    fn edge(nodes: &mut HashMap<NodeId, Node<()>>, parent: NodeId, child: NodeId) {
        nodes.get_mut(&parent).unwrap().children.insert(child);
        nodes.get_mut(&child).unwrap().parents.insert(parent);
    }

    #[test]
    fn test_diamond_branches() {
        let (mut nodes, ids) = arena(&["root", "a", "b", "c"]);
        let [root, a, b, c] = [ids[0], ids[1], ids[2], ids[3]];
        edge(&mut nodes, root, a);
        edge(&mut nodes, root, b);
        edge(&mut nodes, a, c);
        edge(&mut nodes, b, c);

        let order = compute_branches(&mut nodes).unwrap();
        assert_eq!(order.first(), Some(&root));
        assert_eq!(order.last(), Some(&c));
        assert!(nodes[&root].branch().is_empty());
        assert_eq!(nodes[&a].branch(), &HashSet::from([root]));
        assert_eq!(nodes[&c].branch(), &HashSet::from([root, a, b]));
    }

    #[test]
    fn test_cycle_is_named() {
        let (mut nodes, ids) = arena(&["root", "x", "y"]);
        let [root, x, y] = [ids[0], ids[1], ids[2]];
        edge(&mut nodes, root, x);
        edge(&mut nodes, x, y);
        edge(&mut nodes, y, x);

        match compute_branches(&mut nodes) {
            Err(TuyauError::Cycle { node }) => assert!(node == "x" || node == "y"),
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn test_cycle_behind_cycle_names_a_member() {
        let (mut nodes, ids) = arena(&["a", "b", "downstream"]);
        let [a, b, d] = [ids[0], ids[1], ids[2]];
        edge(&mut nodes, a, b);
        edge(&mut nodes, b, a);
        edge(&mut nodes, b, d);

        match compute_branches(&mut nodes) {
            Err(TuyauError::Cycle { node }) => assert_eq!(node, "a"),
            other => panic!("expected cycle error, got {other:?}"),
        }
    }
}

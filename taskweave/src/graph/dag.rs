//! DAG utilities: stable topological order, predecessor lookup, transitive
//! dependents.
//!
//! Used by graph compilation to reject cycles and by the scheduler to
//! decide execution order and which nodes a failure poisons.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

/// Computes a topological order over `ids` given `edges` (from, to).
///
/// Stable: ties are broken by insertion order of `ids`, so runs are
/// reproducible. Returns `None` when the edges contain a cycle. Edges
/// referencing unknown ids must be rejected before calling this.
pub(crate) fn topological_order(
    ids: &[String],
    edges: &[(String, String)],
) -> Option<Vec<String>> {
    let index: HashMap<&str, usize> = ids.iter().enumerate().map(|(i, id)| (id.as_str(), i)).collect();
    let mut in_degree = vec![0usize; ids.len()];
    let mut out_edges: Vec<Vec<usize>> = vec![Vec::new(); ids.len()];

    for (from, to) in edges {
        let (Some(&f), Some(&t)) = (index.get(from.as_str()), index.get(to.as_str())) else {
            continue;
        };
        out_edges[f].push(t);
        in_degree[t] += 1;
    }

    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, &d)| d == 0)
        .map(|(i, _)| Reverse(i))
        .collect();
    let mut order = Vec::with_capacity(ids.len());

    while let Some(Reverse(u)) = ready.pop() {
        order.push(ids[u].clone());
        for &v in &out_edges[u] {
            in_degree[v] -= 1;
            if in_degree[v] == 0 {
                ready.push(Reverse(v));
            }
        }
    }

    if order.len() == ids.len() {
        Some(order)
    } else {
        None
    }
}

/// Direct predecessors of `node_id`, in edge insertion order.
pub(crate) fn predecessors(edges: &[(String, String)], node_id: &str) -> Vec<String> {
    edges
        .iter()
        .filter(|(_, to)| to == node_id)
        .map(|(from, _)| from.clone())
        .collect()
}

/// All nodes reachable from `root` along dependency edges (root excluded).
///
/// These are the nodes a failure of `root` prevents from ever starting.
pub(crate) fn transitive_dependents(
    edges: &[(String, String)],
    root: &str,
) -> HashSet<String> {
    let mut successors: HashMap<&str, Vec<&str>> = HashMap::new();
    for (from, to) in edges {
        successors.entry(from.as_str()).or_default().push(to.as_str());
    }

    let mut reached = HashSet::new();
    let mut stack = vec![root];
    while let Some(current) = stack.pop() {
        for &next in successors.get(current).map(Vec::as_slice).unwrap_or(&[]) {
            if reached.insert(next.to_string()) {
                stack.push(next);
            }
        }
    }
    reached
}

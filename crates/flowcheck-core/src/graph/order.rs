//! Canonical execution order.
//!
//! Kahn's algorithm over the dependency graph: a node becomes ready once all
//! of its dependencies have been emitted, and among ready nodes the next one
//! is chosen by `priority` (P0 first), then `phase` ascending, then artifact
//! position. The tie-break is total, so the order is reproducible.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use super::cycles::{Cycle, find_cycle};
use super::DepGraph;
use crate::model::Priority;

#[derive(Debug, Clone, Copy)]
struct ReadyKey {
    priority: Priority,
    phase: f64,
    position: usize,
}

impl PartialEq for ReadyKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ReadyKey {}

impl PartialOrd for ReadyKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ReadyKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| self.phase.total_cmp(&other.phase))
            .then_with(|| self.position.cmp(&other.position))
    }
}

/// Compute the execution order, dependencies first.
///
/// # Errors
///
/// Returns the first [`Cycle`] found; no partial order is ever produced.
pub fn topological_order(graph: &DepGraph) -> Result<Vec<String>, Cycle> {
    if let Some(cycle) = find_cycle(graph) {
        return Err(cycle);
    }

    let n = graph.len();
    let mut remaining: Vec<usize> = (0..n).map(|pos| graph.dependencies(pos).len()).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    for pos in 0..n {
        for &dep in graph.dependencies(pos) {
            dependents[dep].push(pos);
        }
    }

    let key = |pos: usize| {
        let node = graph.node(pos);
        Reverse(ReadyKey {
            priority: node.priority,
            phase: node.phase,
            position: pos,
        })
    };

    let mut ready: BinaryHeap<Reverse<ReadyKey>> =
        (0..n).filter(|&pos| remaining[pos] == 0).map(key).collect();
    let mut order = Vec::with_capacity(n);

    while let Some(Reverse(next)) = ready.pop() {
        order.push(graph.node(next.position).id.clone());
        for &dependent in &dependents[next.position] {
            remaining[dependent] -= 1;
            if remaining[dependent] == 0 {
                ready.push(key(dependent));
            }
        }
    }

    debug_assert_eq!(order.len(), n, "acyclic graph must emit every node");
    Ok(order)
}

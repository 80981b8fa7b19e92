//! Cycle detection for the `depends_on` graph.
//!
//! # Overview
//!
//! A cycle makes every record on it permanently unschedulable, and no
//! execution order exists while one is present. Detection is a depth-first
//! traversal with three-color marking; on re-entering a node that is still on
//! the DFS stack, the loop is reconstructed from the parent chain and returned
//! as an ordered path.
//!
//! # Design
//!
//! - **Deterministic**: roots are visited in artifact order and edges in
//!   declared order, so the same input always yields the same path.
//! - **First cycle only**: the run fails on the first loop found; the report
//!   names it exactly rather than enumerating every loop.
//! - **O(V+E)**: each node and edge is visited at most once.

#![allow(clippy::module_name_repetitions)]

use std::fmt;

use serde::Serialize;

use super::DepGraph;

// ---------------------------------------------------------------------------
// Cycle
// ---------------------------------------------------------------------------

/// A dependency loop.
///
/// `path` starts and ends with the same id, and every consecutive pair is a
/// real `dependent → dependency` edge. For records `A→[B]`, `B→[A]` the path
/// is `["A", "B", "A"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cycle {
    pub path: Vec<String>,
}

impl Cycle {
    /// Number of distinct ids in the cycle.
    #[must_use]
    pub fn len(&self) -> usize {
        self.path.len().saturating_sub(1)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `true` for a 2-node cycle (A↔B).
    #[must_use]
    pub fn is_mutual(&self) -> bool {
        self.len() == 2
    }
}

impl fmt::Display for Cycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_mutual() {
            write!(
                f,
                "dependency cycle detected: mutual dependency between '{}' and '{}' ({})",
                self.path[0],
                self.path[1],
                self.path.join(" -> ")
            )
        } else {
            write!(
                f,
                "dependency cycle detected ({} items): {}",
                self.len(),
                self.path.join(" -> ")
            )
        }
    }
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// DFS colors for cycle detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    /// Not yet visited.
    White,
    /// Currently on the DFS stack.
    Gray,
    /// Fully processed (all descendants visited).
    Black,
}

/// Find the first dependency cycle, if any.
#[must_use]
pub fn find_cycle(graph: &DepGraph) -> Option<Cycle> {
    let mut color = vec![Color::White; graph.len()];
    let mut parent: Vec<Option<usize>> = vec![None; graph.len()];

    for root in 0..graph.len() {
        if color[root] == Color::White {
            if let Some(cycle) = visit(graph, root, &mut color, &mut parent) {
                tracing::debug!(path = ?cycle.path, "dependency cycle found");
                return Some(cycle);
            }
        }
    }
    None
}

fn visit(
    graph: &DepGraph,
    node: usize,
    color: &mut [Color],
    parent: &mut [Option<usize>],
) -> Option<Cycle> {
    color[node] = Color::Gray;

    for &next in graph.dependencies(node) {
        match color[next] {
            Color::White => {
                parent[next] = Some(node);
                if let Some(cycle) = visit(graph, next, color, parent) {
                    return Some(cycle);
                }
            }
            Color::Gray => return Some(reconstruct(graph, parent, node, next)),
            Color::Black => {}
        }
    }

    color[node] = Color::Black;
    None
}

/// Back edge `node → entry` where `entry` is on the stack: walk parents from
/// `node` up to `entry`, then reverse so the path follows edge direction.
fn reconstruct(graph: &DepGraph, parent: &[Option<usize>], node: usize, entry: usize) -> Cycle {
    let mut chain = vec![entry, node];
    let mut cur = node;
    while cur != entry {
        match parent[cur] {
            Some(p) => {
                cur = p;
                chain.push(cur);
            }
            None => break,
        }
    }
    chain.reverse();
    Cycle {
        path: chain
            .into_iter()
            .map(|pos| graph.node(pos).id.clone())
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

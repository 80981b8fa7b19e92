//! Dependency graph over issue records or plan tasks.
//!
//! One node per id, one edge per `depends_on` entry, pointing from the
//! dependent to its dependency. The graph is an immutable snapshot: build it,
//! ask for a cycle or an order, discard it.
//!
//! ## Submodules
//!
//! - [`cycles`]: three-color DFS that reports the exact cycle path.
//! - [`order`]: topological order with the priority/phase/position tie-break.

pub mod cycles;
pub mod order;

use std::collections::HashMap;

use crate::model::{PlanTask, Priority};

pub use cycles::{Cycle, find_cycle};
pub use order::topological_order;

/// Input node: an id, its declared dependencies, and its tie-break keys.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: String,
    pub depends_on: Vec<String>,
    pub priority: Priority,
    pub phase: f64,
}

impl Node {
    pub fn new(id: impl Into<String>, depends_on: &[&str], priority: Priority, phase: f64) -> Self {
        Self {
            id: id.into(),
            depends_on: depends_on.iter().map(|dep| (*dep).to_string()).collect(),
            priority,
            phase,
        }
    }
}

impl From<&PlanTask> for Node {
    fn from(task: &PlanTask) -> Self {
        Self {
            id: task.number.clone(),
            depends_on: task.depends_on.clone(),
            // Tasks without a valid priority sort after every prioritized task.
            priority: task.priority.unwrap_or(Priority::P2),
            phase: task.phase(),
        }
    }
}

/// Adjacency-list graph indexed by artifact position.
#[derive(Debug, Clone, Default)]
pub struct DepGraph {
    nodes: Vec<Node>,
    /// position → positions of its dependencies, in declared order.
    edges: Vec<Vec<usize>>,
}

impl DepGraph {
    /// Build a graph from nodes in artifact order.
    ///
    /// Edges to unknown ids and self-edges are left out: both are reported
    /// as reference findings by the schema pass. When an id is declared more
    /// than once, only the first declaration becomes a node.
    pub fn new(nodes: impl IntoIterator<Item = Node>) -> Self {
        let mut kept: Vec<Node> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for node in nodes {
            if index.contains_key(&node.id) {
                tracing::debug!(id = %node.id, "duplicate id left out of dependency graph");
                continue;
            }
            index.insert(node.id.clone(), kept.len());
            kept.push(node);
        }

        let edges = kept
            .iter()
            .enumerate()
            .map(|(pos, node)| {
                let mut targets: Vec<usize> = Vec::new();
                for dep in &node.depends_on {
                    match index.get(dep) {
                        Some(&target) if target != pos && !targets.contains(&target) => {
                            targets.push(target);
                        }
                        _ => {}
                    }
                }
                targets
            })
            .collect();

        Self { nodes: kept, edges }
    }

    pub fn from_tasks<'a>(tasks: impl IntoIterator<Item = &'a PlanTask>) -> Self {
        Self::new(tasks.into_iter().map(Node::from))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub(crate) fn node(&self, pos: usize) -> &Node {
        &self.nodes[pos]
    }

    /// Dependencies of the node at `pos`.
    pub(crate) fn dependencies(&self, pos: usize) -> &[usize] {
        &self.edges[pos]
    }

    /// `true` if `from` declares a (resolved) dependency on `to`.
    #[must_use]
    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        let Some(from_pos) = self.position(from) else {
            return false;
        };
        self.edges[from_pos]
            .iter()
            .any(|&target| self.nodes[target].id == to)
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.nodes.iter().position(|node| node.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dangling_and_self_edges_are_dropped() {
        let graph = DepGraph::new([
            Node::new("A", &["A", "ghost"], Priority::P0, 1.0),
            Node::new("B", &["A", "A"], Priority::P0, 1.0),
        ]);
        assert_eq!(graph.len(), 2);
        assert!(graph.dependencies(0).is_empty());
        assert_eq!(graph.dependencies(1), &[0]);
        assert!(graph.has_edge("B", "A"));
        assert!(!graph.has_edge("A", "ghost"));
    }

    #[test]
    fn duplicate_ids_keep_first_declaration() {
        let graph = DepGraph::new([
            Node::new("A", &[], Priority::P0, 1.0),
            Node::new("A", &["B"], Priority::P1, 2.0),
            Node::new("B", &[], Priority::P0, 1.0),
        ]);
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.node(0).priority, Priority::P0);
        assert!(!graph.has_edge("A", "B"));
    }
}

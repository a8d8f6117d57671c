//! Dependency graph construction and algorithms using petgraph.
//!
//! This module provides:
//! - [`build_graph`]: flat node/edge lists to an arena-indexed adjacency structure
//! - [`detect_cycles`]: rotation-deduplicated cycle enumeration
//! - [`plan`] / [`plan_batches`]: deterministic topological linearization
//! - [`Graph::dependency_tree`]: BFS over prerequisites with depth
//!
//! # Edge Direction Convention
//!
//! Edges point from **dependent -> prerequisite**: an edge `(from, to)` means
//! `from` depends on `to`, so `to` must be scheduled first. The same structure
//! serves generic "module graphs" (e.g. file imports), where the node
//! semantics differ but the algorithms are identical.
//!
//! # Arena Indexing
//!
//! Nodes are never removed, so petgraph's `NodeIndex` values stay dense
//! (`0..node_count`). The algorithms map identifiers to these indices once and
//! work on plain `usize` slices afterwards.

mod cycles;
mod topo;

pub use cycles::{detect_cycles, detect_cycles_in_edges, Cycle};
pub use topo::{plan, plan_batches};

use crate::domain::{Task, TaskDependency, TaskId};
use crate::error::{Error, Result};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{HashMap, HashSet, VecDeque};

/// Directed graph over string identifiers.
///
/// Duplicate edges collapse on insertion; a node that appears only as an edge
/// endpoint is added implicitly.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    /// Node weights are the identifiers; edges carry no weight.
    graph: DiGraph<String, ()>,

    /// Mapping from identifier to graph `NodeIndex`.
    node_map: HashMap<String, NodeIndex>,
}

impl Graph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node if it is not already present and return its index.
    pub fn add_node(&mut self, id: impl Into<String>) -> NodeIndex {
        let id = id.into();
        if let Some(&idx) = self.node_map.get(&id) {
            return idx;
        }
        let idx = self.graph.add_node(id.clone());
        self.node_map.insert(id, idx);
        idx
    }

    /// Add the edge `from -> to` ("from depends on to").
    ///
    /// Both endpoints are created on demand. Adding an existing edge again is
    /// a no-op.
    pub fn add_edge(&mut self, from: impl Into<String>, to: impl Into<String>) {
        let from = self.add_node(from);
        let to = self.add_node(to);
        self.graph.update_edge(from, to, ());
    }

    /// Build the task graph from a snapshot.
    ///
    /// Every task is declared as a node; edges whose endpoints are not in
    /// `tasks` still contribute their endpoints.
    #[must_use]
    pub fn from_dependencies(tasks: &[Task], edges: &[TaskDependency]) -> Self {
        build_graph(
            tasks.iter().map(|t| t.id.as_str()),
            edges.iter().map(TaskDependency::endpoints),
        )
    }

    /// Returns `true` if `id` is a node of the graph.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.node_map.contains_key(id)
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of distinct edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Returns `true` if the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// All node identifiers in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.graph.node_indices().map(|idx| self.graph[idx].as_str())
    }

    /// Direct prerequisites of `id`, sorted by identifier.
    #[must_use]
    pub fn successors(&self, id: &str) -> Vec<&str> {
        self.neighbors_sorted(id, Direction::Outgoing)
    }

    /// Direct dependents of `id`, sorted by identifier.
    #[must_use]
    pub fn predecessors(&self, id: &str) -> Vec<&str> {
        self.neighbors_sorted(id, Direction::Incoming)
    }

    fn neighbors_sorted(&self, id: &str, dir: Direction) -> Vec<&str> {
        let Some(&idx) = self.node_map.get(id) else {
            return Vec::new();
        };
        let mut out: Vec<&str> = self
            .graph
            .neighbors_directed(idx, dir)
            .map(|n| self.graph[n].as_str())
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Identifier stored at a dense index.
    pub(crate) fn label(&self, index: usize) -> &str {
        &self.graph[NodeIndex::new(index)]
    }

    /// Dense index of `id`, if present.
    pub(crate) fn index_of(&self, id: &str) -> Option<usize> {
        self.node_map.get(id).map(|idx| idx.index())
    }

    /// Per-node neighbor lists in the given direction, each sorted by
    /// identifier and deduplicated.
    ///
    /// The sort makes every traversal built on top of this independent of the
    /// order in which nodes and edges were declared.
    pub(crate) fn sorted_adjacency(&self, dir: Direction) -> Vec<Vec<usize>> {
        self.graph
            .node_indices()
            .map(|idx| {
                let mut next: Vec<usize> = self
                    .graph
                    .neighbors_directed(idx, dir)
                    .map(NodeIndex::index)
                    .collect();
                next.sort_unstable_by(|a, b| self.label(*a).cmp(self.label(*b)));
                next.dedup();
                next
            })
            .collect()
    }

    /// Dense indices of all nodes, sorted by identifier.
    pub(crate) fn sorted_indices(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.graph.node_count()).collect();
        order.sort_unstable_by(|a, b| self.label(*a).cmp(self.label(*b)));
        order
    }

    /// Transitive prerequisites of `id` with their depth.
    ///
    /// Uses BFS, so each prerequisite is reported once at its shortest
    /// distance (1 for direct prerequisites). `max_depth` bounds the
    /// traversal; `None` explores everything reachable.
    ///
    /// # Errors
    ///
    /// Returns `Error::TaskNotFound` if `id` is not a node of the graph.
    pub fn dependency_tree(
        &self,
        id: &str,
        max_depth: Option<usize>,
    ) -> Result<Vec<(String, usize)>> {
        let start = self
            .index_of(id)
            .ok_or_else(|| Error::TaskNotFound(TaskId::new(id)))?;
        let adjacency = self.sorted_adjacency(Direction::Outgoing);

        let mut result = Vec::new();
        let mut visited = HashSet::from([start]);
        let mut queue: VecDeque<(usize, usize)> = VecDeque::from([(start, 0)]);

        while let Some((current, depth)) = queue.pop_front() {
            if max_depth.is_some_and(|max| depth >= max) {
                continue;
            }
            for &next in &adjacency[current] {
                if visited.insert(next) {
                    result.push((self.label(next).to_string(), depth + 1));
                    queue.push_back((next, depth + 1));
                }
            }
        }

        Ok(result)
    }
}

/// Build a graph from declared nodes and `(from, to)` edges.
///
/// Declared nodes keep their order; nodes that appear only as an edge
/// endpoint are appended as they are first seen. No semantic validation is
/// performed.
pub fn build_graph<N, E, A, B>(nodes: N, edges: E) -> Graph
where
    N: IntoIterator,
    N::Item: Into<String>,
    E: IntoIterator<Item = (A, B)>,
    A: Into<String>,
    B: Into<String>,
{
    let mut graph = Graph::new();
    for node in nodes {
        graph.add_node(node);
    }
    for (from, to) in edges {
        graph.add_edge(from, to);
    }
    graph
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_graph_merges_endpoint_only_nodes() {
        let graph = build_graph(["A"], [("B", "A"), ("C", "B")]);

        assert_eq!(graph.node_count(), 3);
        assert!(graph.contains("C"));
        assert_eq!(graph.nodes().collect::<Vec<_>>(), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_duplicate_edges_collapse() {
        let graph = build_graph(Vec::<String>::new(), [("B", "A"), ("B", "A")]);

        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.successors("B"), vec!["A"]);
    }

    #[test]
    fn test_successors_and_predecessors_are_sorted() {
        let graph = build_graph(
            Vec::<String>::new(),
            [("x", "c"), ("x", "a"), ("x", "b"), ("y", "a")],
        );

        assert_eq!(graph.successors("x"), vec!["a", "b", "c"]);
        assert_eq!(graph.predecessors("a"), vec!["x", "y"]);
        assert!(graph.successors("missing").is_empty());
    }

    #[test]
    fn test_from_dependencies_declares_isolated_tasks() {
        let tasks = vec![Task::new("A", "p1"), Task::new("lonely", "p1")];
        let edges = vec![TaskDependency::new("B", "A")];

        let graph = Graph::from_dependencies(&tasks, &edges);
        assert!(graph.contains("lonely"));
        assert!(graph.contains("B"));
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_dependency_tree_reports_depths() {
        // A depends on B, B depends on C
        let graph = build_graph(Vec::<String>::new(), [("A", "B"), ("B", "C")]);

        let tree = graph.dependency_tree("A", None).unwrap();
        assert_eq!(tree, vec![("B".to_string(), 1), ("C".to_string(), 2)]);

        let shallow = graph.dependency_tree("A", Some(1)).unwrap();
        assert_eq!(shallow, vec![("B".to_string(), 1)]);
    }

    #[test]
    fn test_dependency_tree_terminates_on_cycle() {
        let graph = build_graph(Vec::<String>::new(), [("A", "B"), ("B", "A")]);

        let tree = graph.dependency_tree("A", None).unwrap();
        assert_eq!(tree, vec![("B".to_string(), 1)]);
    }

    #[test]
    fn test_dependency_tree_unknown_node() {
        let graph = Graph::new();
        assert!(matches!(
            graph.dependency_tree("nope", None),
            Err(Error::TaskNotFound(_))
        ));
    }
}

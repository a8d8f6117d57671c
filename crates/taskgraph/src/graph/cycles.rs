//! Cycle detection with rotation-invariant deduplication.
//!
//! The traversal is an explicit stack machine rather than a recursive DFS, so
//! graphs with long dependency chains cannot exhaust the call stack. It keeps:
//! - a visited set,
//! - an "on the current path" set,
//! - the path itself, plus each node's position in it.
//!
//! When an edge reaches a node that is still on the path, the slice of the
//! path from that node to the top is a cycle. Each cycle is rotated to start
//! at its smallest identifier, and the resulting key deduplicates cycles
//! found from different entry points.

use super::Graph;
use crate::domain::TaskDependency;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Separator used when joining a cycle into its canonical key.
const KEY_SEPARATOR: &str = " -> ";

/// A closed walk through the graph, stored in canonical rotation.
///
/// `nodes[i]` depends on `nodes[i + 1]`, and the last node depends on the
/// first. Two cycles that are rotations of one another compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cycle {
    nodes: Vec<String>,
}

impl Cycle {
    /// Create a cycle from a node sequence, rotating it so it starts at its
    /// lexicographically smallest element.
    #[must_use]
    pub fn new(mut nodes: Vec<String>) -> Self {
        if let Some(start) = nodes
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.cmp(b))
            .map(|(i, _)| i)
        {
            nodes.rotate_left(start);
        }
        Self { nodes }
    }

    /// Nodes in canonical order.
    #[must_use]
    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    /// Number of nodes in the cycle (1 for a self-loop).
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` for the degenerate empty cycle.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns `true` if `id` lies on the cycle.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.nodes.iter().any(|n| n == id)
    }

    /// Returns `true` if the cycle traverses the edge `from -> to`.
    #[must_use]
    pub fn contains_edge(&self, from: &str, to: &str) -> bool {
        let len = self.nodes.len();
        (0..len).any(|i| self.nodes[i] == from && self.nodes[(i + 1) % len] == to)
    }

    /// Rotation-invariant identity of the cycle.
    #[must_use]
    pub fn canonical_key(&self) -> String {
        self.nodes.join(KEY_SEPARATOR)
    }
}

impl fmt::Display for Cycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical_key())?;
        if let Some(first) = self.nodes.first() {
            write!(f, "{KEY_SEPARATOR}{first}")?;
        }
        Ok(())
    }
}

/// Find the cycles of `graph`, one per distinct back edge, deduplicated.
///
/// Every node is a traversal seed, including nodes that only appear as edge
/// endpoints. Nodes and successors are visited in identifier order, so the
/// result depends only on the edge set and never on declaration order. The
/// returned list is sorted by canonical key; an acyclic graph yields an empty
/// list.
#[must_use]
pub fn detect_cycles(graph: &Graph) -> Vec<Cycle> {
    let n = graph.node_count();
    let adjacency = graph.sorted_adjacency(Direction::Outgoing);

    let mut visited = vec![false; n];
    let mut on_path = vec![false; n];
    let mut path_pos = vec![0usize; n];
    let mut path: Vec<usize> = Vec::new();
    // (node, index of the next successor to explore)
    let mut frames: Vec<(usize, usize)> = Vec::new();

    let mut seen: HashSet<String> = HashSet::new();
    let mut found: Vec<(String, Cycle)> = Vec::new();

    for seed in graph.sorted_indices() {
        if visited[seed] {
            continue;
        }
        visited[seed] = true;
        on_path[seed] = true;
        path_pos[seed] = 0;
        path.push(seed);
        frames.push((seed, 0));

        while let Some(&(node, cursor)) = frames.last() {
            let Some(&next) = adjacency[node].get(cursor) else {
                frames.pop();
                path.pop();
                on_path[node] = false;
                continue;
            };

            let top = frames.len() - 1;
            frames[top].1 += 1;

            if on_path[next] {
                let cycle = Cycle::new(
                    path[path_pos[next]..]
                        .iter()
                        .map(|&i| graph.label(i).to_string())
                        .collect(),
                );
                let key = cycle.canonical_key();
                if seen.insert(key.clone()) {
                    found.push((key, cycle));
                }
            } else if !visited[next] {
                visited[next] = true;
                on_path[next] = true;
                path_pos[next] = path.len();
                path.push(next);
                frames.push((next, 0));
            }
        }
    }

    found.sort_by(|(a, _), (b, _)| a.cmp(b));
    tracing::debug!(nodes = n, cycles = found.len(), "Cycle detection finished");
    found.into_iter().map(|(_, cycle)| cycle).collect()
}

/// Convenience wrapper: build a graph from dependency rows and detect its cycles.
#[must_use]
pub fn detect_cycles_in_edges(edges: &[TaskDependency]) -> Vec<Cycle> {
    let graph = super::build_graph(
        std::iter::empty::<String>(),
        edges.iter().map(TaskDependency::endpoints),
    );
    detect_cycles(&graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::build_graph;
    use rstest::rstest;

    fn edges_only(edges: &[(&str, &str)]) -> Graph {
        build_graph(std::iter::empty::<String>(), edges.iter().copied())
    }

    #[test]
    fn test_acyclic_graph_has_no_cycles() {
        let graph = edges_only(&[("B", "A"), ("C", "B"), ("C", "A")]);
        assert!(detect_cycles(&graph).is_empty());
    }

    #[test]
    fn test_empty_graph_has_no_cycles() {
        assert!(detect_cycles(&Graph::new()).is_empty());
    }

    #[test]
    fn test_self_loop_is_single_node_cycle() {
        let graph = edges_only(&[("A", "A")]);

        let cycles = detect_cycles(&graph);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].nodes(), ["A".to_string()]);
        assert!(cycles[0].contains_edge("A", "A"));
    }

    #[rstest]
    #[case::xyz(&["x", "y", "z"])]
    #[case::yzx(&["y", "z", "x"])]
    #[case::zxy(&["z", "x", "y"])]
    #[case::zyx(&["z", "y", "x"])]
    fn test_three_cycle_found_once_regardless_of_declaration(#[case] declared: &[&str]) {
        let graph = build_graph(
            declared.iter().copied(),
            [("x", "y"), ("y", "z"), ("z", "x")],
        );

        let cycles = detect_cycles(&graph);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].canonical_key(), "x -> y -> z");
    }

    #[test]
    fn test_rotations_share_canonical_key() {
        let a = Cycle::new(vec!["b".into(), "c".into(), "a".into()]);
        let b = Cycle::new(vec!["c".into(), "a".into(), "b".into()]);

        assert_eq!(a, b);
        assert_eq!(a.canonical_key(), "a -> b -> c");
        assert_eq!(a.to_string(), "a -> b -> c -> a");
    }

    #[test]
    fn test_reversed_cycle_is_distinct() {
        let forward = Cycle::new(vec!["a".into(), "b".into(), "c".into()]);
        let backward = Cycle::new(vec!["a".into(), "c".into(), "b".into()]);
        assert_ne!(forward.canonical_key(), backward.canonical_key());
    }

    #[test]
    fn test_disjoint_cycles_are_both_reported() {
        let graph = edges_only(&[("a", "b"), ("b", "a"), ("m", "n"), ("n", "m"), ("q", "a")]);

        let keys: Vec<String> = detect_cycles(&graph)
            .iter()
            .map(Cycle::canonical_key)
            .collect();
        assert_eq!(keys, vec!["a -> b", "m -> n"]);
    }

    #[test]
    fn test_endpoint_only_nodes_are_seeds() {
        // Declared nodes are unrelated; the cycle lives entirely among
        // undeclared endpoints.
        let graph = build_graph(["solo"], [("p", "q"), ("q", "p")]);

        let cycles = detect_cycles(&graph);
        assert_eq!(cycles.len(), 1);
        assert!(cycles[0].contains("p") && cycles[0].contains("q"));
    }

    #[test]
    fn test_long_chain_does_not_overflow() {
        let n = 50_000;
        let mut edges: Vec<(String, String)> =
            (0..n).map(|i| (format!("n{i:06}"), format!("n{:06}", i + 1))).collect();
        edges.push((format!("n{n:06}"), "n000000".to_string()));
        let graph = build_graph(std::iter::empty::<String>(), edges);

        let cycles = detect_cycles(&graph);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].len(), n + 1);
        assert_eq!(cycles[0].nodes()[0], "n000000");
    }

    #[test]
    fn test_detect_cycles_in_edges() {
        let edges = vec![
            TaskDependency::new("B", "A"),
            TaskDependency::new("C", "B"),
            TaskDependency::new("A", "C"),
        ];

        let cycles = detect_cycles_in_edges(&edges);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].canonical_key(), "A -> C -> B");
    }
}

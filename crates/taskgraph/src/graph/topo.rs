//! Deterministic topological planning.
//!
//! Kahn's algorithm over the dense node indices. Among nodes whose
//! prerequisites are all scheduled, the smallest identifier goes first, which
//! makes the order reproducible for identical input.

use super::Graph;
use crate::error::{Error, Result};
use petgraph::Direction;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Linearize an acyclic graph so every prerequisite precedes its dependents.
///
/// For every edge "task depends on X", X's position is before task's.
/// Independent nodes are ordered by identifier.
///
/// # Errors
///
/// Returns `Error::CyclicGraph` listing the nodes that could not be placed
/// if the graph contains a cycle (self-loops included).
pub fn plan(graph: &Graph) -> Result<Vec<String>> {
    let n = graph.node_count();
    let prerequisites = graph.sorted_adjacency(Direction::Outgoing);
    let dependents = graph.sorted_adjacency(Direction::Incoming);
    let mut remaining: Vec<usize> = prerequisites.iter().map(Vec::len).collect();

    let mut ready: BinaryHeap<Reverse<(&str, usize)>> = (0..n)
        .filter(|&i| remaining[i] == 0)
        .map(|i| Reverse((graph.label(i), i)))
        .collect();

    let mut order = Vec::with_capacity(n);
    while let Some(Reverse((label, idx))) = ready.pop() {
        order.push(label.to_string());
        for &dependent in &dependents[idx] {
            remaining[dependent] -= 1;
            if remaining[dependent] == 0 {
                ready.push(Reverse((graph.label(dependent), dependent)));
            }
        }
    }

    if order.len() < n {
        return Err(cyclic_graph(graph, &remaining));
    }
    Ok(order)
}

/// Group an acyclic graph into execution batches.
///
/// Every member of a batch has all of its prerequisites in earlier batches,
/// so the members of one batch can run in parallel. Batches are sorted by
/// identifier internally.
///
/// # Errors
///
/// Returns `Error::CyclicGraph` if the graph contains a cycle.
pub fn plan_batches(graph: &Graph) -> Result<Vec<Vec<String>>> {
    let prerequisites = graph.sorted_adjacency(Direction::Outgoing);
    let dependents = graph.sorted_adjacency(Direction::Incoming);
    let mut remaining: Vec<usize> = prerequisites.iter().map(Vec::len).collect();

    let mut current: Vec<usize> = graph
        .sorted_indices()
        .into_iter()
        .filter(|&i| remaining[i] == 0)
        .collect();
    let mut batches = Vec::new();
    let mut placed = 0;

    while !current.is_empty() {
        placed += current.len();
        let mut next = Vec::new();
        for &idx in &current {
            for &dependent in &dependents[idx] {
                remaining[dependent] -= 1;
                if remaining[dependent] == 0 {
                    next.push(dependent);
                }
            }
        }
        batches.push(current.iter().map(|&i| graph.label(i).to_string()).collect());
        next.sort_unstable_by(|a, b| graph.label(*a).cmp(graph.label(*b)));
        current = next;
    }

    if placed < graph.node_count() {
        return Err(cyclic_graph(graph, &remaining));
    }
    Ok(batches)
}

fn cyclic_graph(graph: &Graph, remaining: &[usize]) -> Error {
    let mut unresolved: Vec<String> = remaining
        .iter()
        .enumerate()
        .filter(|(_, count)| **count > 0)
        .map(|(i, _)| graph.label(i).to_string())
        .collect();
    unresolved.sort_unstable();
    tracing::warn!(
        unresolved = unresolved.len(),
        "Plan requested for a cyclic graph"
    );
    Error::CyclicGraph { unresolved }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::build_graph;

    fn position(order: &[String], id: &str) -> usize {
        order.iter().position(|n| n == id).unwrap()
    }

    #[test]
    fn test_chain_plans_prerequisites_first() {
        // B depends on A, C depends on B
        let graph = build_graph(["A", "B", "C"], [("B", "A"), ("C", "B")]);
        assert_eq!(plan(&graph).unwrap(), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_ties_break_by_identifier() {
        let graph = build_graph(["zeta", "alpha", "mu"], std::iter::empty::<(String, String)>());
        assert_eq!(plan(&graph).unwrap(), vec!["alpha", "mu", "zeta"]);
    }

    #[test]
    fn test_diamond_respects_every_edge() {
        let edges = [("d", "b"), ("d", "c"), ("b", "a"), ("c", "a")];
        let graph = build_graph(std::iter::empty::<String>(), edges);

        let order = plan(&graph).unwrap();
        assert_eq!(order, vec!["a", "b", "c", "d"]);
        for (task, prerequisite) in edges {
            assert!(position(&order, prerequisite) < position(&order, task));
        }
    }

    #[test]
    fn test_plan_is_independent_of_declaration_order() {
        let first = build_graph(["c", "b", "a"], [("c", "a"), ("b", "a")]);
        let second = build_graph(["a", "b", "c"], [("b", "a"), ("c", "a")]);
        assert_eq!(plan(&first).unwrap(), plan(&second).unwrap());
    }

    #[test]
    fn test_cycle_is_structural_error() {
        let graph = build_graph(["root"], [("x", "y"), ("y", "x"), ("w", "x")]);

        match plan(&graph) {
            Err(Error::CyclicGraph { unresolved }) => {
                assert_eq!(unresolved, vec!["w", "x", "y"]);
            }
            other => panic!("expected CyclicGraph, got {other:?}"),
        }
    }

    #[test]
    fn test_self_loop_is_structural_error() {
        let graph = build_graph(std::iter::empty::<String>(), [("a", "a")]);
        assert!(matches!(plan(&graph), Err(Error::CyclicGraph { .. })));
        assert!(matches!(plan_batches(&graph), Err(Error::CyclicGraph { .. })));
    }

    #[test]
    fn test_empty_graph_plans_nothing() {
        assert!(plan(&Graph::new()).unwrap().is_empty());
        assert!(plan_batches(&Graph::new()).unwrap().is_empty());
    }

    #[test]
    fn test_batches_group_independent_work() {
        let graph = build_graph(
            std::iter::empty::<String>(),
            [("d", "b"), ("d", "c"), ("b", "a"), ("c", "a"), ("e", "a")],
        );

        let batches = plan_batches(&graph).unwrap();
        assert_eq!(
            batches,
            vec![vec!["a"], vec!["b", "c", "e"], vec!["d"]]
        );
    }
}

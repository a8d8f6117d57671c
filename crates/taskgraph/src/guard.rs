//! Cycle guard for dependency insertion.
//!
//! The guard is a pure check: it is handed the committed edge set and a
//! candidate edge, and decides whether committing the candidate would leave
//! the graph acyclic. It never writes. Serializing the check with the write is
//! the caller's job (see [`crate::service::DependencyService`]).

use crate::domain::TaskDependency;
use crate::error::{Error, Result};
use crate::graph::{build_graph, detect_cycles, Graph};
use std::collections::{HashMap, VecDeque};

/// Rejects edges that would introduce a cycle
#[derive(Debug, Clone, Copy, Default)]
pub struct DependencyGuard;

impl DependencyGuard {
    /// Check `candidate` against `existing`.
    ///
    /// The check runs the cycle detector over `existing + candidate`. When the
    /// candidate closes a loop, the reported cycle starts at the dependent and
    /// follows the candidate edge first.
    ///
    /// # Errors
    ///
    /// - `Error::Validation` if either endpoint is blank
    /// - `Error::WouldCreateCycle` if the combined edge set contains a cycle,
    ///   self-loops included
    pub fn try_add_edge(existing: &[TaskDependency], candidate: &TaskDependency) -> Result<()> {
        if candidate.task_id.is_blank() || candidate.depends_on_task_id.is_blank() {
            return Err(Error::Validation(
                "dependency endpoints must not be empty".to_string(),
            ));
        }

        let graph = build_graph(
            std::iter::empty::<String>(),
            existing
                .iter()
                .chain(std::iter::once(candidate))
                .map(TaskDependency::endpoints),
        );
        let cycles = detect_cycles(&graph);
        let Some(first) = cycles.first() else {
            return Ok(());
        };

        let (from, to) = candidate.endpoints();
        let cycle = closing_path(&graph, from, to).unwrap_or_else(|| first.nodes().to_vec());
        tracing::info!(
            task_id = %candidate.task_id,
            depends_on = %candidate.depends_on_task_id,
            cycle_len = cycle.len(),
            "Rejected dependency that would create a cycle"
        );
        Err(Error::WouldCreateCycle {
            task_id: candidate.task_id.clone(),
            depends_on_task_id: candidate.depends_on_task_id.clone(),
            cycle,
        })
    }
}

/// Shortest cycle through the edge `from -> to`, as `[from, to, ..]`.
fn closing_path(graph: &Graph, from: &str, to: &str) -> Option<Vec<String>> {
    if from == to {
        return Some(vec![from.to_string()]);
    }

    // BFS from `to` back to `from`; parents reconstruct the path.
    let mut parent: HashMap<&str, &str> = HashMap::new();
    let mut queue = VecDeque::from([to]);
    while let Some(current) = queue.pop_front() {
        if current == from {
            let mut path = vec![from.to_string()];
            let mut tail = Vec::new();
            let mut node = from;
            while node != to {
                let Some(&prev) = parent.get(node) else {
                    break;
                };
                tail.push(prev.to_string());
                node = prev;
            }
            tail.reverse();
            path.extend(tail);
            return Some(path);
        }
        for next in graph.successors(current) {
            if next != to && !parent.contains_key(next) {
                parent.insert(next, current);
                queue.push_back(next);
            }
        }
    }
    None
}

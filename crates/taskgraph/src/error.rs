//! Error types for taskgraph operations.
//!
//! Every expected outcome of the engine is an ordinary, named variant:
//! a rejected edge is [`Error::WouldCreateCycle`], a plan over a cyclic graph
//! is [`Error::CyclicGraph`], an aborted scan is [`Error::Cancelled`]. A cache
//! miss is not an error at all.

use crate::domain::TaskId;
use std::io;
use thiserror::Error;

/// The error type for taskgraph operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Input failed validation before any graph work was done.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The subject task does not exist in the snapshot.
    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    /// The prerequisite task does not exist in the snapshot.
    #[error("Depends-on task not found: {0}")]
    DependsOnTaskNotFound(TaskId),

    /// Adding the edge would close a cycle in the committed graph.
    #[error(
        "Adding dependency {task_id} -> {depends_on_task_id} would create a cycle: {}",
        .cycle.join(" -> ")
    )]
    WouldCreateCycle {
        /// The dependent side of the rejected edge
        task_id: TaskId,
        /// The prerequisite side of the rejected edge
        depends_on_task_id: TaskId,
        /// One cycle the edge would have introduced
        cycle: Vec<String>,
    },

    /// A plan was requested for a graph that contains a cycle.
    #[error("Cannot plan a cyclic graph; unresolved nodes: {}", .unresolved.join(", "))]
    CyclicGraph {
        /// Nodes that could not be placed in the order
        unresolved: Vec<String>,
    },

    /// A scan observed its cancellation signal and stopped early.
    #[error("Operation cancelled after processing {processed} tasks")]
    Cancelled {
        /// Number of per-task units completed before the abort
        processed: usize,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error occurred.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Backing store error.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl Error {
    /// Returns `true` for the cycle-rejection condition.
    #[must_use]
    pub fn is_would_create_cycle(&self) -> bool {
        matches!(self, Self::WouldCreateCycle { .. })
    }
}

/// A specialized Result type for taskgraph operations.
pub type Result<T> = std::result::Result<T, Error>;

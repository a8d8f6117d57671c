//! Taskgraph - a task dependency graph and change-impact engine.
//!
//! Given tasks and "task depends on task" edges, the crate detects cycles,
//! rejects edges that would create one, plans a deterministic execution
//! order, and computes the blast radius and risk of changing a task.
//! Expensive analyses are memoized per project in a TTL cache.

#![forbid(unsafe_code)]

// Public modules for library usage
pub mod automation;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod graph;
pub mod guard;
pub mod impact;
pub mod service;
pub mod storage;

// Public CLI modules (needed by binary)
pub mod cli;
pub mod output;

pub use error::{Error, Result};

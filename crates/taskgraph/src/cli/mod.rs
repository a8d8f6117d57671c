//! CLI argument parsing and command dispatch.
//!
//! Every command reads a JSON snapshot (`{"tasks": [...], "dependencies": [...]}`)
//! and, except for `add-dep`, only analyzes it.
//!
//! # Commands
//!
//! - `cycles`: List dependency cycles
//! - `plan`: Print a topological execution order (or batches)
//! - `impact`: Analyze the blast radius of changing a task
//! - `blocked`: List tasks blocked by unfinished prerequisites
//! - `auto-complete`: Show confidence-based completion decisions
//! - `add-dep`: Add a dependency, rejecting cycles, and save the snapshot
//!
//! # Example
//!
//! ```bash
//! taskgraph --snapshot project.json plan --batches
//! taskgraph --snapshot project.json impact task-42 --change-type remove
//! taskgraph --snapshot project.json add-dep task-7 task-3 --confidence 0.9
//! ```

mod execute;
mod types;

use crate::config::EngineConfig;
use crate::domain::Snapshot;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

pub use types::{ChangeTypeArg, DependencyTypeArg};

/// Task dependency graph and change-impact engine
#[derive(Parser, Debug)]
#[command(name = "taskgraph")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Snapshot file with tasks and dependencies (JSON)
    #[arg(short, long, global = true, default_value = "taskgraph.json")]
    pub snapshot: PathBuf,

    /// Engine configuration file (YAML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format for programmatic use
    #[arg(long, global = true)]
    pub json: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// List dependency cycles
    ///
    /// Each cycle is reported once, starting at its smallest task id.
    Cycles,

    /// Print a deterministic execution order
    Plan(PlanArgs),

    /// Analyze the impact of changing a task
    ///
    /// Lists every task that directly or transitively depends on the
    /// subject, with a risk tier and suggested mitigations.
    Impact(ImpactArgs),

    /// Show tasks blocked by unfinished prerequisites
    Blocked,

    /// Show auto-completion decisions based on verification confidence
    AutoComplete,

    /// Add a dependency between two tasks
    ///
    /// The edge is rejected if it would create a cycle. On success the
    /// snapshot file is rewritten.
    AddDep(AddDepArgs),
}

/// Arguments for the `plan` command
#[derive(Parser, Debug, Clone)]
pub struct PlanArgs {
    /// Group the order into batches that can run in parallel
    #[arg(long)]
    pub batches: bool,
}

/// Arguments for the `impact` command
#[derive(Parser, Debug, Clone)]
pub struct ImpactArgs {
    /// Task being changed
    pub task_id: String,

    /// Kind of change
    #[arg(short = 't', long, value_enum, default_value_t = ChangeTypeArg::Modify)]
    pub change_type: ChangeTypeArg,
}

/// Arguments for the `add-dep` command
#[derive(Parser, Debug, Clone)]
pub struct AddDepArgs {
    /// The dependent task
    pub task_id: String,

    /// The prerequisite task
    pub depends_on: String,

    /// Scheduling constraint
    #[arg(short = 't', long, value_enum, default_value_t = DependencyTypeArg::FinishToStart)]
    pub dep_type: DependencyTypeArg,

    /// Confidence that the dependency is real, in [0, 1]
    #[arg(long, default_value = "1.0", value_parser = parse_confidence)]
    pub confidence: f64,
}

fn parse_confidence(s: &str) -> std::result::Result<f64, String> {
    let value: f64 = s.parse().map_err(|_| format!("'{s}' is not a number"))?;
    crate::domain::validate_confidence(value).map_err(|e| e.to_string())?;
    Ok(value)
}

impl Cli {
    /// Parse CLI arguments from command line
    #[must_use]
    pub fn parse_args() -> Self {
        <Self as Parser>::parse()
    }

    /// Parse CLI arguments from an iterator (for testing)
    ///
    /// # Errors
    ///
    /// Returns the clap error for invalid arguments.
    pub fn try_parse_from<I, T>(iter: I) -> std::result::Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(iter)
    }

    /// Execute the CLI command
    ///
    /// `cancel` aborts the project-wide scans (`blocked`, `auto-complete`) and
    /// stops the cache cleanup started by `add-dep`.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot or configuration cannot be loaded,
    /// or the command itself fails.
    pub async fn execute(&self, cancel: CancellationToken) -> Result<()> {
        let config = match &self.config {
            Some(path) => EngineConfig::load(path)
                .await
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => EngineConfig::default(),
        };
        let snapshot = load_snapshot(&self.snapshot).await?;
        let mode = if self.json {
            OutputMode::Json
        } else {
            OutputMode::Text
        };

        match &self.command {
            Commands::Cycles => execute::execute_cycles(&snapshot, mode),
            Commands::Plan(args) => execute::execute_plan(&snapshot, args, mode),
            Commands::Impact(args) => execute::execute_impact(&snapshot, &config, args, mode),
            Commands::Blocked => execute::execute_blocked(snapshot, cancel, mode).await,
            Commands::AutoComplete => {
                execute::execute_auto_complete(snapshot, &config, cancel, mode).await
            }
            Commands::AddDep(args) => {
                execute::execute_add_dep(snapshot, &self.snapshot, &config, args, cancel, mode)
                    .await
            }
        }
    }
}

/// Output format selected by `--json`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-readable text format
    Text,
    /// JSON format for programmatic use
    Json,
}

/// Read a JSON snapshot from disk.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a valid snapshot.
pub async fn load_snapshot(path: &Path) -> Result<Snapshot> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read snapshot {}", path.display()))?;
    let snapshot: Snapshot = serde_json::from_str(&content)
        .with_context(|| format!("invalid snapshot {}", path.display()))?;
    tracing::debug!(
        tasks = snapshot.tasks.len(),
        dependencies = snapshot.dependencies.len(),
        "Loaded snapshot"
    );
    Ok(snapshot)
}

/// Write a snapshot back to disk as pretty-printed JSON.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub async fn save_snapshot(path: &Path, snapshot: &Snapshot) -> Result<()> {
    let json = serde_json::to_string_pretty(snapshot)?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("failed to write snapshot {}", path.display()))
}

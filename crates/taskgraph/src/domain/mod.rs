//! Domain types for the task dependency engine.
//!
//! Tasks and dependency edges are owned by the persistence layer; the engine
//! only ever sees immutable copies of them, loaded as a [`Snapshot`] or read
//! through the collaborator traits in [`crate::storage`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Unique identifier for a task
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Create a new task ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the identifier is empty or whitespace only.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Unique identifier for a project
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub String);

impl ProjectId {
    /// Create a new project ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ProjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProjectId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A unit of work tracked by the dependency graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier for the task
    pub id: TaskId,

    /// Project the task belongs to
    pub project_id: ProjectId,

    /// Task title
    #[serde(default)]
    pub title: String,

    /// Current status
    pub status: TaskStatus,

    /// Priority level
    pub priority: TaskPriority,

    /// Verification confidence in [0, 1]
    #[serde(default)]
    pub verification_confidence: f64,

    /// Optimistic-concurrency counter, bumped on every write
    #[serde(default)]
    pub version: u64,
}

impl Task {
    /// Create a pending, medium-priority task with zero confidence.
    pub fn new(id: impl Into<TaskId>, project_id: impl Into<ProjectId>) -> Self {
        Self {
            id: id.into(),
            project_id: project_id.into(),
            title: String::new(),
            status: TaskStatus::Pending,
            priority: TaskPriority::Medium,
            verification_confidence: 0.0,
            version: 0,
        }
    }

    /// Builder-style priority override.
    #[must_use]
    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Builder-style status override.
    #[must_use]
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    /// Builder-style confidence override.
    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.verification_confidence = confidence;
        self
    }

    /// Returns `true` once the task has been completed.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

/// Status of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not started
    Pending,

    /// Currently being worked on
    InProgress,

    /// Waiting on an unfinished prerequisite
    Blocked,

    /// Done
    Completed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Blocked => "blocked",
            Self::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// Priority of a task, ordered from least to most urgent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    /// Can wait
    Low,

    /// Normal
    Medium,

    /// Should be scheduled soon
    High,

    /// Release-blocking
    Critical,
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Type of dependency relationship, in scheduling terms
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyType {
    /// The prerequisite must finish before the dependent starts
    #[default]
    FinishToStart,

    /// The prerequisite must start before the dependent starts
    StartToStart,

    /// The prerequisite must finish before the dependent finishes
    FinishToFinish,

    /// The prerequisite must start before the dependent finishes
    StartToFinish,
}

impl std::str::FromStr for DependencyType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "finish_to_start" => Ok(Self::FinishToStart),
            "start_to_start" => Ok(Self::StartToStart),
            "finish_to_finish" => Ok(Self::FinishToFinish),
            "start_to_finish" => Ok(Self::StartToFinish),
            other => Err(Error::Validation(format!(
                "unknown dependency type '{other}'"
            ))),
        }
    }
}

/// A directed "task depends on task" edge.
///
/// Edge direction is **dependent -> prerequisite**: `task_id` cannot proceed
/// until `depends_on_task_id` has.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDependency {
    /// Identifier of the dependency row
    pub id: String,

    /// The dependent task
    pub task_id: TaskId,

    /// The prerequisite task
    pub depends_on_task_id: TaskId,

    /// Kind of scheduling constraint
    #[serde(default)]
    pub dependency_type: DependencyType,

    /// Confidence that the dependency is real, in [0, 1]
    #[serde(default = "default_confidence")]
    pub confidence: f64,

    /// When the row was created
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_confidence() -> f64 {
    1.0
}

impl TaskDependency {
    /// Create an edge with a fresh identifier, default type and full confidence.
    pub fn new(task_id: impl Into<TaskId>, depends_on_task_id: impl Into<TaskId>) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            task_id: task_id.into(),
            depends_on_task_id: depends_on_task_id.into(),
            dependency_type: DependencyType::default(),
            confidence: 1.0,
            created_at: Utc::now(),
        }
    }

    /// Returns the edge as a `(dependent, prerequisite)` pair of string slices.
    #[must_use]
    pub fn endpoints(&self) -> (&str, &str) {
        (self.task_id.as_str(), self.depends_on_task_id.as_str())
    }
}

/// Request payload for adding a dependency to an existing task
#[derive(Debug, Clone, PartialEq)]
pub struct NewDependency {
    /// The prerequisite task
    pub depends_on_task_id: TaskId,

    /// Kind of scheduling constraint
    pub dependency_type: DependencyType,

    /// Confidence in [0, 1]
    pub confidence: f64,
}

impl NewDependency {
    /// A finish-to-start dependency with full confidence.
    pub fn on(depends_on_task_id: impl Into<TaskId>) -> Self {
        Self {
            depends_on_task_id: depends_on_task_id.into(),
            dependency_type: DependencyType::default(),
            confidence: 1.0,
        }
    }

    /// Validate the request before any graph work is done.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` if the target is blank or the confidence is
    /// outside `[0, 1]`.
    pub fn validate(&self) -> Result<()> {
        if self.depends_on_task_id.is_blank() {
            return Err(Error::Validation(
                "depends_on_task_id must not be empty".to_string(),
            ));
        }
        validate_confidence(self.confidence)
    }
}

/// Reject confidences outside the unit interval (NaN included).
///
/// # Errors
///
/// Returns `Error::Validation` when `value` is not within `[0, 1]`.
pub fn validate_confidence(value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "confidence must be within [0, 1], got {value}"
        )))
    }
}

/// A consistent point-in-time copy of a project's tasks and edges
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// All tasks in the snapshot
    #[serde(default)]
    pub tasks: Vec<Task>,

    /// All dependency edges in the snapshot
    #[serde(default)]
    pub dependencies: Vec<TaskDependency>,
}

//! Collaborator traits for the persistence layer.
//!
//! The engine never owns tasks or edges. It reads them through [`TaskStore`]
//! and [`DependencyStore`], and the only write it performs is
//! [`DependencyStore::insert`], issued by
//! [`DependencyService::add_dependency`](crate::service::DependencyService::add_dependency)
//! after the cycle guard has passed.
//!
//! Both traits are async and object-safe so a service can hold them as
//! `Arc<dyn TaskStore>` / `Arc<dyn DependencyStore>`. [`InMemoryStore`]
//! implements both and backs the CLI and the tests.

use crate::domain::{ProjectId, Task, TaskDependency, TaskId};
use crate::error::Result;
use async_trait::async_trait;

pub mod in_memory;

pub use in_memory::InMemoryStore;

/// Read access to tasks.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Look up a task by identifier. `Ok(None)` if it does not exist.
    async fn find_by_id(&self, id: &TaskId) -> Result<Option<Task>>;

    /// All tasks of a project, ordered by identifier.
    async fn find_by_project_id(&self, project_id: &ProjectId) -> Result<Vec<Task>>;
}

/// Read and insert access to dependency edges.
///
/// # Thread Safety
///
/// Implementations must tolerate concurrent calls, but they are not expected
/// to serialize a read followed by an insert; that is the service's job.
#[async_trait]
pub trait DependencyStore: Send + Sync {
    /// Edges where `task_id` is the dependent (its prerequisites).
    async fn find_dependencies(&self, task_id: &TaskId) -> Result<Vec<TaskDependency>>;

    /// Edges where `task_id` is the prerequisite (its dependents).
    async fn find_dependents(&self, task_id: &TaskId) -> Result<Vec<TaskDependency>>;

    /// Every edge with at least one endpoint in `project_id`.
    async fn find_by_project_id(&self, project_id: &ProjectId) -> Result<Vec<TaskDependency>>;

    /// Persist a new edge.
    async fn insert(&self, dependency: TaskDependency) -> Result<()>;
}

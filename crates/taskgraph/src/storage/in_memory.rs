//! In-memory storage backend.
//!
//! All data is held in RAM behind `Arc<tokio::sync::Mutex<..>>` and is lost
//! when the process exits. Clones share the same state, so one store can be
//! handed to a service as both its [`TaskStore`] and its [`DependencyStore`].

use super::{DependencyStore, TaskStore};
use crate::domain::{ProjectId, Snapshot, Task, TaskDependency, TaskId};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct Inner {
    /// Tasks indexed by ID, iterated in identifier order
    tasks: BTreeMap<TaskId, Task>,

    /// Edges in insertion order
    dependencies: Vec<TaskDependency>,
}

impl Inner {
    fn in_project(&self, id: &TaskId, project_id: &ProjectId) -> bool {
        self.tasks
            .get(id)
            .is_some_and(|t| &t.project_id == project_id)
    }
}

/// Thread-safe in-memory task and dependency store
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store preloaded with a snapshot.
    ///
    /// Edges are loaded as-is; no cycle check is applied to persisted data.
    #[must_use]
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let inner = Inner {
            tasks: snapshot
                .tasks
                .into_iter()
                .map(|t| (t.id.clone(), t))
                .collect(),
            dependencies: snapshot.dependencies,
        };
        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// Insert or replace a task.
    pub async fn put_task(&self, task: Task) {
        let mut inner = self.inner.lock().await;
        inner.tasks.insert(task.id.clone(), task);
    }

    /// Copy out everything currently stored.
    pub async fn snapshot(&self) -> Snapshot {
        let inner = self.inner.lock().await;
        Snapshot {
            tasks: inner.tasks.values().cloned().collect(),
            dependencies: inner.dependencies.clone(),
        }
    }

    /// Number of stored edges.
    pub async fn dependency_count(&self) -> usize {
        self.inner.lock().await.dependencies.len()
    }
}

#[async_trait]
impl TaskStore for InMemoryStore {
    async fn find_by_id(&self, id: &TaskId) -> Result<Option<Task>> {
        Ok(self.inner.lock().await.tasks.get(id).cloned())
    }

    async fn find_by_project_id(&self, project_id: &ProjectId) -> Result<Vec<Task>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .tasks
            .values()
            .filter(|t| &t.project_id == project_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl DependencyStore for InMemoryStore {
    async fn find_dependencies(&self, task_id: &TaskId) -> Result<Vec<TaskDependency>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .dependencies
            .iter()
            .filter(|d| &d.task_id == task_id)
            .cloned()
            .collect())
    }

    async fn find_dependents(&self, task_id: &TaskId) -> Result<Vec<TaskDependency>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .dependencies
            .iter()
            .filter(|d| &d.depends_on_task_id == task_id)
            .cloned()
            .collect())
    }

    async fn find_by_project_id(&self, project_id: &ProjectId) -> Result<Vec<TaskDependency>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .dependencies
            .iter()
            .filter(|d| {
                inner.in_project(&d.task_id, project_id)
                    || inner.in_project(&d.depends_on_task_id, project_id)
            })
            .cloned()
            .collect())
    }

    async fn insert(&self, dependency: TaskDependency) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.dependencies.iter().any(|d| d.id == dependency.id) {
            return Err(Error::Storage(format!(
                "dependency {} already exists",
                dependency.id
            )));
        }
        if let Some(task) = inner.tasks.get_mut(&dependency.task_id) {
            task.version += 1;
        }
        inner.dependencies.push(dependency);
        Ok(())
    }
}

//! Dependency service: the single writer of dependency edges.
//!
//! [`DependencyService::add_dependency`] runs validate, resolve, lock, read,
//! guard, insert and invalidate in that order. The lock set is the
//! dependent's project plus every project reachable from the prerequisite
//! through existing edges, taken in sorted order. Any cycle the new edge could
//! close runs through that set, so two concurrent requests that would together
//! close one (A -> B and B -> A, or a ring across several projects) always
//! share at least one lock and cannot both pass the guard.
//!
//! Read-side analyses (plan, batches, impact, blocking scan) are memoized in
//! a shared [`ResultCache`] under `"<project>:<scope>"` keys. They run under
//! the project lock, so an analysis can never cache a result computed from
//! edges that a concurrent insert has already invalidated.

use crate::automation::{scan_dependency_blocking, BlockedTask};
use crate::cache::{cache_key, project_prefix, ResultCache};
use crate::config::{CacheConfig, EngineConfig};
use crate::domain::{NewDependency, ProjectId, Task, TaskDependency, TaskId};
use crate::error::{Error, Result};
use crate::graph::{plan, plan_batches, Graph};
use crate::guard::DependencyGuard;
use crate::impact::{ChangeType, ImpactAnalysis, ImpactAnalyzer};
use crate::storage::{DependencyStore, TaskStore};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// A memoized per-project analysis
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CachedAnalysis {
    /// Topological order
    ExecutionPlan(Vec<String>),

    /// Parallel execution batches
    ExecutionBatches(Vec<Vec<String>>),

    /// Impact of one change on one task
    Impact(ImpactAnalysis),

    /// Dependency blocking scan
    BlockedTasks(Vec<BlockedTask>),
}

/// Orchestrates stores, guard, analyzer and cache
pub struct DependencyService {
    tasks: Arc<dyn TaskStore>,
    dependencies: Arc<dyn DependencyStore>,
    cache: Arc<ResultCache<CachedAnalysis>>,
    analyzer: ImpactAnalyzer,
    cleanup_interval: Duration,
    locks: DashMap<ProjectId, Arc<Mutex<()>>>,
}

impl DependencyService {
    /// Create a service over the given collaborators.
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        dependencies: Arc<dyn DependencyStore>,
        cache: Arc<ResultCache<CachedAnalysis>>,
        analyzer: ImpactAnalyzer,
    ) -> Self {
        Self {
            tasks,
            dependencies,
            cache,
            analyzer,
            cleanup_interval: CacheConfig::default().cleanup_interval(),
            locks: DashMap::new(),
        }
    }

    /// Create a service whose cache and analyzer follow `config`.
    pub fn from_config(
        tasks: Arc<dyn TaskStore>,
        dependencies: Arc<dyn DependencyStore>,
        config: &EngineConfig,
    ) -> Self {
        let mut service = Self::new(
            tasks,
            dependencies,
            Arc::new(ResultCache::from_config(&config.cache)),
            ImpactAnalyzer::new(config.risk.clone()),
        );
        service.cleanup_interval = config.cache.cleanup_interval();
        service
    }

    /// The shared analysis cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<ResultCache<CachedAnalysis>> {
        &self.cache
    }

    /// Purge expired cache entries every `cache.cleanup-interval-secs` until
    /// `cancel` fires.
    pub fn spawn_cache_cleanup(&self, cancel: CancellationToken) -> JoinHandle<()> {
        debug!(interval = ?self.cleanup_interval, "Starting cache cleanup");
        self.cache.spawn_cleanup(self.cleanup_interval, cancel)
    }

    fn project_lock(&self, project_id: &ProjectId) -> Arc<Mutex<()>> {
        Arc::clone(self.locks.entry(project_id.clone()).or_default().value())
    }

    /// Lock every project in `projects`, in sorted order.
    async fn lock_projects(&self, projects: &BTreeSet<ProjectId>) -> Vec<OwnedMutexGuard<()>> {
        let mut guards = Vec::with_capacity(projects.len());
        for project_id in projects {
            guards.push(self.project_lock(project_id).lock_owned().await);
        }
        guards
    }

    async fn resolve(&self, id: &TaskId) -> Result<Option<Task>> {
        if id.is_blank() {
            return Err(Error::Validation("task id must not be empty".to_string()));
        }
        self.tasks.find_by_id(id).await
    }

    /// Projects of `start` and of every task it transitively depends on.
    ///
    /// Prerequisites unknown to the task store are walked through but
    /// contribute no project.
    async fn upstream_projects(&self, start: &Task) -> Result<BTreeSet<ProjectId>> {
        let mut projects = BTreeSet::from([start.project_id.clone()]);
        let mut visited = HashSet::from([start.id.clone()]);
        let mut queue = VecDeque::from([start.id.clone()]);

        while let Some(current) = queue.pop_front() {
            for edge in self.dependencies.find_dependencies(&current).await? {
                let next = edge.depends_on_task_id;
                if !visited.insert(next.clone()) {
                    continue;
                }
                if let Some(task) = self.tasks.find_by_id(&next).await? {
                    projects.insert(task.project_id);
                }
                queue.push_back(next);
            }
        }
        Ok(projects)
    }

    /// Add the edge "`task_id` depends on `request.depends_on_task_id`".
    ///
    /// On any error nothing is written and no cache entry is touched.
    ///
    /// # Errors
    ///
    /// - `Error::Validation` for blank identifiers or an out-of-range confidence
    /// - `Error::TaskNotFound` / `Error::DependsOnTaskNotFound` if either task is unknown
    /// - `Error::WouldCreateCycle` if the edge would close a cycle
    /// - `Error::Storage` if the store rejects the insert
    pub async fn add_dependency(
        &self,
        task_id: &TaskId,
        request: NewDependency,
    ) -> Result<TaskDependency> {
        request.validate()?;
        let task = self
            .resolve(task_id)
            .await?
            .ok_or_else(|| Error::TaskNotFound(task_id.clone()))?;
        let prerequisite = self
            .resolve(&request.depends_on_task_id)
            .await?
            .ok_or_else(|| Error::DependsOnTaskNotFound(request.depends_on_task_id.clone()))?;

        // The upstream walk can grow between the unlocked read and the
        // locked one; retry with the larger set until it is stable.
        let mut projects = self.upstream_projects(&prerequisite).await?;
        projects.insert(task.project_id.clone());
        let _guards = loop {
            let guards = self.lock_projects(&projects).await;
            let mut current = self.upstream_projects(&prerequisite).await?;
            current.insert(task.project_id.clone());
            if current.is_subset(&projects) {
                break guards;
            }
            drop(guards);
            debug!(task_id = %task.id, "Upstream projects changed, relocking");
            projects.extend(current);
        };

        let mut existing = Vec::new();
        let mut seen = HashSet::new();
        for project_id in &projects {
            for edge in self.dependencies.find_by_project_id(project_id).await? {
                if seen.insert(edge.id.clone()) {
                    existing.push(edge);
                }
            }
        }

        let mut candidate = TaskDependency::new(task.id.clone(), prerequisite.id.clone());
        candidate.dependency_type = request.dependency_type;
        candidate.confidence = request.confidence;
        DependencyGuard::try_add_edge(&existing, &candidate)?;

        self.dependencies.insert(candidate.clone()).await?;
        // Every project upstream of the new edge gains dependents, so its
        // impact analyses are stale too.
        for project_id in &projects {
            self.cache.invalidate_prefix(&project_prefix(project_id));
        }

        info!(
            task_id = %candidate.task_id,
            depends_on = %candidate.depends_on_task_id,
            dependency_type = ?candidate.dependency_type,
            "Added dependency"
        );
        Ok(candidate)
    }

    async fn project_snapshot(
        &self,
        project_id: &ProjectId,
    ) -> Result<(Vec<Task>, Vec<TaskDependency>)> {
        let tasks = self.tasks.find_by_project_id(project_id).await?;
        let edges = self.dependencies.find_by_project_id(project_id).await?;
        Ok((tasks, edges))
    }

    /// `subject` plus every task that transitively depends on it, in any
    /// project, and the edges between them.
    async fn downstream_snapshot(&self, subject: Task) -> Result<(Vec<Task>, Vec<TaskDependency>)> {
        let mut queue = VecDeque::from([subject.id.clone()]);
        let mut tasks = BTreeMap::from([(subject.id.clone(), subject)]);
        let mut visited: HashSet<TaskId> = tasks.keys().cloned().collect();
        let mut edges = Vec::new();

        while let Some(current) = queue.pop_front() {
            for edge in self.dependencies.find_dependents(&current).await? {
                let dependent = edge.task_id.clone();
                edges.push(edge);
                if !visited.insert(dependent.clone()) {
                    continue;
                }
                if let Some(task) = self.tasks.find_by_id(&dependent).await? {
                    tasks.insert(dependent.clone(), task);
                }
                queue.push_back(dependent);
            }
        }
        Ok((tasks.into_values().collect(), edges))
    }

    /// Run `compute` under the project lock, memoized under `scope`.
    async fn cached<F, Fut>(
        &self,
        project_id: &ProjectId,
        scope: &str,
        compute: F,
    ) -> Result<CachedAnalysis>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CachedAnalysis>>,
    {
        let key = cache_key(project_id, scope);
        if let Some(hit) = self.cache.get(&key) {
            debug!(project_id = %project_id, scope, "Serving cached analysis");
            return Ok(hit);
        }

        let _guard = self.project_lock(project_id).lock_owned().await;
        let value = compute().await?;
        self.cache.set_default(key, value.clone());
        Ok(value)
    }

    /// Topological order of a project's tasks.
    ///
    /// # Errors
    ///
    /// Returns `Error::CyclicGraph` if the stored edges contain a cycle.
    pub async fn execution_plan(&self, project_id: &ProjectId) -> Result<Vec<String>> {
        let value = self
            .cached(project_id, "plan", move || async move {
                let (tasks, edges) = self.project_snapshot(project_id).await?;
                plan(&Graph::from_dependencies(&tasks, &edges)).map(CachedAnalysis::ExecutionPlan)
            })
            .await?;
        match value {
            CachedAnalysis::ExecutionPlan(order) => Ok(order),
            other => Err(unexpected_entry("plan", &other)),
        }
    }

    /// Parallel execution batches of a project's tasks.
    ///
    /// # Errors
    ///
    /// Returns `Error::CyclicGraph` if the stored edges contain a cycle.
    pub async fn execution_batches(&self, project_id: &ProjectId) -> Result<Vec<Vec<String>>> {
        let value = self
            .cached(project_id, "batches", move || async move {
                let (tasks, edges) = self.project_snapshot(project_id).await?;
                plan_batches(&Graph::from_dependencies(&tasks, &edges))
                    .map(CachedAnalysis::ExecutionBatches)
            })
            .await?;
        match value {
            CachedAnalysis::ExecutionBatches(batches) => Ok(batches),
            other => Err(unexpected_entry("batches", &other)),
        }
    }

    /// Impact of `change_type` on `task_id`.
    ///
    /// The blast radius follows dependents into other projects. The result is
    /// cached under the subject's project: any new edge below the subject
    /// locks and invalidates that project, since the subject is upstream of it.
    ///
    /// # Errors
    ///
    /// Returns `Error::TaskNotFound` if the task is unknown.
    pub async fn impact(
        &self,
        task_id: &TaskId,
        change_type: ChangeType,
    ) -> Result<ImpactAnalysis> {
        let task = self
            .resolve(task_id)
            .await?
            .ok_or_else(|| Error::TaskNotFound(task_id.clone()))?;
        let project_id = task.project_id.clone();
        let scope = format!("impact/{task_id}/{change_type}");
        let value = self
            .cached(&project_id, &scope, move || async move {
                let (tasks, edges) = self.downstream_snapshot(task).await?;
                self.analyzer
                    .analyze_impact(task_id, change_type, &tasks, &edges)
                    .map(CachedAnalysis::Impact)
            })
            .await?;
        match value {
            CachedAnalysis::Impact(analysis) => Ok(analysis),
            other => Err(unexpected_entry(&scope, &other)),
        }
    }

    /// Tasks of a project blocked by unfinished prerequisites.
    ///
    /// # Errors
    ///
    /// Returns `Error::Cancelled` if `cancel` fires during the scan; nothing
    /// is cached in that case.
    pub async fn blocked_tasks(
        &self,
        project_id: &ProjectId,
        cancel: &CancellationToken,
    ) -> Result<Vec<BlockedTask>> {
        let value = self
            .cached(project_id, "blocked", move || async move {
                let (tasks, edges) = self.project_snapshot(project_id).await?;
                scan_dependency_blocking(&tasks, &edges, cancel).map(CachedAnalysis::BlockedTasks)
            })
            .await?;
        match value {
            CachedAnalysis::BlockedTasks(blocked) => Ok(blocked),
            other => Err(unexpected_entry("blocked", &other)),
        }
    }
}

fn unexpected_entry(scope: &str, found: &CachedAnalysis) -> Error {
    Error::Storage(format!("cache entry for '{scope}' holds {found:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Snapshot, TaskPriority, TaskStatus};
    use crate::impact::RiskLevel;
    use crate::storage::InMemoryStore;

    fn service_over(store: &InMemoryStore) -> DependencyService {
        DependencyService::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(ResultCache::default()),
            ImpactAnalyzer::default(),
        )
    }

    fn abc_store() -> InMemoryStore {
        InMemoryStore::from_snapshot(Snapshot {
            tasks: vec![
                Task::new("A", "p1"),
                Task::new("B", "p1"),
                Task::new("C", "p1"),
            ],
            dependencies: Vec::new(),
        })
    }

    #[tokio::test]
    async fn test_add_dependency_persists_edge() {
        let store = abc_store();
        let service = service_over(&store);

        let edge = service
            .add_dependency(&TaskId::new("B"), NewDependency::on("A"))
            .await
            .unwrap();

        assert_eq!(edge.endpoints(), ("B", "A"));
        assert_eq!(store.dependency_count().await, 1);
    }

    #[tokio::test]
    async fn test_rejected_edge_leaves_store_unchanged() {
        let store = abc_store();
        let service = service_over(&store);
        service
            .add_dependency(&TaskId::new("B"), NewDependency::on("A"))
            .await
            .unwrap();
        service
            .add_dependency(&TaskId::new("C"), NewDependency::on("B"))
            .await
            .unwrap();
        let before = store.snapshot().await;

        let err = service
            .add_dependency(&TaskId::new("A"), NewDependency::on("C"))
            .await
            .unwrap_err();

        assert!(err.is_would_create_cycle());
        assert_eq!(store.snapshot().await, before);
    }

    #[tokio::test]
    async fn test_unknown_endpoints_are_distinguished() {
        let service = service_over(&abc_store());

        let err = service
            .add_dependency(&TaskId::new("ghost"), NewDependency::on("A"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TaskNotFound(_)));

        let err = service
            .add_dependency(&TaskId::new("A"), NewDependency::on("ghost"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DependsOnTaskNotFound(_)));
    }

    #[tokio::test]
    async fn test_invalid_confidence_rejected_before_lookup() {
        let service = service_over(&abc_store());
        let request = NewDependency {
            confidence: 1.5,
            ..NewDependency::on("A")
        };

        let err = service
            .add_dependency(&TaskId::new("ghost"), request)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_add_dependency_invalidates_project_cache() {
        let store = abc_store();
        let service = service_over(&store);

        let first = service.execution_plan(&ProjectId::new("p1")).await.unwrap();
        assert_eq!(first, vec!["A", "B", "C"]);
        assert_eq!(service.cache().len(), 1);

        // A now waits on C
        service
            .add_dependency(&TaskId::new("A"), NewDependency::on("C"))
            .await
            .unwrap();
        assert!(service.cache().is_empty());

        let second = service.execution_plan(&ProjectId::new("p1")).await.unwrap();
        assert_eq!(second, vec!["B", "C", "A"]);
    }

    #[tokio::test]
    async fn test_cached_impact_is_reused() {
        let store = abc_store();
        let service = service_over(&store);
        service
            .add_dependency(&TaskId::new("B"), NewDependency::on("A"))
            .await
            .unwrap();

        let first = service.impact(&TaskId::new("A"), ChangeType::Modify).await.unwrap();
        let second = service.impact(&TaskId::new("A"), ChangeType::Modify).await.unwrap();

        assert_eq!(first.id(), second.id());
        assert_eq!(first.affected_tasks(), &[TaskId::new("B")]);
        assert_eq!(first.risk_level(), RiskLevel::Low);
    }

    #[tokio::test]
    async fn test_blocked_tasks_through_service() {
        let store = abc_store();
        store
            .put_task(
                Task::new("D", "p1")
                    .with_priority(TaskPriority::High)
                    .with_status(TaskStatus::Completed),
            )
            .await;
        let service = service_over(&store);
        service
            .add_dependency(&TaskId::new("B"), NewDependency::on("A"))
            .await
            .unwrap();
        service
            .add_dependency(&TaskId::new("C"), NewDependency::on("D"))
            .await
            .unwrap();

        let blocked = service
            .blocked_tasks(&ProjectId::new("p1"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(blocked.len(), 1);
        assert_eq!(blocked[0].task_id.as_str(), "B");
    }

    #[tokio::test]
    async fn test_cancelled_scan_is_not_cached() {
        let service = service_over(&abc_store());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = service
            .blocked_tasks(&ProjectId::new("p1"), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled { .. }));
        assert!(service.cache().is_empty());
    }

    #[tokio::test]
    async fn test_cross_project_edge_invalidates_both_projects() {
        let store = abc_store();
        store.put_task(Task::new("X", "p2")).await;
        let service = service_over(&store);
        service.execution_plan(&ProjectId::new("p1")).await.unwrap();
        service.execution_plan(&ProjectId::new("p2")).await.unwrap();

        service
            .add_dependency(&TaskId::new("X"), NewDependency::on("A"))
            .await
            .unwrap();

        assert!(service.cache().is_empty());
    }

    #[tokio::test]
    async fn test_edge_below_subject_in_other_project_refreshes_impact() {
        let store = abc_store();
        store.put_task(Task::new("X", "p2")).await;
        store.put_task(Task::new("Y", "p3")).await;
        let service = service_over(&store);
        service
            .add_dependency(&TaskId::new("X"), NewDependency::on("A"))
            .await
            .unwrap();

        let first = service.impact(&TaskId::new("A"), ChangeType::Modify).await.unwrap();
        assert_eq!(first.affected_tasks(), &[TaskId::new("X")]);

        // Y lives in a third project but sits below A through X.
        service
            .add_dependency(&TaskId::new("Y"), NewDependency::on("X"))
            .await
            .unwrap();

        let second = service.impact(&TaskId::new("A"), ChangeType::Modify).await.unwrap();
        assert_eq!(second.affected_tasks(), &[TaskId::new("X"), TaskId::new("Y")]);
    }

    #[tokio::test]
    async fn test_configured_cache_cleanup_purges_until_cancelled() {
        let store = abc_store();
        let config = EngineConfig::from_yaml("cache:\n  cleanup-interval-secs: 1\n").unwrap();
        let service =
            DependencyService::from_config(Arc::new(store.clone()), Arc::new(store), &config);
        service.cache().set(
            "p1:plan",
            CachedAnalysis::ExecutionPlan(Vec::new()),
            Duration::from_millis(5),
        );
        let cancel = CancellationToken::new();

        let handle = service.spawn_cache_cleanup(cancel.clone());
        tokio::time::sleep(Duration::from_millis(1300)).await;
        assert!(service.cache().is_empty());

        cancel.cancel();
        handle.await.unwrap();
    }
}

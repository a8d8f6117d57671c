//! Project-wide scans: dependency blocking and auto-completion.
//!
//! Scans visit tasks in identifier order and check their cancellation token
//! before each task. A cancelled scan returns `Error::Cancelled` carrying the
//! number of tasks already processed; it never returns partial results.

use crate::config::AutoCompletionConfig;
use crate::domain::{Task, TaskDependency, TaskId, TaskPriority, TaskStatus};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// A task that cannot proceed because a prerequisite is unfinished
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedTask {
    /// The blocked task
    pub task_id: TaskId,

    /// Unfinished prerequisites, sorted
    pub blocked_by: Vec<TaskId>,
}

/// What auto-completion would do to one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CompletionDecision {
    /// Confidence is high enough to complete the task
    Complete {
        /// Target task
        task_id: TaskId,
        /// Its verification confidence
        confidence: f64,
    },

    /// High confidence, but the task is critical and needs a human
    AwaitApproval {
        /// Target task
        task_id: TaskId,
        /// Its verification confidence
        confidence: f64,
    },

    /// Medium confidence: work has evidently started
    MarkInProgress {
        /// Target task
        task_id: TaskId,
        /// Its verification confidence
        confidence: f64,
    },
}

impl CompletionDecision {
    /// The task the decision applies to.
    #[must_use]
    pub fn task_id(&self) -> &TaskId {
        match self {
            Self::Complete { task_id, .. }
            | Self::AwaitApproval { task_id, .. }
            | Self::MarkInProgress { task_id, .. } => task_id,
        }
    }

    /// Status the task moves to, or `None` while approval is pending.
    #[must_use]
    pub fn target_status(&self) -> Option<TaskStatus> {
        match self {
            Self::Complete { .. } => Some(TaskStatus::Completed),
            Self::MarkInProgress { .. } => Some(TaskStatus::InProgress),
            Self::AwaitApproval { .. } => None,
        }
    }
}

fn sorted_by_id(tasks: &[Task]) -> Vec<&Task> {
    let mut sorted: Vec<&Task> = tasks.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));
    sorted
}

fn check_cancelled(cancel: &CancellationToken, processed: usize, scan: &'static str) -> Result<()> {
    if cancel.is_cancelled() {
        info!(scan, processed, "Scan cancelled");
        return Err(Error::Cancelled { processed });
    }
    Ok(())
}

/// Find every unfinished task with at least one unfinished prerequisite.
///
/// Prerequisites missing from `tasks` are ignored.
///
/// # Errors
///
/// Returns `Error::Cancelled` if `cancel` fires before the scan finishes.
pub fn scan_dependency_blocking(
    tasks: &[Task],
    edges: &[TaskDependency],
    cancel: &CancellationToken,
) -> Result<Vec<BlockedTask>> {
    let status: HashMap<&TaskId, TaskStatus> = tasks.iter().map(|t| (&t.id, t.status)).collect();
    let mut prerequisites: HashMap<&TaskId, BTreeSet<&TaskId>> = HashMap::new();
    for edge in edges {
        prerequisites
            .entry(&edge.task_id)
            .or_default()
            .insert(&edge.depends_on_task_id);
    }

    let mut blocked = Vec::new();
    for (processed, task) in sorted_by_id(tasks).into_iter().enumerate() {
        check_cancelled(cancel, processed, "dependency_blocking")?;
        if task.is_completed() {
            continue;
        }
        let Some(prereqs) = prerequisites.get(&task.id) else {
            continue;
        };
        let blocked_by: Vec<TaskId> = prereqs
            .iter()
            .filter(|id| status.get(*id).is_some_and(|s| *s != TaskStatus::Completed))
            .map(|id| (*id).clone())
            .collect();
        if !blocked_by.is_empty() {
            blocked.push(BlockedTask {
                task_id: task.id.clone(),
                blocked_by,
            });
        }
    }

    debug!(tasks = tasks.len(), blocked = blocked.len(), "Blocking scan finished");
    Ok(blocked)
}

/// Decide which tasks can be completed or started based on their confidence.
///
/// Completed tasks and tasks with zero confidence are skipped, and a
/// decision is only emitted when it would change something.
///
/// # Errors
///
/// Returns `Error::Cancelled` if `cancel` fires before the scan finishes.
pub fn plan_auto_completion(
    tasks: &[Task],
    config: &AutoCompletionConfig,
    cancel: &CancellationToken,
) -> Result<Vec<CompletionDecision>> {
    let mut decisions = Vec::new();
    for (processed, task) in sorted_by_id(tasks).into_iter().enumerate() {
        check_cancelled(cancel, processed, "auto_completion")?;
        let confidence = task.verification_confidence;
        if task.is_completed() || confidence <= 0.0 {
            continue;
        }

        let task_id = task.id.clone();
        if confidence >= config.high_confidence_threshold {
            if task.priority == TaskPriority::Critical
                && config.require_human_approval_for_critical
            {
                decisions.push(CompletionDecision::AwaitApproval { task_id, confidence });
            } else {
                decisions.push(CompletionDecision::Complete { task_id, confidence });
            }
        } else if confidence >= config.medium_confidence_threshold
            && task.status != TaskStatus::InProgress
        {
            decisions.push(CompletionDecision::MarkInProgress { task_id, confidence });
        }
    }

    debug!(tasks = tasks.len(), decisions = decisions.len(), "Auto-completion scan finished");
    Ok(decisions)
}

/// Critical tasks that are not yet completed, sorted by identifier.
#[must_use]
pub fn incomplete_critical_tasks(tasks: &[Task]) -> Vec<&Task> {
    sorted_by_id(tasks)
        .into_iter()
        .filter(|t| t.priority == TaskPriority::Critical && !t.is_completed())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn dep(task: &str, on: &str) -> TaskDependency {
        TaskDependency::new(task, on)
    }

    #[test]
    fn test_blocked_by_unfinished_prerequisite() {
        let tasks = vec![
            Task::new("A", "p1"),
            Task::new("B", "p1"),
            Task::new("C", "p1").with_status(TaskStatus::Completed),
            Task::new("D", "p1"),
        ];
        // B waits on A (pending); D waits on C (done)
        let edges = vec![dep("B", "A"), dep("D", "C")];

        let blocked = scan_dependency_blocking(&tasks, &edges, &CancellationToken::new()).unwrap();
        assert_eq!(
            blocked,
            vec![BlockedTask {
                task_id: TaskId::new("B"),
                blocked_by: vec![TaskId::new("A")],
            }]
        );
    }

    #[test]
    fn test_completed_task_is_never_blocked() {
        let tasks = vec![
            Task::new("A", "p1"),
            Task::new("B", "p1").with_status(TaskStatus::Completed),
        ];
        let blocked =
            scan_dependency_blocking(&tasks, &[dep("B", "A")], &CancellationToken::new()).unwrap();
        assert!(blocked.is_empty());
    }

    #[test]
    fn test_cancelled_scan_reports_progress() {
        let tasks = vec![Task::new("A", "p1"), Task::new("B", "p1")];
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = scan_dependency_blocking(&tasks, &[], &cancel).unwrap_err();
        assert!(matches!(err, Error::Cancelled { processed: 0 }));

        let err =
            plan_auto_completion(&tasks, &AutoCompletionConfig::default(), &cancel).unwrap_err();
        assert!(matches!(err, Error::Cancelled { .. }));
    }

    #[rstest]
    #[case::high(0.9, TaskPriority::Medium, TaskStatus::Pending, Some(Some(TaskStatus::Completed)))]
    #[case::critical_needs_human(0.9, TaskPriority::Critical, TaskStatus::Pending, Some(None))]
    #[case::medium(0.6, TaskPriority::Low, TaskStatus::Pending, Some(Some(TaskStatus::InProgress)))]
    #[case::medium_already_started(0.6, TaskPriority::Low, TaskStatus::InProgress, None)]
    #[case::low(0.3, TaskPriority::High, TaskStatus::Pending, None)]
    #[case::zero(0.0, TaskPriority::High, TaskStatus::Pending, None)]
    #[case::already_done(1.0, TaskPriority::High, TaskStatus::Completed, None)]
    fn test_auto_completion_decision(
        #[case] confidence: f64,
        #[case] priority: TaskPriority,
        #[case] status: TaskStatus,
        #[case] expected: Option<Option<TaskStatus>>,
    ) {
        let tasks = vec![Task::new("T", "p1")
            .with_confidence(confidence)
            .with_priority(priority)
            .with_status(status)];

        let cancel = CancellationToken::new();
        let decisions =
            plan_auto_completion(&tasks, &AutoCompletionConfig::default(), &cancel).unwrap();
        assert_eq!(decisions.first().map(CompletionDecision::target_status), expected);
    }

    #[test]
    fn test_approval_requirement_can_be_disabled() {
        let config = AutoCompletionConfig {
            require_human_approval_for_critical: false,
            ..AutoCompletionConfig::default()
        };
        let tasks = vec![Task::new("T", "p1")
            .with_confidence(0.95)
            .with_priority(TaskPriority::Critical)];

        let decisions = plan_auto_completion(&tasks, &config, &CancellationToken::new()).unwrap();
        assert!(matches!(decisions[0], CompletionDecision::Complete { .. }));
    }

    #[test]
    fn test_incomplete_critical_tasks() {
        let tasks = vec![
            Task::new("z", "p1").with_priority(TaskPriority::Critical),
            Task::new("a", "p1").with_priority(TaskPriority::Critical),
            Task::new("done", "p1")
                .with_priority(TaskPriority::Critical)
                .with_status(TaskStatus::Completed),
            Task::new("m", "p1").with_priority(TaskPriority::High),
        ];

        let ids: Vec<&str> = incomplete_critical_tasks(&tasks)
            .iter()
            .map(|t| t.id.as_str())
            .collect();
        assert_eq!(ids, vec!["a", "z"]);
    }
}

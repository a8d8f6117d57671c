//! Change-impact analysis.
//!
//! Given a subject task and a snapshot, the analyzer walks the graph in
//! reverse (prerequisite -> dependents) to find every task that directly or
//! transitively depends on the subject: the blast radius. A risk tier is then
//! derived from the radius and the priorities involved.
//!
//! # Risk Scoring
//!
//! With an empty blast radius the tier is always [`RiskLevel::Low`].
//! Otherwise a score is accumulated in this order:
//!
//! 1. `affected_weight` per affected task
//! 2. `high_priority_weight` per high-priority affected task
//! 3. `critical_priority_weight` per critical affected task
//! 4. `(0.5 - subject confidence) * confidence_weight`
//!
//! and clamped to `[0, 1]` according to [`ClampPolicy`]. The score maps to a
//! base tier (Low, Medium or High) through the configured thresholds, and a
//! critical-priority subject raises the base tier by one level.

use crate::config::{ClampPolicy, RiskConfig};
use crate::domain::{Task, TaskDependency, TaskId, TaskPriority};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::str::FromStr;

/// What kind of change is being proposed for the subject task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// Scope or content of the task changes
    #[default]
    Modify,

    /// The task is removed
    Remove,

    /// The task's schedule moves
    Reschedule,

    /// The task's priority changes
    Reprioritize,

    /// The task's status changes
    StatusChange,
}

impl FromStr for ChangeType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "modify" => Ok(Self::Modify),
            "remove" => Ok(Self::Remove),
            "reschedule" => Ok(Self::Reschedule),
            "reprioritize" => Ok(Self::Reprioritize),
            "status_change" => Ok(Self::StatusChange),
            other => Err(Error::Validation(format!("unknown change type '{other}'"))),
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Modify => "modify",
            Self::Remove => "remove",
            Self::Reschedule => "reschedule",
            Self::Reprioritize => "reprioritize",
            Self::StatusChange => "status_change",
        };
        f.write_str(s)
    }
}

/// Coarse, ordered severity of a proposed change
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Nothing or little depends on the subject
    Low,

    /// Several dependents
    Medium,

    /// Large or high-priority blast radius
    High,

    /// High risk on a critical subject
    Critical,
}

impl RiskLevel {
    /// The next tier up, saturating at `Critical`.
    #[must_use]
    pub fn escalate(self) -> Self {
        match self {
            Self::Low => Self::Medium,
            Self::Medium => Self::High,
            Self::High | Self::Critical => Self::Critical,
        }
    }
}

impl fmt::Display for RiskLevel {
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

/// Why an analysis landed in its tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RiskFactor {
    /// Tasks depend on the subject, directly or transitively
    DependentTasks {
        /// Size of the blast radius
        count: usize,
    },

    /// Some affected tasks are high priority
    HighPriorityDependents {
        /// Number of high-priority affected tasks
        count: usize,
    },

    /// Some affected tasks are critical
    CriticalDependents {
        /// Number of critical affected tasks
        count: usize,
    },

    /// The change cascades beyond direct dependents
    TransitiveCascade {
        /// Longest dependency distance from the subject
        max_depth: usize,
    },

    /// The subject's own verification confidence is low
    LowSubjectConfidence {
        /// The subject's confidence
        confidence: f64,
    },

    /// The subject itself is critical, escalating the tier
    CriticalSubject,
}

/// One task inside the blast radius
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffectedTask {
    /// The affected task
    pub task_id: TaskId,

    /// Dependency distance from the subject (1 = direct dependent)
    pub depth: usize,

    /// Priority, if the task is present in the snapshot
    pub priority: Option<TaskPriority>,
}

/// Result of a change-impact analysis. Immutable once returned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImpactAnalysis {
    id: String,
    task_id: TaskId,
    change_type: ChangeType,
    affected_tasks: Vec<TaskId>,
    affected: Vec<AffectedTask>,
    risk_level: RiskLevel,
    risk_score: f64,
    risk_factors: Vec<RiskFactor>,
    mitigations: Vec<String>,
    confidence: f64,
    analyzed_at: DateTime<Utc>,
}

impl ImpactAnalysis {
    /// Generated analysis identifier
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The subject task
    #[must_use]
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// The analyzed change
    #[must_use]
    pub fn change_type(&self) -> ChangeType {
        self.change_type
    }

    /// Affected task identifiers, ordered by depth then identifier
    #[must_use]
    pub fn affected_tasks(&self) -> &[TaskId] {
        &self.affected_tasks
    }

    /// Affected tasks with depth and priority, same order as
    /// [`affected_tasks`](Self::affected_tasks)
    #[must_use]
    pub fn affected(&self) -> &[AffectedTask] {
        &self.affected
    }

    /// Risk tier
    #[must_use]
    pub fn risk_level(&self) -> RiskLevel {
        self.risk_level
    }

    /// Clamped score the base tier was derived from
    #[must_use]
    pub fn risk_score(&self) -> f64 {
        self.risk_score
    }

    /// Factors that contributed to the tier
    #[must_use]
    pub fn risk_factors(&self) -> &[RiskFactor] {
        &self.risk_factors
    }

    /// Suggested mitigations
    #[must_use]
    pub fn mitigations(&self) -> &[String] {
        &self.mitigations
    }

    /// Mean confidence of the dependency edges traversed (1.0 when none)
    #[must_use]
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// When the analysis ran
    #[must_use]
    pub fn analyzed_at(&self) -> DateTime<Utc> {
        self.analyzed_at
    }
}

/// Running score with a configurable clamping order.
struct ScoreAccumulator {
    policy: ClampPolicy,
    total: f64,
}

impl ScoreAccumulator {
    fn new(policy: ClampPolicy) -> Self {
        Self { policy, total: 0.0 }
    }

    fn add(&mut self, delta: f64) {
        self.total += delta;
        if self.policy == ClampPolicy::PerStep {
            self.total = self.total.clamp(0.0, 1.0);
        }
    }

    fn finish(self) -> f64 {
        self.total.clamp(0.0, 1.0)
    }
}

/// Computes blast radius and risk for proposed task changes
#[derive(Debug, Clone, Default)]
pub struct ImpactAnalyzer {
    config: RiskConfig,
}

impl ImpactAnalyzer {
    /// Create an analyzer with the given scoring configuration.
    #[must_use]
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    /// Scoring configuration in use.
    #[must_use]
    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Analyze the impact of `change_type` on `subject`.
    ///
    /// The traversal keeps a visited set, so it terminates even if `edges`
    /// contain a cycle.
    ///
    /// # Errors
    ///
    /// - `Error::Validation` if `subject` is blank
    /// - `Error::TaskNotFound` if `subject` is not in `tasks`
    pub fn analyze_impact(
        &self,
        subject: &TaskId,
        change_type: ChangeType,
        tasks: &[Task],
        edges: &[TaskDependency],
    ) -> Result<ImpactAnalysis> {
        if subject.is_blank() {
            return Err(Error::Validation("task id must not be empty".into()));
        }
        let by_id: HashMap<&str, &Task> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();
        let subject_task = by_id
            .get(subject.as_str())
            .copied()
            .ok_or_else(|| Error::TaskNotFound(subject.clone()))?;

        // prerequisite -> (dependent -> strongest edge confidence)
        let mut reverse: HashMap<&str, BTreeMap<&str, f64>> = HashMap::new();
        for edge in edges {
            let slot = reverse
                .entry(edge.depends_on_task_id.as_str())
                .or_default()
                .entry(edge.task_id.as_str())
                .or_insert(edge.confidence);
            *slot = slot.max(edge.confidence);
        }

        let mut visited: HashSet<&str> = HashSet::from([subject.as_str()]);
        let mut queue: VecDeque<(&str, usize)> = VecDeque::from([(subject.as_str(), 0)]);
        let mut affected = Vec::new();
        let mut confidence_sum = 0.0;
        let mut edges_traversed = 0usize;

        while let Some((current, depth)) = queue.pop_front() {
            let Some(dependents) = reverse.get(current) else {
                continue;
            };
            for (&dependent, &confidence) in dependents {
                if visited.insert(dependent) {
                    confidence_sum += confidence;
                    edges_traversed += 1;
                    affected.push(AffectedTask {
                        task_id: TaskId::new(dependent),
                        depth: depth + 1,
                        priority: by_id.get(dependent).map(|t| t.priority),
                    });
                    queue.push_back((dependent, depth + 1));
                }
            }
        }
        affected.sort_by(|a, b| a.depth.cmp(&b.depth).then_with(|| a.task_id.cmp(&b.task_id)));

        let (risk_level, risk_score, risk_factors) = self.assess(subject_task, &affected);
        let mitigations = suggest_mitigations(change_type, risk_level, &affected);
        #[allow(clippy::cast_precision_loss)]
        let confidence = if edges_traversed == 0 {
            1.0
        } else {
            confidence_sum / edges_traversed as f64
        };

        tracing::debug!(
            task_id = %subject,
            change_type = %change_type,
            affected = affected.len(),
            risk = %risk_level,
            "Impact analysis complete"
        );

        Ok(ImpactAnalysis {
            id: uuid::Uuid::now_v7().to_string(),
            task_id: subject.clone(),
            change_type,
            affected_tasks: affected.iter().map(|a| a.task_id.clone()).collect(),
            affected,
            risk_level,
            risk_score,
            risk_factors,
            mitigations,
            confidence,
            analyzed_at: Utc::now(),
        })
    }

    fn assess(
        &self,
        subject: &Task,
        affected: &[AffectedTask],
    ) -> (RiskLevel, f64, Vec<RiskFactor>) {
        if affected.is_empty() {
            return (RiskLevel::Low, 0.0, Vec::new());
        }
        let cfg = &self.config;
        let high = affected
            .iter()
            .filter(|a| a.priority == Some(TaskPriority::High))
            .count();
        let critical = affected
            .iter()
            .filter(|a| a.priority == Some(TaskPriority::Critical))
            .count();

        let mut score = ScoreAccumulator::new(cfg.clamp_policy);
        for task in affected {
            score.add(cfg.affected_weight);
            match task.priority {
                Some(TaskPriority::High) => score.add(cfg.high_priority_weight),
                Some(TaskPriority::Critical) => score.add(cfg.critical_priority_weight),
                _ => {}
            }
        }
        score.add((0.5 - subject.verification_confidence) * cfg.confidence_weight);
        let score = score.finish();

        let mut factors = vec![RiskFactor::DependentTasks {
            count: affected.len(),
        }];
        if high > 0 {
            factors.push(RiskFactor::HighPriorityDependents { count: high });
        }
        if critical > 0 {
            factors.push(RiskFactor::CriticalDependents { count: critical });
        }
        let max_depth = affected.iter().map(|a| a.depth).max().unwrap_or(0);
        if max_depth > 1 {
            factors.push(RiskFactor::TransitiveCascade { max_depth });
        }
        if subject.verification_confidence < 0.5 {
            factors.push(RiskFactor::LowSubjectConfidence {
                confidence: subject.verification_confidence,
            });
        }

        let mut level = if score >= cfg.high_threshold {
            RiskLevel::High
        } else if score >= cfg.medium_threshold {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        };
        if subject.priority == TaskPriority::Critical {
            level = level.escalate();
            factors.push(RiskFactor::CriticalSubject);
        }

        (level, score, factors)
    }
}

fn suggest_mitigations(
    change: ChangeType,
    level: RiskLevel,
    affected: &[AffectedTask],
) -> Vec<String> {
    let mut out = vec!["Review the change against its acceptance criteria".to_string()];
    if affected.is_empty() {
        return out;
    }
    out.push("Notify owners of dependent tasks".to_string());
    if change == ChangeType::Remove {
        out.push("Re-point or drop dependency edges before removing the task".to_string());
    }
    if change == ChangeType::Reschedule {
        out.push("Re-plan dependent tasks against the new schedule".to_string());
    }
    if level >= RiskLevel::High {
        out.push("Consider a phased rollout".to_string());
        out.push("Prepare a rollback plan".to_string());
    }
    out
}

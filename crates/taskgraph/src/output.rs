//! Output formatting for CLI commands.
//!
//! Semantic color theme:
//!   - Success:   green  (low risk, completion)
//!   - Warning:   yellow (medium risk, in-progress)
//!   - Error:     red    (cycles, high risk, blocked)
//!   - Reference: cyan   (task ids)

use crate::automation::{BlockedTask, CompletionDecision};
use crate::domain::{Task, TaskDependency};
use crate::graph::Cycle;
use crate::impact::{ImpactAnalysis, RiskFactor, RiskLevel};
use colored::Colorize;
use serde::Serialize;
use std::io::{self, IsTerminal, Write};

/// Rendering options for text output
#[derive(Debug, Clone, Copy)]
pub struct OutputConfig {
    /// Emit ANSI colors
    pub use_colors: bool,
}

impl OutputConfig {
    /// Colors on for an interactive terminal unless `NO_COLOR` is set.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            use_colors: io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none(),
        }
    }

    /// Plain output.
    #[must_use]
    pub fn plain() -> Self {
        Self { use_colors: false }
    }
}

fn id(text: &str, config: OutputConfig) -> String {
    if config.use_colors {
        text.cyan().to_string()
    } else {
        text.to_string()
    }
}

fn risk(level: RiskLevel, config: OutputConfig) -> String {
    let text = level.to_string().to_uppercase();
    if !config.use_colors {
        return text;
    }
    match level {
        RiskLevel::Low => text.green().to_string(),
        RiskLevel::Medium => text.yellow().to_string(),
        RiskLevel::High => text.red().to_string(),
        RiskLevel::Critical => text.red().bold().to_string(),
    }
}

fn heading(text: &str, config: OutputConfig) -> String {
    if config.use_colors {
        text.bold().to_string()
    } else {
        text.to_string()
    }
}

/// Print any serializable value as pretty JSON.
pub fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writeln!(handle, "{json}")
}

/// Write detected cycles.
pub fn write_cycles<W: Write>(w: &mut W, cycles: &[Cycle], config: OutputConfig) -> io::Result<()> {
    if cycles.is_empty() {
        return writeln!(w, "No cycles found.");
    }
    writeln!(w, "{}", heading(&format!("{} cycle(s):", cycles.len()), config))?;
    for cycle in cycles {
        writeln!(w, "  {}", id(&cycle.to_string(), config))?;
    }
    Ok(())
}

/// Write a linear execution order.
pub fn write_plan<W: Write>(w: &mut W, order: &[String], config: OutputConfig) -> io::Result<()> {
    for (i, task) in order.iter().enumerate() {
        writeln!(w, "{:>4}. {}", i + 1, id(task, config))?;
    }
    Ok(())
}

/// Write execution batches.
pub fn write_batches<W: Write>(
    w: &mut W,
    batches: &[Vec<String>],
    config: OutputConfig,
) -> io::Result<()> {
    for (i, batch) in batches.iter().enumerate() {
        let members: Vec<String> = batch.iter().map(|t| id(t, config)).collect();
        writeln!(w, "Batch {}: {}", i + 1, members.join(", "))?;
    }
    Ok(())
}

fn describe_factor(factor: &RiskFactor) -> String {
    match factor {
        RiskFactor::DependentTasks { count } => format!("{count} dependent task(s)"),
        RiskFactor::HighPriorityDependents { count } => {
            format!("{count} high-priority dependent(s)")
        }
        RiskFactor::CriticalDependents { count } => format!("{count} critical dependent(s)"),
        RiskFactor::TransitiveCascade { max_depth } => {
            format!("cascades {max_depth} levels deep")
        }
        RiskFactor::LowSubjectConfidence { confidence } => {
            format!("low verification confidence ({confidence:.2})")
        }
        RiskFactor::CriticalSubject => "subject task is critical".to_string(),
    }
}

/// Write an impact analysis report.
pub fn write_impact<W: Write>(
    w: &mut W,
    analysis: &ImpactAnalysis,
    config: OutputConfig,
) -> io::Result<()> {
    writeln!(
        w,
        "Impact of {} on {}: {} (score {:.2})",
        analysis.change_type(),
        id(analysis.task_id().as_str(), config),
        risk(analysis.risk_level(), config),
        analysis.risk_score()
    )?;

    if analysis.affected().is_empty() {
        writeln!(w, "No dependent tasks.")?;
    } else {
        writeln!(w, "{}", heading("Affected tasks:", config))?;
        for task in analysis.affected() {
            let priority = task
                .priority
                .map_or_else(|| "unknown".to_string(), |p| p.to_string());
            writeln!(
                w,
                "  {} (depth {}, {priority})",
                id(task.task_id.as_str(), config),
                task.depth
            )?;
        }
    }

    if !analysis.risk_factors().is_empty() {
        writeln!(w, "{}", heading("Risk factors:", config))?;
        for factor in analysis.risk_factors() {
            writeln!(w, "  - {}", describe_factor(factor))?;
        }
    }
    writeln!(w, "{}", heading("Mitigations:", config))?;
    for mitigation in analysis.mitigations() {
        writeln!(w, "  - {mitigation}")?;
    }
    Ok(())
}

/// Write blocked tasks with their blockers.
pub fn write_blocked<W: Write>(
    w: &mut W,
    blocked: &[BlockedTask],
    config: OutputConfig,
) -> io::Result<()> {
    if blocked.is_empty() {
        return writeln!(w, "No blocked tasks.");
    }
    for entry in blocked {
        let blockers: Vec<String> = entry
            .blocked_by
            .iter()
            .map(|b| id(b.as_str(), config))
            .collect();
        writeln!(
            w,
            "{} blocked by {}",
            id(entry.task_id.as_str(), config),
            blockers.join(", ")
        )?;
    }
    Ok(())
}

/// Write auto-completion decisions and the critical tasks still open.
pub fn write_decisions<W: Write>(
    w: &mut W,
    decisions: &[CompletionDecision],
    open_critical: &[&Task],
    config: OutputConfig,
) -> io::Result<()> {
    if decisions.is_empty() {
        writeln!(w, "No status changes.")?;
    }
    for decision in decisions {
        let (action, confidence) = match decision {
            CompletionDecision::Complete { confidence, .. } => ("complete", confidence),
            CompletionDecision::AwaitApproval { confidence, .. } => {
                ("awaiting approval", confidence)
            }
            CompletionDecision::MarkInProgress { confidence, .. } => ("start", confidence),
        };
        writeln!(
            w,
            "{} -> {action} (confidence {confidence:.2})",
            id(decision.task_id().as_str(), config)
        )?;
    }
    if !open_critical.is_empty() {
        let ids: Vec<String> = open_critical
            .iter()
            .map(|t| id(t.id.as_str(), config))
            .collect();
        writeln!(w, "{} {}", heading("Open critical tasks:", config), ids.join(", "))?;
    }
    Ok(())
}

/// Write a confirmation for a newly added dependency.
pub fn write_added<W: Write>(
    w: &mut W,
    edge: &TaskDependency,
    config: OutputConfig,
) -> io::Result<()> {
    let text = format!(
        "Added dependency: {} depends on {}",
        id(edge.task_id.as_str(), config),
        id(edge.depends_on_task_id.as_str(), config)
    );
    if config.use_colors {
        writeln!(w, "{}", text.green())
    } else {
        writeln!(w, "{text}")
    }
}

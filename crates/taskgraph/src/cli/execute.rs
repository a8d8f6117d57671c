//! Command execution logic.

use anyhow::{Context, Result};
use std::io;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::{save_snapshot, AddDepArgs, ImpactArgs, OutputMode, PlanArgs};
use crate::automation::{
    incomplete_critical_tasks, plan_auto_completion, scan_dependency_blocking,
};
use crate::config::EngineConfig;
use crate::domain::{NewDependency, Snapshot, TaskId};
use crate::graph::{detect_cycles, plan, plan_batches, Graph};
use crate::impact::ImpactAnalyzer;
use crate::output::{self, OutputConfig};
use crate::service::DependencyService;
use crate::storage::InMemoryStore;

/// Execute the cycles command
pub fn execute_cycles(snapshot: &Snapshot, mode: OutputMode) -> Result<()> {
    let graph = Graph::from_dependencies(&snapshot.tasks, &snapshot.dependencies);
    let cycles = detect_cycles(&graph);
    match mode {
        OutputMode::Json => output::print_json(&cycles)?,
        OutputMode::Text => {
            output::write_cycles(&mut io::stdout().lock(), &cycles, OutputConfig::from_env())?;
        }
    }
    Ok(())
}

/// Execute the plan command
pub fn execute_plan(snapshot: &Snapshot, args: &PlanArgs, mode: OutputMode) -> Result<()> {
    let graph = Graph::from_dependencies(&snapshot.tasks, &snapshot.dependencies);
    let config = OutputConfig::from_env();
    if args.batches {
        let batches = plan_batches(&graph)?;
        match mode {
            OutputMode::Json => output::print_json(&batches)?,
            OutputMode::Text => output::write_batches(&mut io::stdout().lock(), &batches, config)?,
        }
    } else {
        let order = plan(&graph)?;
        match mode {
            OutputMode::Json => output::print_json(&order)?,
            OutputMode::Text => output::write_plan(&mut io::stdout().lock(), &order, config)?,
        }
    }
    Ok(())
}

/// Execute the impact command
pub fn execute_impact(
    snapshot: &Snapshot,
    config: &EngineConfig,
    args: &ImpactArgs,
    mode: OutputMode,
) -> Result<()> {
    let analyzer = ImpactAnalyzer::new(config.risk.clone());
    let analysis = analyzer.analyze_impact(
        &TaskId::new(args.task_id.as_str()),
        args.change_type.into(),
        &snapshot.tasks,
        &snapshot.dependencies,
    )?;
    match mode {
        OutputMode::Json => output::print_json(&analysis)?,
        OutputMode::Text => {
            output::write_impact(&mut io::stdout().lock(), &analysis, OutputConfig::from_env())?;
        }
    }
    Ok(())
}

/// Execute the blocked command
///
/// The scan runs on the blocking pool so a Ctrl-C can cancel it.
pub async fn execute_blocked(
    snapshot: Snapshot,
    cancel: CancellationToken,
    mode: OutputMode,
) -> Result<()> {
    let blocked = tokio::task::spawn_blocking(move || {
        scan_dependency_blocking(&snapshot.tasks, &snapshot.dependencies, &cancel)
    })
    .await
    .context("blocking scan did not finish")??;

    match mode {
        OutputMode::Json => output::print_json(&blocked)?,
        OutputMode::Text => {
            output::write_blocked(&mut io::stdout().lock(), &blocked, OutputConfig::from_env())?;
        }
    }
    Ok(())
}

/// Execute the auto-complete command
pub async fn execute_auto_complete(
    snapshot: Snapshot,
    config: &EngineConfig,
    cancel: CancellationToken,
    mode: OutputMode,
) -> Result<()> {
    let automation = config.automation.clone();
    let (snapshot, decisions) = tokio::task::spawn_blocking(move || {
        let decisions = plan_auto_completion(&snapshot.tasks, &automation, &cancel);
        (snapshot, decisions)
    })
    .await
    .context("auto-completion scan did not finish")?;
    let decisions = decisions?;
    let open_critical = incomplete_critical_tasks(&snapshot.tasks);

    match mode {
        OutputMode::Json => {
            let critical: Vec<&TaskId> = open_critical.iter().map(|t| &t.id).collect();
            output::print_json(&serde_json::json!({
                "decisions": decisions,
                "open_critical": critical,
            }))?;
        }
        OutputMode::Text => output::write_decisions(
            &mut io::stdout().lock(),
            &decisions,
            &open_critical,
            OutputConfig::from_env(),
        )?,
    }
    Ok(())
}

/// Execute the add-dep command
///
/// The snapshot is rewritten only if the dependency was accepted.
pub async fn execute_add_dep(
    snapshot: Snapshot,
    path: &Path,
    config: &EngineConfig,
    args: &AddDepArgs,
    cancel: CancellationToken,
    mode: OutputMode,
) -> Result<()> {
    let store = InMemoryStore::from_snapshot(snapshot);
    let service =
        DependencyService::from_config(Arc::new(store.clone()), Arc::new(store.clone()), config);
    let cleanup_token = cancel.child_token();
    let cleanup = service.spawn_cache_cleanup(cleanup_token.clone());

    let request = NewDependency {
        depends_on_task_id: TaskId::new(args.depends_on.as_str()),
        dependency_type: args.dep_type.into(),
        confidence: args.confidence,
    };
    let added = service
        .add_dependency(&TaskId::new(args.task_id.as_str()), request)
        .await;
    cleanup_token.cancel();
    cleanup.await.context("cache cleanup did not stop")?;
    let edge = added?;
    save_snapshot(path, &store.snapshot().await).await?;

    match mode {
        OutputMode::Json => output::print_json(&edge)?,
        OutputMode::Text => {
            output::write_added(&mut io::stdout().lock(), &edge, OutputConfig::from_env())?;
        }
    }
    Ok(())
}

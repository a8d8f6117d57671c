//! Integration tests for the taskgraph CLI.

use rstest::{fixture, rstest};
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

const SNAPSHOT: &str = r#"{
  "tasks": [
    {"id": "A", "project_id": "p1", "status": "completed", "priority": "high", "verification_confidence": 1.0},
    {"id": "B", "project_id": "p1", "status": "pending", "priority": "critical", "verification_confidence": 0.9},
    {"id": "C", "project_id": "p1", "status": "pending", "priority": "medium", "verification_confidence": 0.6}
  ],
  "dependencies": [
    {"id": "d1", "task_id": "B", "depends_on_task_id": "A"},
    {"id": "d2", "task_id": "C", "depends_on_task_id": "B"}
  ]
}"#;

fn run_taskgraph(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_taskgraph"))
        .args(args)
        .current_dir(dir)
        .env("NO_COLOR", "1")
        .output()
        .expect("Failed to execute taskgraph binary")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// A temporary directory holding `taskgraph.json`
#[fixture]
fn project_dir() -> TempDir {
    let temp = TempDir::new().expect("Failed to create temp directory");
    std::fs::write(temp.path().join("taskgraph.json"), SNAPSHOT).expect("Failed to write snapshot");
    temp
}

#[rstest]
fn test_plan_prints_order(project_dir: TempDir) {
    let output = run_taskgraph(project_dir.path(), &["plan", "--json"]);
    assert!(output.status.success());

    let order: Vec<String> = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(order, vec!["A", "B", "C"]);
}

#[rstest]
fn test_cycles_on_clean_graph(project_dir: TempDir) {
    let output = run_taskgraph(project_dir.path(), &["cycles"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("No cycles found."));
}

#[rstest]
fn test_impact_json_lists_blast_radius(project_dir: TempDir) {
    let output = run_taskgraph(project_dir.path(), &["impact", "A", "--json"]);
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(report["affected_tasks"], serde_json::json!(["B", "C"]));
    assert_eq!(report["change_type"], "modify");
}

#[rstest]
fn test_blocked_lists_waiting_tasks(project_dir: TempDir) {
    let output = run_taskgraph(project_dir.path(), &["blocked"]);
    assert!(output.status.success());
    assert_eq!(stdout(&output), "C blocked by B\n");
}

#[rstest]
fn test_auto_complete_respects_critical_approval(project_dir: TempDir) {
    let output = run_taskgraph(project_dir.path(), &["auto-complete", "--json"]);
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(report["decisions"][0]["action"], "await_approval");
    assert_eq!(report["decisions"][1]["action"], "mark_in_progress");
    assert_eq!(report["open_critical"], serde_json::json!(["B"]));
}

#[rstest]
fn test_add_dep_rejects_cycle_and_keeps_file(project_dir: TempDir) {
    let output = run_taskgraph(project_dir.path(), &["add-dep", "A", "C"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("would create a cycle"));

    let after = std::fs::read_to_string(project_dir.path().join("taskgraph.json")).unwrap();
    assert_eq!(after, SNAPSHOT);
}

#[rstest]
fn test_add_dep_persists_new_edge(project_dir: TempDir) {
    let output = run_taskgraph(project_dir.path(), &["add-dep", "C", "A", "--confidence", "0.7"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let output = run_taskgraph(project_dir.path(), &["plan", "--batches", "--json"]);
    let batches: Vec<Vec<String>> = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(batches, vec![vec!["A"], vec!["B"], vec!["C"]]);

    let saved = std::fs::read_to_string(project_dir.path().join("taskgraph.json")).unwrap();
    let snapshot: serde_json::Value = serde_json::from_str(&saved).unwrap();
    assert_eq!(snapshot["dependencies"].as_array().unwrap().len(), 3);
}

#[rstest]
fn test_config_file_changes_thresholds(project_dir: TempDir) {
    std::fs::write(
        project_dir.path().join("taskgraph.yaml"),
        "automation:\n  require-human-approval-for-critical: false\n",
    )
    .unwrap();

    let output = run_taskgraph(
        project_dir.path(),
        &["auto-complete", "--json", "--config", "taskgraph.yaml"],
    );
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(report["decisions"][0]["action"], "complete");
}

#[rstest]
fn test_missing_snapshot_fails(project_dir: TempDir) {
    let output = run_taskgraph(project_dir.path(), &["plan", "--snapshot", "nope.json"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("nope.json"));
}

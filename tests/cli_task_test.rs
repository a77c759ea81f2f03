//! Integration tests for task operations via CLI.
//!
//! These tests verify that task commands work correctly through the CLI:
//! - `wb init` creates the workbook
//! - `wb task create/show/list/update/archive` all work
//! - the Master Index follows every change
//! - JSON and human-readable output formats are correct

mod common;

use common::TestEnv;
use predicates::prelude::*;

// === Init Tests ===

#[test]
fn test_init_creates_storage() {
    let env = TestEnv::new();

    env.wb()
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"initialized\":true"));

    assert!(env.path().join(".workbook").is_dir());
    assert!(env.path().join("tasks").join("INDEX.md").is_file());
    assert!(env.path().join("bugs").join("INDEX.md").is_file());
}

#[test]
fn test_init_human_readable() {
    let env = TestEnv::new();

    env.wb()
        .args(["init", "-H"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized workbook"));
}

#[test]
fn test_init_already_initialized() {
    let env = TestEnv::init();

    env.wb()
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"initialized\":false"));
}

#[test]
fn test_init_with_journal_storage() {
    let env = TestEnv::new();
    let out = env.json(&["init", "--tasks-storage", "journal"]);
    assert_eq!(out["tasks_storage"], "journal");
    assert_eq!(out["bugs_storage"], "files");

    env.json(&["task", "create", "Journaled"]);
    assert!(env.path().join("tasks").join("journal.md").is_file());
}

// === Create / Show ===

#[test]
fn test_task_create_json() {
    let env = TestEnv::init();

    env.wb()
        .args(["task", "create", "My first task"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"id\":\"0001\""))
        .stdout(predicate::str::contains("\"title\":\"My first task\""));
}

#[test]
fn test_task_create_human() {
    let env = TestEnv::init();

    env.wb()
        .args(["task", "create", "Write docs", "-H"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created task 0001: Write docs"));
}

#[test]
fn test_task_create_with_details() {
    let env = TestEnv::init();

    let out = env.json(&[
        "task",
        "create",
        "Add search",
        "-p",
        "high",
        "-k",
        "feature",
        "--feature",
        "search",
        "--subsystem",
        "api",
        "--subsystem",
        "index",
        "-o",
        "Find records fast",
        "--criterion",
        "Results in under a second",
    ]);
    assert_eq!(out["priority"], "high");
    assert_eq!(out["kind"], "feature");
    assert_eq!(out["subsystems"], serde_json::json!(["api", "index"]));
    let body = out["body"].as_str().unwrap();
    assert!(body.contains("Find records fast"));
    assert!(body.contains("- [ ] Results in under a second"));

    assert!(env.index("tasks").contains("- [ ] FEAT 0001 (high) Add search"));
}

#[test]
fn test_task_child_ids() {
    let env = TestEnv::init();
    env.json(&["task", "create", "Parent"]);

    let child = env.json(&["task", "create", "Child", "--parent", "0001"]);
    assert_eq!(child["id"], "0001.1");
    assert_eq!(child["parent_id"], "0001");

    let shown = env.json(&["task", "show", "0001"]);
    assert_eq!(shown["children"], serde_json::json!(["0001.1"]));
}

#[test]
fn test_task_show_not_found() {
    let env = TestEnv::init();

    env.wb()
        .args(["task", "show", "0042"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("\"error\""));
}

#[test]
fn test_task_show_human_error() {
    let env = TestEnv::init();

    env.wb()
        .args(["task", "show", "0042", "-H"])
        .assert()
        .failure()
        .stderr(predicate::str::starts_with("Error:"));
}

#[test]
fn test_commands_require_init() {
    let env = TestEnv::new();

    env.wb()
        .args(["task", "create", "Too early"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not initialized"));
}

// === List ===

#[test]
fn test_task_list_filters() {
    let env = TestEnv::init();
    env.json(&["task", "create", "Low one", "-p", "low"]);
    env.json(&["task", "create", "High one", "-p", "high"]);

    let all = env.json(&["task", "list"]);
    assert_eq!(all["count"], 2);

    let high = env.json(&["task", "list", "-p", "high"]);
    assert_eq!(high["count"], 1);
    assert_eq!(high["records"][0]["title"], "High one");

    let from_index = env.json(&["task", "list", "--index", "-p", "low"]);
    assert_eq!(from_index["count"], 1);
}

#[test]
fn test_task_list_index_rejects_parent_filter() {
    let env = TestEnv::init();

    env.wb()
        .args(["task", "list", "--index", "--parent", "0001"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not available with --index"));
}

#[test]
fn test_task_list_empty_human() {
    let env = TestEnv::init();

    env.wb()
        .args(["task", "list", "-H"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No tasks found."));
}

// === Update / Status ===

#[test]
fn test_task_status_flow_updates_index() {
    let env = TestEnv::init();
    env.json(&["task", "create", "Flow"]);

    let started = env.json(&["task", "update", "0001", "--status", "in_progress"]);
    assert_eq!(started["status"], "in_progress");
    assert!(env.index("tasks").contains("- [>] TASK 0001 (medium) Flow"));

    let done = env.json(&["task", "update", "0001", "--status", "completed"]);
    assert_eq!(done["status"], "completed");
    assert!(done["completed_at"].is_string());
    assert!(env.index("tasks").contains("- [x] TASK 0001 (medium) Flow"));
}

#[test]
fn test_task_invalid_transition() {
    let env = TestEnv::init();
    env.json(&["task", "create", "Skip ahead"]);

    env.wb()
        .args(["task", "update", "0001", "--status", "completed"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid transition"));
}

#[test]
fn test_task_update_requires_change() {
    let env = TestEnv::init();
    env.json(&["task", "create", "Unchanged"]);

    env.wb()
        .args(["task", "update", "0001"])
        .assert()
        .failure()
        .code(1);
}

#[test]
fn test_task_update_title() {
    let env = TestEnv::init();
    env.json(&["task", "create", "Old title"]);

    env.wb()
        .args(["task", "update", "0001", "--title", "New title", "-H"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Updated task 0001: New title"));
    assert!(env.index("tasks").contains("New title"));
    assert!(!env.index("tasks").contains("Old title"));
}

// === Dependencies ===

#[test]
fn test_deps_ready_and_blocked() {
    let env = TestEnv::init();
    env.json(&["task", "create", "First"]);
    env.json(&["task", "create", "Second"]);
    env.json(&["task", "deps", "add", "0002", "0001"]);

    let ready = env.json(&["task", "ready"]);
    assert_eq!(ready["count"], 1);
    assert_eq!(ready["records"][0]["id"], "0001");

    let blocked = env.json(&["task", "blocked"]);
    assert_eq!(blocked["count"], 1);

    env.wb()
        .args(["task", "deps", "add", "0001", "0002"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Cyclic dependency"));

    let cleared = env.json(&["task", "deps", "rm", "0002", "0001"]);
    assert!(cleared.get("dependencies").is_none());
}

#[test]
fn test_deps_reject_unknown_target() {
    let env = TestEnv::init();
    env.json(&["task", "create", "Lonely"]);

    env.wb()
        .args(["task", "deps", "add", "0001", "0099"])
        .assert()
        .failure()
        .code(1);
}

// === Archive ===

#[test]
fn test_archive_and_restore() {
    let env = TestEnv::init();
    env.json(&["task", "create", "Done soon"]);

    env.wb()
        .args(["task", "archive", "0001"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));

    env.json(&["task", "update", "0001", "--status", "in_progress"]);
    env.json(&["task", "update", "0001", "--status", "completed"]);
    let archived = env.json(&["task", "archive", "0001"]);
    assert_eq!(archived["archived"], true);
    assert!(env.index("tasks").contains("## Archived"));

    assert_eq!(env.json(&["task", "list"])["count"], 0);
    assert_eq!(env.json(&["task", "list", "-a"])["count"], 1);

    let next = env.json(&["task", "create", "After archive"]);
    assert_eq!(next["id"], "0002");

    let restored = env.json(&["task", "restore", "0001"]);
    assert!(restored.get("archived").is_none());
}

// === Complexity ===

#[test]
fn test_assess_and_decompose() {
    let env = TestEnv::init();
    env.json(&[
        "task",
        "create",
        "Big change",
        "--effort",
        "2w",
        "--subsystem",
        "api",
        "--subsystem",
        "cli",
        "--subsystem",
        "storage",
    ]);

    let assessed = env.json(&["task", "assess", "0001"]);
    assert_eq!(assessed["score"], 7);
    assert_eq!(assessed["tier"], "complex");

    let pending = env.json(&["task", "decompose", "0001"]);
    assert!(pending["verdict"].is_null());
    assert!(pending["prompt"].is_string());

    let split = env.json(&["task", "decompose", "0001", "-d", "accept"]);
    assert_eq!(split["verdict"], "decompose");
    assert_eq!(split["children"].as_array().unwrap().len(), 3);
    assert!(env.index("tasks").contains("TASK 0001.3"));
}

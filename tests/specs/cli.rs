// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end runs of the `qm` binary.

use assert_cmd::Command;
use tempfile::tempdir;

fn qm() -> Command {
    #[allow(clippy::unwrap_used)]
    Command::cargo_bin("qm").unwrap()
}

#[test]
fn version_exits_zero() {
    qm().arg("--version").assert().success();
}

#[test]
fn help_exits_zero() {
    qm().arg("--help").assert().success();
}

#[test]
fn list_tasks_shows_inventory() {
    let assert = qm().arg("--list-tasks").assert().success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    assert!(stdout.contains("inventory"));
    assert!(stdout.contains("maintenance"));
}

#[test]
fn list_tasks_marks_disabled() {
    let assert = qm()
        .args(["--list-tasks", "--no-task", "maintenance"])
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    assert!(stdout.contains("maintenance"));
    assert!(stdout.contains("(disabled)"));
}

#[test]
fn list_categories_shows_builtin_probe_categories() {
    let assert = qm().arg("--list-categories").assert().success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    assert!(stdout.contains("cpu"));
    assert!(stdout.contains("environment"));
}

#[test]
fn setup_prints_directories() {
    let dir = tempdir().unwrap();
    let assert = qm()
        .args(["--setup", "--config", "none"])
        .arg("--vardir")
        .arg(dir.path())
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    assert!(stdout.contains("vardir:"));
}

#[test]
fn no_target_is_a_startup_error() {
    let dir = tempdir().unwrap();
    let output = qm()
        .args(["--config", "none", "--no-httpd"])
        .arg("--vardir")
        .arg(dir.path())
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("no target defined"));
}

#[test]
fn invalid_option_combination_is_fatal() {
    let dir = tempdir().unwrap();
    let output = qm()
        .args(["--config", "none", "--logger", "file"])
        .arg("--vardir")
        .arg(dir.path())
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("logfile"));
}

#[test]
fn first_run_local_json_writes_inventory() {
    let vardir = tempdir().unwrap();
    let out = tempdir().unwrap();

    qm().args(["--config", "none", "--no-httpd", "--json", "--debug"])
        .arg("--vardir")
        .arg(vardir.path())
        .arg("--local")
        .arg(out.path())
        .assert()
        .success();

    // Agent identity was persisted
    let dump = vardir.path().join("Quartermaster-Agent.dump");
    assert!(dump.is_file());
    let state: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&dump).unwrap()).unwrap();
    let deviceid = state["deviceid"].as_str().unwrap();
    let hostname = hostname();
    assert!(deviceid.starts_with(&format!("{hostname}-")));

    // The document landed in the output directory, named by deviceid
    let document = out.path().join(format!("{deviceid}.json"));
    assert!(document.is_file());
    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&document).unwrap()).unwrap();
    assert_eq!(written["action"], serde_json::json!("inventory"));
    assert_eq!(written["deviceid"], serde_json::json!(deviceid));
    assert_eq!(
        written["content"]["hardware"]["name"],
        serde_json::json!(hostname)
    );
}

#[test]
fn second_partial_run_drops_unchanged_sections() {
    let vardir = tempdir().unwrap();
    let out = tempdir().unwrap();

    let run = |extra: &[&str]| {
        let mut cmd = qm();
        cmd.args(["--config", "none", "--no-httpd", "--json"])
            .arg("--vardir")
            .arg(vardir.path())
            .arg("--local")
            .arg(out.path());
        cmd.args(extra);
        cmd.assert().success();
    };

    run(&[]);
    run(&["--partial", "environment"]);

    let document = latest_json(out.path());
    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&document).unwrap()).unwrap();
    assert_eq!(written["partial"], serde_json::json!(true));
    assert!(written["content"].get("envs").is_some());
    // Categories outside the partial event are absent
    assert!(written["content"].get("cpus").is_none());
}

fn hostname() -> String {
    hostname::get().unwrap().into_string().unwrap()
}

fn latest_json(dir: &std::path::Path) -> std::path::PathBuf {
    let mut paths: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().map(|e| e == "json").unwrap_or(false))
        .collect();
    paths.sort();
    paths.pop().unwrap()
}

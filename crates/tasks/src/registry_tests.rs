// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn defs(names: &[&'static str]) -> Vec<TaskDefinition> {
    names
        .iter()
        .map(|name| TaskDefinition { name, version: "1.0" })
        .collect()
}

fn req(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_available_tasks_include_inventory() {
    let names: Vec<&str> = available_tasks().iter().map(|t| t.name).collect();
    assert!(names.contains(&"inventory"));
    assert!(names.contains(&"maintenance"));
}

#[test]
fn test_no_task_filter() {
    let enabled = enabled_tasks(&req(&["Inventory"]));
    assert!(!enabled.iter().any(|t| t.name == "inventory"));
    assert!(enabled.iter().any(|t| t.name == "maintenance"));
}

#[test]
fn test_plan_keeps_requested_order() {
    let available = defs(&["a", "b", "c"]);
    assert_eq!(task_execution_plan(&available, &req(&["c", "a"])), req(&["c", "a"]));
}

#[test]
fn test_plan_ellipsis_expands_remaining_in_declared_order() {
    let available = defs(&["a", "b", "c", "d", "z"]);
    let plan = task_execution_plan(&available, &req(&["a", "...", "z"]));
    assert_eq!(plan, req(&["a", "b", "c", "d", "z"]));
}

#[test]
fn test_plan_unknown_tasks_silently_dropped() {
    let available = defs(&["a", "b"]);
    let plan = task_execution_plan(&available, &req(&["a", "ghost", "b"]));
    assert_eq!(plan, req(&["a", "b"]));
}

#[test]
fn test_plan_deduplicates() {
    let available = defs(&["a", "b"]);
    let plan = task_execution_plan(&available, &req(&["a", "A", "b"]));
    assert_eq!(plan, req(&["a", "b"]));
}

#[test]
fn test_plan_case_insensitive() {
    let available = defs(&["inventory"]);
    let plan = task_execution_plan(&available, &req(&["Inventory"]));
    assert_eq!(plan, req(&["inventory"]));
}

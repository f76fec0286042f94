// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task discovery and execution planning.
//!
//! Tasks register here at build time; `no-task` filtering and the
//! `--tasks` plan operate on this list without touching the
//! filesystem.

/// A task known to this build of the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskDefinition {
    pub name: &'static str,
    pub version: &'static str,
}

/// Tasks compiled into the agent, in declared order.
pub fn available_tasks() -> Vec<TaskDefinition> {
    vec![
        TaskDefinition { name: "inventory", version: env!("CARGO_PKG_VERSION") },
        TaskDefinition { name: "maintenance", version: env!("CARGO_PKG_VERSION") },
    ]
}

/// Available tasks minus the `no-task` exclusions.
pub fn enabled_tasks(no_task: &[String]) -> Vec<TaskDefinition> {
    available_tasks()
        .into_iter()
        .filter(|task| !no_task.iter().any(|t| t.eq_ignore_ascii_case(task.name)))
        .collect()
}

/// Expand a `--tasks` request into an execution plan.
///
/// Requested names keep their order; the literal `...` expands to every
/// remaining available task in declared order. Unknown and duplicate
/// names are silently dropped.
pub fn task_execution_plan(available: &[TaskDefinition], requested: &[String]) -> Vec<String> {
    let mut plan: Vec<String> = Vec::new();
    let mut planned = |plan: &Vec<String>, name: &str| {
        plan.iter().any(|p| p.eq_ignore_ascii_case(name))
    };

    // Names explicitly requested anywhere are not part of "remaining"
    let explicit: Vec<&String> = requested.iter().filter(|r| *r != "...").collect();

    for request in requested {
        if request == "..." {
            for task in available {
                let requested_elsewhere = explicit
                    .iter()
                    .any(|r| r.eq_ignore_ascii_case(task.name));
                if !requested_elsewhere && !planned(&plan, task.name) {
                    plan.push(task.name.to_string());
                }
            }
            continue;
        }
        let known = available
            .iter()
            .find(|task| request.eq_ignore_ascii_case(task.name));
        if let Some(task) = known {
            if !planned(&plan, task.name) {
                plan.push(task.name.to_string());
            }
        }
    }
    plan
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;

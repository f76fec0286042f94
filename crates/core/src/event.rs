// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduled directives attached to a target.
//!
//! Events are consumed by the runtime ahead of a target's normal plan.
//! Serializes with `{"type": "kind", ...fields}` plus the `name` and
//! `rundate` envelope fields, so queues survive a restart as plain JSON.

use serde::{Deserialize, Serialize};

/// A scheduled directive with an absolute wall-clock due date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Queue key: cooldown and deletion match on this name.
    pub name: String,
    /// Absolute due date, epoch seconds.
    pub rundate: u64,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Recognized event kinds and their obligatory fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventKind {
    /// Fires once to let a task initialize before its first run.
    #[serde(rename = "init")]
    Init { task: String },

    /// Runs a single task (or `all`) outside the normal plan.
    #[serde(rename = "taskrun")]
    TaskRun {
        task: String,
        /// Force a full run even when postpone would apply.
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        full: bool,
        /// Force a partial run.
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        partial: bool,
        /// Resume the normal plan after this run.
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        reschedule: bool,
    },

    /// Inventory over a restricted category set.
    #[serde(rename = "partial")]
    Partial { categories: Vec<String> },

    /// Periodic housekeeping for one task on one target.
    #[serde(rename = "maintenance")]
    Maintenance { task: String, target: String },

    /// External job scheduled at a specific time.
    #[serde(rename = "job")]
    Job { task: String },
}

impl Event {
    pub fn init(task: &str, rundate: u64) -> Self {
        Self {
            name: format!("init {task}"),
            rundate,
            kind: EventKind::Init { task: task.to_string() },
        }
    }

    pub fn taskrun(task: &str, full: bool, partial: bool, reschedule: bool, rundate: u64) -> Self {
        Self {
            name: format!("run {task}"),
            rundate,
            kind: EventKind::TaskRun {
                task: task.to_string(),
                full,
                partial,
                reschedule,
            },
        }
    }

    pub fn partial(categories: Vec<String>, rundate: u64) -> Self {
        Self {
            name: format!("partial inventory ({})", categories.join(",")),
            rundate,
            kind: EventKind::Partial { categories },
        }
    }

    pub fn maintenance(task: &str, target: &str, rundate: u64) -> Self {
        Self {
            name: format!("{task} maintenance"),
            rundate,
            kind: EventKind::Maintenance {
                task: task.to_string(),
                target: target.to_string(),
            },
        }
    }

    pub fn job(task: &str, rundate: u64) -> Self {
        Self {
            name: format!("job {task}"),
            rundate,
            kind: EventKind::Job { task: task.to_string() },
        }
    }

    /// The task this event concerns. Partial inventory events are always
    /// inventory-task events.
    pub fn task(&self) -> &str {
        match &self.kind {
            EventKind::Init { task }
            | EventKind::TaskRun { task, .. }
            | EventKind::Maintenance { task, .. }
            | EventKind::Job { task } => task,
            EventKind::Partial { .. } => "inventory",
        }
    }

    pub fn is_partial(&self) -> bool {
        matches!(self.kind, EventKind::Partial { .. })
    }

    pub fn is_maintenance(&self) -> bool {
        matches!(self.kind, EventKind::Maintenance { .. })
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;

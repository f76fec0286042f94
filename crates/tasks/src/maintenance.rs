// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Datastore maintenance task.
//!
//! Deploy file parts live under retention-epoch directories; this task
//! scrubs the ones whose retention has passed.

use async_trait::async_trait;
use qm_core::Event;
use qm_proto::Answer;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::runner::AbortFlag;
use crate::task::{Task, TaskError, TaskOutput};

/// How long after a run the next maintenance event is scheduled.
const MAINTENANCE_PERIOD_SECS: u64 = 3_600;

pub struct MaintenanceTask {
    /// The target's private storage directory.
    statedir: PathBuf,
    target_id: String,
    abort: AbortFlag,
}

impl MaintenanceTask {
    pub fn new(statedir: PathBuf, target_id: String) -> Self {
        Self {
            statedir,
            target_id,
            abort: AbortFlag::new(),
        }
    }

    fn now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }

    /// Remove expired retention directories under one fileparts root.
    fn scrub(&self, root: &std::path::Path, now: u64) -> usize {
        let mut removed = 0;
        let Ok(entries) = std::fs::read_dir(root) else {
            return removed;
        };
        for entry in entries.flatten() {
            if self.abort.is_raised() {
                break;
            }
            let name = entry.file_name();
            let Some(epoch) = name.to_str().and_then(|n| n.parse::<u64>().ok()) else {
                continue;
            };
            if epoch > now {
                continue;
            }
            let path = entry.path();
            match std::fs::remove_dir_all(&path) {
                Ok(()) => {
                    tracing::debug!("removed expired fileparts {}", path.display());
                    removed += 1;
                }
                Err(e) => tracing::debug!("can't remove {}: {e}", path.display()),
            }
        }
        removed
    }
}

#[async_trait]
impl Task for MaintenanceTask {
    fn name(&self) -> &'static str {
        "maintenance"
    }

    fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    fn is_enabled(&mut self, _contact: Option<&Answer>) -> bool {
        self.statedir.join("deploy").join("fileparts").is_dir()
    }

    async fn run(&mut self) -> Result<TaskOutput, TaskError> {
        let now = Self::now();
        let fileparts = self.statedir.join("deploy").join("fileparts");
        let mut removed = 0;
        for shared in ["shared", "private"] {
            removed += self.scrub(&fileparts.join(shared), now);
        }
        if removed > 0 {
            tracing::info!("datastore maintenance removed {removed} expired fileparts");
        }
        Ok(TaskOutput::default())
    }

    fn abort(&self) {
        self.abort.raise();
    }

    fn abort_handle(&self) -> AbortFlag {
        self.abort.clone()
    }

    fn new_event(&self) -> Option<Event> {
        Some(Event::maintenance(
            "maintenance",
            &self.target_id,
            Self::now() + MAINTENANCE_PERIOD_SECS,
        ))
    }
}

#[cfg(test)]
#[path = "maintenance_tests.rs"]
mod tests;

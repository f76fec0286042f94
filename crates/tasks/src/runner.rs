// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timeout-bounded execution of probe entry points.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Default per-module timeout (`backend-collect-timeout`).
pub const DEFAULT_MODULE_TIMEOUT_SECS: u64 = 180;

/// Cooperative abort flag shared between the runtime and a task.
///
/// Checked between modules; a module already running is allowed to
/// finish or time out.
#[derive(Debug, Clone, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Run a blocking probe entry point under a timeout.
///
/// The closure runs on the blocking pool; on timeout it is abandoned
/// (logged and its eventual result discarded), the module is skipped
/// and the task continues.
pub async fn run_with_timeout<T>(
    name: &str,
    function: &str,
    timeout_secs: u64,
    f: impl FnOnce() -> T + Send + 'static,
) -> Option<T>
where
    T: Send + 'static,
{
    let timeout = Duration::from_secs(if timeout_secs == 0 {
        DEFAULT_MODULE_TIMEOUT_SECS
    } else {
        timeout_secs
    });
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(f)).await {
        Ok(Ok(result)) => Some(result),
        Ok(Err(join_error)) => {
            tracing::debug!("module {name} {function} crashed: {join_error}");
            None
        }
        Err(_) => {
            tracing::debug!(
                "module {name} {function} aborted after {} seconds timeout",
                timeout.as_secs()
            );
            None
        }
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon plumbing: detached restart, pidfile, termination signals.

use std::path::Path;
use std::process::{Command, Stdio};
use tokio_util::sync::CancellationToken;

/// Re-exec the current binary as a detached daemon.
///
/// The child gets `--no-fork` appended so it stays in the foreground
/// of its own session; the parent exits once the child is running.
pub fn spawn_detached() -> std::io::Result<u32> {
    let exe = std::env::current_exe()?;
    let args: Vec<String> = std::env::args()
        .skip(1)
        .filter(|arg| arg != "--no-fork")
        .collect();
    let child = Command::new(exe)
        .args(args)
        .arg("--no-fork")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    Ok(child.id())
}

/// Record our pid for service managers.
pub fn write_pidfile(path: &Path) -> std::io::Result<()> {
    std::fs::write(path, format!("{}\n", std::process::id()))
}

/// Cancel the token on SIGINT or SIGTERM.
pub async fn watch_signals(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(e) => {
                tracing::error!("can't install SIGTERM handler: {e}");
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    tracing::info!("termination signal received, exiting");
    token.cancel();
}

#[cfg(test)]
#[path = "daemon_tests.rs"]
mod tests;

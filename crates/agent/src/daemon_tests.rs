// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::tempdir;

#[test]
fn test_write_pidfile() {
    let dir = tempdir().unwrap();
    let pidfile = dir.path().join("agent.pid");

    write_pidfile(&pidfile).unwrap();

    let content = std::fs::read_to_string(&pidfile).unwrap();
    assert_eq!(content.trim().parse::<u32>().unwrap(), std::process::id());
}

#[tokio::test]
async fn test_watch_signals_cancels_on_signal() {
    // Only exercise the wiring; raising a real signal would tear down
    // the test harness
    let token = CancellationToken::new();
    let watcher = tokio::spawn(watch_signals(token.clone()));
    assert!(!token.is_cancelled());
    watcher.abort();
}

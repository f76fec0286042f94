// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::tempdir;

fn seed(statedir: &std::path::Path, kind: &str, epoch: u64) -> PathBuf {
    let dir = statedir
        .join("deploy/fileparts")
        .join(kind)
        .join(epoch.to_string())
        .join("a/b/cdefgh");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("part"), b"data").unwrap();
    dir
}

#[tokio::test]
async fn test_removes_expired_retention_dirs() {
    let dir = tempdir().unwrap();
    let now = MaintenanceTask::now();
    let expired = seed(dir.path(), "shared", now - 10);
    let live = seed(dir.path(), "shared", now + 3_600);
    let private_expired = seed(dir.path(), "private", now - 10);

    let mut task = MaintenanceTask::new(dir.path().to_path_buf(), "server0".into());
    assert!(task.is_enabled(None));
    task.run().await.unwrap();

    assert!(!expired.exists());
    assert!(!private_expired.exists());
    assert!(live.exists());
}

#[tokio::test]
async fn test_disabled_without_datastore() {
    let dir = tempdir().unwrap();
    let mut task = MaintenanceTask::new(dir.path().to_path_buf(), "server0".into());
    assert!(!task.is_enabled(None));
    // Running anyway is harmless
    task.run().await.unwrap();
}

#[test]
fn test_new_event_is_maintenance() {
    let task = MaintenanceTask::new(PathBuf::from("/tmp"), "server0".into());
    let event = task.new_event().unwrap();
    assert!(event.is_maintenance());
    assert!(event.rundate >= MaintenanceTask::now() + MAINTENANCE_PERIOD_SECS - 1);
}

#[test]
fn test_non_numeric_dirs_ignored() {
    let dir = tempdir().unwrap();
    let odd = dir.path().join("deploy/fileparts/shared/not-an-epoch");
    std::fs::create_dir_all(&odd).unwrap();

    let task = MaintenanceTask::new(dir.path().to_path_buf(), "server0".into());
    task.scrub(&dir.path().join("deploy/fileparts/shared"), MaintenanceTask::now());

    assert!(odd.exists());
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::Storage;
use tempfile::tempdir;

#[test]
fn test_migrates_files_and_subdirs() {
    let dir = tempdir().unwrap();
    let old = dir.path().join("old");
    let new = dir.path().join("new");
    std::fs::create_dir_all(old.join("server0")).unwrap();
    std::fs::write(old.join("agent.dump"), b"{}").unwrap();
    std::fs::write(old.join("server0/target.dump"), b"{}").unwrap();

    let _storage = Storage::with_migration(&new, &old).unwrap();

    assert!(new.join("agent.dump").is_file());
    assert!(new.join("server0/target.dump").is_file());
    // Old tree was consumed
    assert!(!old.exists());
}

#[cfg(unix)]
#[test]
fn test_symlinks_removed_not_followed() {
    let dir = tempdir().unwrap();
    let old = dir.path().join("old");
    let new = dir.path().join("new");
    let outside = dir.path().join("outside.dump");
    std::fs::create_dir_all(&old).unwrap();
    std::fs::write(&outside, b"{}").unwrap();
    std::os::unix::fs::symlink(&outside, old.join("link.dump")).unwrap();

    let _storage = Storage::with_migration(&new, &old).unwrap();

    // Symlink removed, its destination untouched, nothing migrated
    assert!(!new.join("link.dump").exists());
    assert!(outside.is_file());
}

#[test]
fn test_no_migration_when_new_dir_exists() {
    let dir = tempdir().unwrap();
    let old = dir.path().join("old");
    let new = dir.path().join("new");
    std::fs::create_dir_all(&old).unwrap();
    std::fs::create_dir_all(&new).unwrap();
    std::fs::write(old.join("agent.dump"), b"{}").unwrap();

    let _storage = Storage::with_migration(&new, &old).unwrap();

    // Migration only fires when the new vardir is first created
    assert!(old.join("agent.dump").is_file());
    assert!(!new.join("agent.dump").exists());
}

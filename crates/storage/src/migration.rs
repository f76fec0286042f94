// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One-time vardir migration.
//!
//! Moves the content tree from an old vardir into the new one. Symlinks
//! are removed, never followed. Emptied source directories are pruned.

use std::fs;
use std::path::Path;

/// Move everything under `from` into `to`, then prune emptied dirs.
///
/// Errors on individual entries are logged and skipped; migration is
/// best-effort and only runs once, when the new vardir is first created.
pub(crate) fn migrate_var_dir(from: &Path, to: &Path) {
    if !from.is_dir() || !to.is_dir() {
        return;
    }
    migrate_dir(from, to);
    prune_empty(from);
}

fn migrate_dir(from: &Path, to: &Path) {
    let entries = match fs::read_dir(from) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::error!("can't read {}: {e}", from.display());
            return;
        }
    };

    for entry in entries.flatten() {
        let src = entry.path();
        let dest = to.join(entry.file_name());

        if src.is_symlink() {
            match fs::remove_file(&src) {
                Ok(()) => tracing::debug!("removed symlink {}", src.display()),
                Err(e) => tracing::error!("failed to remove symlink {}: {e}", src.display()),
            }
            continue;
        }

        if src.is_dir() {
            if !dest.is_dir() {
                if let Err(e) = fs::create_dir_all(&dest) {
                    tracing::error!("failed to create {}: {e}", dest.display());
                    continue;
                }
            }
            migrate_dir(&src, &dest);
            continue;
        }

        match fs::rename(&src, &dest) {
            Ok(()) => tracing::debug!("migrated {} -> {}", src.display(), dest.display()),
            Err(e) => tracing::error!("failed to migrate {}: {e}", src.display()),
        }
    }
}

fn prune_empty(dir: &Path) {
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() && !path.is_symlink() {
                prune_empty(&path);
            }
        }
    }
    match fs::remove_dir(dir) {
        Ok(()) => tracing::debug!("removed old directory {}", dir.display()),
        // Not empty or already gone; leave it
        Err(_) => {}
    }
}

#[cfg(test)]
#[path = "migration_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dump-file store with atomic writes and mtime change detection.

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;

use crate::migration::migrate_var_dir;

/// Errors that can occur in storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("can't create {0}: {1}")]
    Create(PathBuf, std::io::Error),
    #[error("can't write in {0}")]
    NotWritable(PathBuf),
    #[error("can't save {0}: {1}")]
    Save(PathBuf, std::io::Error),
    #[error("serialization error for {0}: {1}")]
    Serialize(PathBuf, serde_json::Error),
}

/// Persistent storage for one directory.
///
/// Each named blob lives in `{directory}/{name}.dump`. Writes go through
/// a temp file and rename, so a crash mid-write leaves the previous dump
/// intact. Interior mutability keeps the handle shareable between the
/// runtime and the listener threads.
pub struct Storage {
    directory: PathBuf,
    mtime: Mutex<HashMap<PathBuf, SystemTime>>,
    error: Mutex<Option<String>>,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").field("directory", &self.directory).finish()
    }
}

impl Storage {
    /// Open (creating if needed) a storage directory.
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self, StorageError> {
        Self::open(directory.into(), None)
    }

    /// Open a storage directory, migrating content from `oldvardir` the
    /// first time the new directory is created.
    pub fn with_migration(
        directory: impl Into<PathBuf>,
        oldvardir: impl AsRef<Path>,
    ) -> Result<Self, StorageError> {
        Self::open(directory.into(), Some(oldvardir.as_ref()))
    }

    fn open(directory: PathBuf, oldvardir: Option<&Path>) -> Result<Self, StorageError> {
        if !directory.is_dir() {
            fs::create_dir_all(&directory)
                .map_err(|e| StorageError::Create(directory.clone(), e))?;
            if let Some(old) = oldvardir {
                if old.is_dir() {
                    tracing::debug!(
                        "migrating storage from {} to {}",
                        old.display(),
                        directory.display()
                    );
                    migrate_var_dir(old, &directory);
                }
            }
        }

        let probe = directory.join(".write-check");
        match fs::File::create(&probe) {
            Ok(_) => {
                let _ = fs::remove_file(&probe);
            }
            Err(_) => return Err(StorageError::NotWritable(directory)),
        }

        Ok(Self {
            directory,
            mtime: Mutex::new(HashMap::new()),
            error: Mutex::new(None),
        })
    }

    /// The underlying directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn file_path(&self, name: &str) -> PathBuf {
        self.directory.join(format!("{name}.dump"))
    }

    /// True if a dump exists for this name.
    pub fn has(&self, name: &str) -> bool {
        self.file_path(name).is_file()
    }

    /// Save a blob under a name, atomically.
    ///
    /// On failure the last error is recorded and the attempted write
    /// time is cached so `modified` doesn't report a stale file forever.
    pub fn save<T: Serialize>(&self, name: &str, data: &T) -> Result<(), StorageError> {
        let path = self.file_path(name);
        match self.write_atomic(&path, data) {
            Ok(()) => {
                self.cache_mtime(&path);
                tracing::debug!("saved {}", path.display());
                Ok(())
            }
            Err(err) => {
                *self.error.lock() = Some(err.to_string());
                tracing::error!("{err}");
                self.mtime.lock().insert(path, SystemTime::now());
                Err(err)
            }
        }
    }

    fn write_atomic<T: Serialize>(&self, path: &Path, data: &T) -> Result<(), StorageError> {
        let payload = serde_json::to_vec(data)
            .map_err(|e| StorageError::Serialize(path.to_path_buf(), e))?;
        let tmp = path.with_extension("dump.tmp");
        let io = |e| StorageError::Save(path.to_path_buf(), e);
        let mut file = fs::File::create(&tmp).map_err(io)?;
        file.write_all(&payload).map_err(io)?;
        file.sync_all().map_err(io)?;
        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(io(e));
        }
        Ok(())
    }

    /// Restore a blob by name.
    ///
    /// Returns None when missing. A corrupt dump is removed and treated
    /// as missing.
    pub fn restore<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        let path = self.file_path(name);
        if !path.is_file() {
            return None;
        }

        let result = fs::read(&path)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok());
        if result.is_none() {
            tracing::error!("can't read corrupted {}, removing it", path.display());
            let _ = fs::remove_file(&path);
        } else {
            tracing::debug!("restored {}", path.display());
        }
        self.cache_mtime(&path);
        result
    }

    /// Delete the dump for a name. Missing files are not an error.
    pub fn remove(&self, name: &str) {
        let path = self.file_path(name);
        match fs::remove_file(&path) {
            Ok(()) => tracing::debug!("removed {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::error!("can't remove {}: {e}", path.display()),
        }
        self.mtime.lock().remove(&path);
    }

    /// True iff the dump on disk is newer than the last observed mtime.
    ///
    /// Never true for names this handle hasn't touched yet.
    pub fn modified(&self, name: &str) -> bool {
        let path = self.file_path(name);
        let cached = match self.mtime.lock().get(&path) {
            Some(&t) => t,
            None => return false,
        };
        fs::metadata(&path)
            .and_then(|m| m.modified())
            .map(|disk| disk > cached)
            .unwrap_or(false)
    }

    /// Take the last recorded save error, clearing it.
    pub fn take_error(&self) -> Option<String> {
        self.error.lock().take()
    }

    fn cache_mtime(&self, path: &Path) {
        if let Ok(mtime) = fs::metadata(path).and_then(|m| m.modified()) {
            self.mtime.lock().insert(path.to_path_buf(), mtime);
        }
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Change detection and the postpone engine.
//!
//! Every checked section gets a canonical digest; sections unchanged
//! since the previous submission are dropped from a partial inventory
//! until the postpone budget forces a full one.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::document::{Format, Inventory};
use crate::sections::{self, ALWAYS_KEEP_SECTIONS, CHECKED_SECTIONS};

/// Digest record for one section's canonical serialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionDigest {
    pub digest: String,
    pub len: u64,
}

/// The per-target last-state blob.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct LastState {
    #[serde(rename = "_postpone_count", default)]
    pub postpone_count: u32,
    #[serde(flatten)]
    pub sections: BTreeMap<String, SectionDigest>,
}

impl LastState {
    pub fn load(path: &Path) -> Option<Self> {
        let bytes = std::fs::read(path).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    fn save(&self, path: &Path) {
        let payload = match serde_json::to_vec(self) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::debug!("can't serialize last state: {e}");
                return;
            }
        };
        if let Err(e) = std::fs::write(path, payload) {
            tracing::debug!("can't create last state file, last state not saved: {e}");
        }
    }
}

/// What `compute_checksum` decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumOutcome {
    /// Sections stripped from this submission.
    pub dropped_sections: Vec<String>,
    /// The postpone counter after this run.
    pub postpone_count: u32,
}

impl Inventory {
    /// Path of the state file backing change detection for this
    /// document. Remote inventories are keyed by a stable remote
    /// identity instead of the target.
    pub fn last_state_path(&self) -> Option<PathBuf> {
        let statedir = self.statedir()?;
        if self.remote().is_some() {
            let remoteid = self
                .hardware("UUID")
                .or_else(|| self.bios("SSN"))
                .or_else(|| self.bios("MSN"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| self.device_id().to_string());
            Some(statedir.join(format!("last_remote_state-{remoteid}.json")))
        } else {
            Some(statedir.join("last_state.json"))
        }
    }

    /// Compute per-section digests, drop unchanged sections when a
    /// partial submission is allowed, and persist the updated state.
    ///
    /// `postpone_config` is the number of consecutive partial
    /// submissions allowed between two full ones; zero disables
    /// postponing entirely.
    pub fn compute_checksum(&mut self, postpone_config: u32) -> ChecksumOutcome {
        let state_path = self.last_state_path();
        let mut last_state = state_path
            .as_deref()
            .and_then(LastState::load)
            .unwrap_or_else(|| {
                if let Some(path) = state_path.as_deref() {
                    if !path.is_file() {
                        tracing::debug!("last state file '{}' doesn't exist", path.display());
                    }
                }
                LastState::default()
            });

        let mut current_count = last_state.postpone_count;
        // A full run was due; unless the caller forces partial, pin the
        // counter so this run goes full
        if current_count > postpone_config && !self.is_partial() {
            current_count = postpone_config;
        }

        let mut postpone = if postpone_config > 0 {
            (current_count + 1) % (postpone_config + 1)
        } else {
            0
        };
        // Forced partial past the budget: counter keeps climbing, next
        // unforced run goes full
        if self.is_partial() && current_count >= postpone_config {
            postpone = current_count + 1;
        }
        if self.format() != Format::Json {
            postpone = 0;
        }

        let keep_sections: Vec<String> = if postpone > 0 {
            sections::sections_for_categories(
                self.required_categories().iter().map(String::as_str),
            )
        } else {
            Vec::new()
        };

        let mut dropped = Vec::new();
        let mut keep_os = false;
        for &section in CHECKED_SECTIONS.iter() {
            let (digest, len) = section_checksum(section, self.content().get(section));

            if len == 0 {
                if last_state.sections.remove(section).is_some() {
                    tracing::debug!("section {section} has disappeared since last inventory");
                    postpone = 0;
                }
                continue;
            }

            let unchanged = last_state
                .sections
                .get(section)
                .map(|s| s.len == len && s.digest == digest)
                .unwrap_or(false);
            if unchanged {
                if postpone > 0
                    && !ALWAYS_KEEP_SECTIONS.contains(&section)
                    && !keep_sections.iter().any(|k| k == section)
                {
                    dropped.push(section.to_string());
                }
                continue;
            }

            if section == "SOFTWARES" {
                keep_os = true;
            }
            tracing::debug!("section {section} has changed since last inventory");
            last_state
                .sections
                .insert(section.to_string(), SectionDigest { digest, len });
        }

        if postpone > 0 && self.is_full() {
            postpone = 0;
            dropped.clear();
        }

        if postpone > 0 && !dropped.is_empty() {
            dropped.retain(|section| !(section == "OPERATINGSYSTEM" && keep_os));
            for section in &dropped {
                self.content_mut().remove(section);
                // Logged-user fields describe USERS content
                if section == "USERS" {
                    if let Some(Value::Object(hardware)) = self.content_mut().get_mut("HARDWARE") {
                        hardware.remove("LASTLOGGEDUSER");
                        hardware.remove("DATELASTLOGGEDUSER");
                    }
                }
            }
            self.set_partial(true);
        }

        if postpone_config > 0 {
            if self.is_partial() {
                tracing::debug!("full inventory postponed: {postpone}/{postpone_config}");
            } else {
                tracing::debug!("full inventory kept");
            }
            last_state.postpone_count = postpone;
        }

        if let Some(path) = state_path.as_deref() {
            last_state.save(path);
            if self.remote().is_some() {
                if let Some(statedir) = self.statedir() {
                    cleanup_old_remote_states(statedir);
                }
            }
        }

        ChecksumOutcome {
            dropped_sections: dropped,
            postpone_count: last_state.postpone_count,
        }
    }
}

/// Canonical digest and length for one section.
///
/// The canonical form concatenates `key:value.` fragments, with object
/// keys visited in sorted order and list items under their section key,
/// so semantically equal content always digests identically.
pub(crate) fn section_checksum(key: &str, value: Option<&Value>) -> (String, u64) {
    let mut sha = Sha256::new();
    let mut length = 0u64;
    if let Some(value) = value {
        checksum_value(key, value, &mut sha, &mut length);
    }
    (format!("{:x}", sha.finalize()), length)
}

fn checksum_value(key: &str, value: &Value, sha: &mut Sha256, length: &mut u64) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            for subkey in keys {
                if let Some(v) = map.get(subkey) {
                    checksum_value(subkey, v, sha, length);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                checksum_value(key, item, sha, length);
            }
        }
        Value::Null => {}
        Value::String(s) => {
            let fragment = format!("{key}:{s}.");
            sha.update(fragment.as_bytes());
            *length += fragment.len() as u64;
        }
        other => {
            let fragment = format!("{key}:{other}.");
            sha.update(fragment.as_bytes());
            *length += fragment.len() as u64;
        }
    }
}

const REMOTE_STATE_MAX_AGE_SECS: u64 = 30 * 86_400;
const REMOTE_CLEANUP_PERIOD_SECS: u64 = 3_600;

static NEXT_REMOTE_CLEANUP: AtomicU64 = AtomicU64::new(0);

/// Garbage-collect remote state files older than 30 days, at most once
/// an hour process-wide.
fn cleanup_old_remote_states(statedir: &Path) {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let next = NEXT_REMOTE_CLEANUP.load(Ordering::Relaxed);
    if now < next
        || NEXT_REMOTE_CLEANUP
            .compare_exchange(next, now + REMOTE_CLEANUP_PERIOD_SECS, Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
    {
        return;
    }

    let Ok(entries) = std::fs::read_dir(statedir) else {
        return;
    };
    let expired = SystemTime::now() - std::time::Duration::from_secs(REMOTE_STATE_MAX_AGE_SECS);
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.starts_with("last_remote_state-") || !name.ends_with(".json") {
            continue;
        }
        let old = entry
            .metadata()
            .and_then(|m| m.modified())
            .map(|mtime| mtime < expired)
            .unwrap_or(false);
        if old {
            let path = entry.path();
            if std::fs::remove_file(&path).is_ok() {
                tracing::debug!("deleted old remote state file: {}", path.display());
            }
        }
    }
}

#[cfg(test)]
#[path = "checksum_tests.rs"]
mod tests;

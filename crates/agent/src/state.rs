// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent agent identity.

use qm_core::{device_id, device_id_matches, AssetNamePolicy};
use qm_storage::Storage;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Storage key; the dump lands in `{vardir}/Quartermaster-Agent.dump`.
pub const STORAGE_KEY: &str = "Quartermaster-Agent";

/// Agent state persisted under the vardir.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentState {
    /// Stable `hostname-YYYY-MM-DD-HH-MM-SS`, computed at first run.
    pub deviceid: String,
    /// Created once, never mutated.
    pub agentid: Uuid,
    /// One-shot flag consumed on startup.
    #[serde(default)]
    pub forcerun: bool,
}

impl AgentState {
    /// Load the persisted state, creating or repairing it as needed.
    ///
    /// The deviceid is only invalidated when it no longer matches the
    /// asset-name policy; the agentid survives every repair.
    pub fn load_or_create(
        storage: &Storage,
        hostname: &str,
        policy: AssetNamePolicy,
        epoch_secs: u64,
    ) -> Self {
        let stored: Option<AgentState> = storage.restore(STORAGE_KEY);
        let state = match stored {
            Some(mut state) => {
                if !device_id_matches(&state.deviceid, hostname, policy) {
                    let fresh = device_id(hostname, policy, epoch_secs);
                    tracing::info!(
                        "deviceid {} no longer matches asset name policy, using {fresh}",
                        state.deviceid
                    );
                    state.deviceid = fresh;
                }
                state
            }
            None => Self {
                deviceid: device_id(hostname, policy, epoch_secs),
                agentid: Uuid::new_v4(),
                forcerun: false,
            },
        };
        let _ = storage.save(STORAGE_KEY, &state);
        state
    }

    /// Consume the forcerun flag, persisting the cleared state.
    pub fn take_forcerun(&mut self, storage: &Storage) -> bool {
        if !self.forcerun {
            return false;
        }
        self.forcerun = false;
        let _ = storage.save(STORAGE_KEY, self);
        true
    }

    /// Persist the forcerun flag so the next start runs immediately.
    pub fn set_forcerun(&mut self, storage: &Storage) {
        self.forcerun = true;
        let _ = storage.save(STORAGE_KEY, self);
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;

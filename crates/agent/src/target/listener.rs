// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener target: receives inventories instead of producing them.
//!
//! Holds the session table for remote peers, lazily restored from
//! storage and debounced back to disk.

use parking_lot::Mutex;
use qm_storage::Storage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Storage key for the session table.
const SESSIONS_KEY: &str = "Sessions";

/// Minimum delay between session stores, seconds.
const STORE_SESSION_TIMEOUT: u64 = 10;

/// Default session lifetime, seconds.
const SESSION_LIFETIME: u64 = 600;

/// One remote peer session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub remoteid: String,
    /// Absolute expiration, epoch seconds.
    pub expires: u64,
}

impl Session {
    pub fn new(remoteid: &str, now: u64) -> Self {
        Self {
            remoteid: remoteid.to_string(),
            expires: now + SESSION_LIFETIME,
        }
    }

    pub fn expired(&self, now: u64) -> bool {
        self.expires <= now
    }
}

#[derive(Default)]
struct SessionTable {
    sessions: HashMap<String, Session>,
    restored: bool,
    touched: bool,
    last_store: u64,
}

/// The singleton listener target state.
pub struct ListenerTarget {
    storage: Arc<Storage>,
    table: Mutex<SessionTable>,
    /// Last inventory received over HTTP, kept in memory for pickup.
    inventory: Mutex<Option<Vec<u8>>>,
}

fn wall_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

impl ListenerTarget {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            table: Mutex::new(SessionTable::default()),
            inventory: Mutex::new(None),
        }
    }

    /// Store an inventory handed over by a task or a remote agent.
    pub fn set_inventory(&self, inventory: Vec<u8>) {
        *self.inventory.lock() = Some(inventory);
    }

    /// Take the pending inventory, if any.
    pub fn take_inventory(&self) -> Option<Vec<u8>> {
        self.inventory.lock().take()
    }

    /// Get or create the session for a remote id. Expired sessions are
    /// replaced.
    pub fn session(&self, remoteid: &str) -> Session {
        let now = wall_now();
        let mut table = self.table.lock();
        self.restore_locked(&mut table, now);

        match table.sessions.get(remoteid) {
            Some(session) if !session.expired(now) => session.clone(),
            existing => {
                if existing.is_some() {
                    tracing::debug!("session expired, creating new: {remoteid}");
                }
                let session = Session::new(remoteid, now);
                table.sessions.insert(remoteid.to_string(), session.clone());
                table.touched = true;
                drop(table);
                self.store_sessions();
                session
            }
        }
    }

    pub fn clean_session(&self, remoteid: &str) {
        let mut table = self.table.lock();
        if table.sessions.remove(remoteid).is_some() {
            table.touched = true;
        }
        drop(table);
        self.store_sessions();
    }

    /// Scrub expired sessions and persist if anything changed.
    pub fn keep_sessions(&self) {
        let now = wall_now();
        let mut table = self.table.lock();
        self.restore_locked(&mut table, now);
        let before = table.sessions.len();
        table.sessions.retain(|_, session| !session.expired(now));
        let removed = before - table.sessions.len();
        if removed > 0 {
            tracing::debug!("removed {removed} expired sessions");
            table.touched = true;
        }
        drop(table);
        self.store_sessions();
    }

    pub fn sessions_count(&self) -> usize {
        let mut table = self.table.lock();
        self.restore_locked(&mut table, wall_now());
        table.sessions.len()
    }

    /// Persist the table, debounced: at most once every 10 s, and only
    /// when touched. Always runs while holding the table lock.
    fn store_sessions(&self) {
        let now = wall_now();
        let mut table = self.table.lock();
        if !table.touched || now < table.last_store + STORE_SESSION_TIMEOUT {
            return;
        }
        let live: HashMap<String, Session> = table
            .sessions
            .iter()
            .filter(|(_, session)| !session.expired(now))
            .map(|(id, session)| (id.clone(), session.clone()))
            .collect();
        if self.storage.save(SESSIONS_KEY, &live).is_ok() {
            table.touched = false;
            table.last_store = now;
        }
    }

    /// Force a store regardless of the debounce, for shutdown.
    pub fn flush_sessions(&self) {
        let mut table = self.table.lock();
        if !table.touched {
            return;
        }
        let _ = self.storage.save(SESSIONS_KEY, &table.sessions);
        table.touched = false;
        table.last_store = wall_now();
    }

    fn restore_locked(&self, table: &mut SessionTable, now: u64) {
        if table.restored {
            return;
        }
        table.restored = true;
        let Some(stored) = self.storage.restore::<HashMap<String, Session>>(SESSIONS_KEY)
        else {
            return;
        };
        let before = stored.len();
        table.sessions = stored
            .into_iter()
            .filter(|(_, session)| !session.expired(now))
            .collect();
        let discarded = before - table.sessions.len();
        if discarded > 0 {
            tracing::debug!("restored sessions ({discarded} expired sessions discarded)");
        }
    }
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ordered event queue with storm protection.

use crate::event::{Event, EventKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Queue capacity; adding beyond the bound drops the new event.
pub const MAX_EVENTS: usize = 1024;

/// Per-name cool-down, seconds. Repeated adds of the same event name
/// inside this window are dropped unless the caller sets `safe`.
pub const EVENT_COOLDOWN_SECS: u64 = 15;

/// Events ordered ascending by rundate, insertion order as tie-break.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct EventQueue {
    events: Vec<Event>,
    /// name → last accepted insert time. Runtime-only storm guard;
    /// repopulates as events are added after a restart.
    #[serde(skip)]
    cooldown: HashMap<String, u64>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an event, keeping the queue sorted by rundate.
    ///
    /// `safe` bypasses the cool-down for programmatic inserts. Returns
    /// false when the event was dropped (cool-down, capacity).
    pub fn add(&mut self, event: Event, now: u64, safe: bool) -> bool {
        if !safe {
            if let Some(&last) = self.cooldown.get(&event.name) {
                if now < last + EVENT_COOLDOWN_SECS {
                    tracing::debug!("event \"{}\" dropped by cool-down", event.name);
                    return false;
                }
            }
        }

        // A newer partial supersedes any queued partial; a maintenance
        // event replaces the one for the same (task, target).
        match &event.kind {
            EventKind::Partial { .. } => {
                self.events.retain(|e| !e.is_partial());
            }
            EventKind::Maintenance { task, target } => {
                self.events.retain(|e| {
                    !matches!(&e.kind, EventKind::Maintenance { task: t, target: g }
                        if t == task && g == target)
                });
            }
            _ => {}
        }

        if self.events.len() >= MAX_EVENTS {
            tracing::debug!("event \"{}\" dropped, queue is full", event.name);
            return false;
        }

        let pos = self.events.partition_point(|e| e.rundate <= event.rundate);
        self.cooldown.insert(event.name.clone(), now);
        self.events.insert(pos, event);
        true
    }

    /// Pop the head iff its rundate is due.
    pub fn next(&mut self, now: u64) -> Option<Event> {
        match self.events.first() {
            Some(head) if head.rundate <= now => Some(self.events.remove(0)),
            _ => None,
        }
    }

    /// Remove all events with the given name.
    pub fn delete(&mut self, name: &str) {
        self.events.retain(|e| e.name != name);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Targets: the destinations the agent schedules work against.
//!
//! Each target owns its schedule, its event queue, its persistent
//! storage directory, and (servers) the learned protocol
//! capabilities.

mod listener;
mod server;

pub use listener::{ListenerTarget, Session};
pub use server::{canonical_url, ServerTarget, TaskSupportRecord};

use parking_lot::Mutex;
use qm_core::{backoff_delay, initial_delay, next_run_date, Event, EventKind, EventQueue};
use qm_storage::Storage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Ceiling for error backoff, resolved from `delaytime` once per
/// process.
const DEFAULT_ERR_MAX_DELAY: u64 = 3_600;

/// Target flavor and its specific state.
pub enum TargetKind {
    Server(ServerTarget),
    Local {
        /// Output directory or `-` for stdout.
        path: PathBuf,
        format: String,
    },
    Listener(ListenerTarget),
}

#[derive(Debug, Default)]
struct Scheduling {
    max_delay: u64,
    err_max_delay: u64,
    /// First-run spread; cleared after use.
    initial_delay: Option<u64>,
    base_run_date: Option<u64>,
    next_run_date: Option<u64>,
    /// Last retry delay, doubled on consecutive failures.
    next_run_delay: u64,
    /// Set by `set_next_run_on_expiration`; makes the next reset a
    /// no-op.
    expiration: Option<u64>,
    paused: bool,
}

/// Persisted schedule state, under the target's storage key `target`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct TargetDump {
    max_delay: u64,
    next_run_date: Option<u64>,
    base_run_date: Option<u64>,
    #[serde(default)]
    is_glpi_server: bool,
    #[serde(default)]
    task_support: HashMap<String, TaskSupportRecord>,
}

pub struct Target {
    id: String,
    kind: TargetKind,
    storage: Arc<Storage>,
    scheduling: Mutex<Scheduling>,
    queue: Mutex<EventQueue>,
    planned_tasks: Mutex<Vec<String>>,
}

impl Target {
    /// Build a target, loading its persisted schedule and planning its
    /// first run.
    ///
    /// `initial_delay` is the configured first-run spread; it only
    /// applies when no valid schedule was restored.
    pub fn new(
        id: String,
        kind: TargetKind,
        storage: Storage,
        max_delay: u64,
        initial_delay_secs: Option<u64>,
        now: u64,
    ) -> Self {
        let target = Self {
            id,
            kind,
            storage: Arc::new(storage),
            scheduling: Mutex::new(Scheduling {
                max_delay,
                err_max_delay: initial_delay_secs.unwrap_or(DEFAULT_ERR_MAX_DELAY),
                initial_delay: initial_delay_secs,
                ..Scheduling::default()
            }),
            queue: Mutex::new(EventQueue::new()),
            planned_tasks: Mutex::new(Vec::new()),
        };
        target.load_state(max_delay);

        {
            let mut sched = target.scheduling.lock();
            let limit = now.saturating_sub(sched.max_delay);

            // A restored schedule in range voids the initial delay
            if sched.initial_delay.is_some()
                && sched.next_run_date.map(|next| next >= limit).unwrap_or(false)
            {
                sched.initial_delay = None;
            }
            if sched.base_run_date.map(|base| base <= limit).unwrap_or(true) {
                let delay = sched.initial_delay.unwrap_or(sched.max_delay);
                sched.base_run_date = Some(now + delay);
            }
            if sched.next_run_date.map(|next| next < limit).unwrap_or(true) {
                let next = compute_next_run_date(&mut sched, now);
                sched.next_run_date = Some(next);
            }
            if sched.initial_delay.is_some()
                && sched.next_run_date.map(|next| next > now).unwrap_or(false)
            {
                sched.initial_delay = None;
            }
        }
        target.save_state();

        let next = target.next_run_date();
        if next <= now {
            tracing::debug!("target {}: next run planned now", target.id);
        } else {
            tracing::debug!("target {}: next run planned at {next}", target.id);
        }
        target
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &TargetKind {
        &self.kind
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    pub fn is_type(&self, kind: &str) -> bool {
        matches!(
            (&self.kind, kind),
            (TargetKind::Server(_), "server")
                | (TargetKind::Local { .. }, "local")
                | (TargetKind::Listener(_), "listener")
        )
    }

    /// Human description: type plus URL or path.
    pub fn description(&self) -> String {
        match &self.kind {
            TargetKind::Server(server) => format!("server: {}", server.url()),
            TargetKind::Local { path, .. } => format!("local: {}", path.display()),
            TargetKind::Listener(_) => "listener".to_string(),
        }
    }

    pub fn server(&self) -> Option<&ServerTarget> {
        match &self.kind {
            TargetKind::Server(server) => Some(server),
            _ => None,
        }
    }

    pub fn listener(&self) -> Option<&ListenerTarget> {
        match &self.kind {
            TargetKind::Listener(listener) => Some(listener),
            _ => None,
        }
    }

    // -- planned tasks --

    /// Install the execution plan, filtered per target flavor: local
    /// and listener targets only ever run inventory-family tasks.
    pub fn set_planned_tasks(&self, plan: Vec<String>) {
        let filtered: Vec<String> = match &self.kind {
            TargetKind::Server(_) => plan,
            TargetKind::Local { .. } | TargetKind::Listener(_) => plan
                .into_iter()
                .filter(|task| task.eq_ignore_ascii_case("inventory"))
                .collect(),
        };
        *self.planned_tasks.lock() = filtered;
    }

    pub fn planned_tasks(&self) -> Vec<String> {
        self.planned_tasks.lock().clone()
    }

    // -- scheduling --

    pub fn next_run_date(&self) -> u64 {
        // Another process may have advanced the schedule on disk
        if self.storage.modified("target") {
            let keep = self.scheduling.lock().max_delay;
            self.load_state(keep);
        }
        self.scheduling.lock().next_run_date.unwrap_or(0)
    }

    pub fn base_run_date(&self) -> u64 {
        self.scheduling.lock().base_run_date.unwrap_or(0)
    }

    pub fn max_delay(&self) -> u64 {
        self.scheduling.lock().max_delay
    }

    pub fn set_max_delay(&self, max_delay: u64) {
        self.scheduling.lock().max_delay = max_delay;
        self.save_state();
    }

    pub fn paused(&self) -> bool {
        self.scheduling.lock().paused
    }

    /// Freeze scheduling without losing state.
    pub fn pause(&self) {
        self.scheduling.lock().paused = true;
    }

    pub fn resume(&self) {
        self.scheduling.lock().paused = false;
    }

    /// Plan the next regular run one period after the base date, with
    /// the usual random reduction.
    pub fn reset_next_run_date(&self, now: u64) {
        let mut sched = self.scheduling.lock();
        if sched.expiration.take().is_some() {
            return;
        }
        let mut timeref = sched.base_run_date.unwrap_or(now);
        if timeref < now.saturating_sub(sched.max_delay) || timeref > now + sched.max_delay {
            timeref = now;
        }
        sched.next_run_delay = 0;
        let next = compute_next_run_date(&mut sched, timeref);
        sched.next_run_date = Some(next);
        sched.base_run_date = Some(timeref + sched.max_delay);
        drop(sched);
        self.save_state();
    }

    /// Plan the next run `delay` seconds from now; consecutive calls
    /// double the delay up to the error ceiling.
    pub fn set_next_run_date_from_now(&self, delay: u64, now: u64) {
        let mut sched = self.scheduling.lock();
        let delay = if delay > 0 {
            let delay =
                backoff_delay(delay, sched.next_run_delay, sched.max_delay, sched.err_max_delay);
            sched.next_run_delay = delay;
            delay
        } else {
            0
        };
        sched.next_run_date = Some(now + delay);
        sched.base_run_date = sched.next_run_date;
        sched.initial_delay = None;
        drop(sched);
        self.save_state();
    }

    /// Plan the next run at a server-advertised expiration.
    pub fn set_next_run_on_expiration(&self, expiration: u64, now: u64) {
        let mut sched = self.scheduling.lock();
        sched.next_run_date = Some(now + expiration);
        sched.base_run_date = sched.next_run_date;
        sched.expiration = Some(expiration);
        drop(sched);
        self.save_state();
    }

    /// Advance the next run to now.
    pub fn run_now(&self, now: u64) {
        self.set_next_run_date_from_now(0, now);
    }

    // -- events --

    pub fn add_event(&self, event: Event, now: u64, safe: bool) -> bool {
        self.queue.lock().add(event, now, safe)
    }

    pub fn del_event(&self, name: &str) {
        self.queue.lock().delete(name);
    }

    /// The head event iff it is due.
    pub fn next_event(&self, now: u64) -> Option<Event> {
        self.queue.lock().next(now)
    }

    /// True when the head event is due, without consuming it.
    pub fn next_event_ready(&self, now: u64) -> bool {
        self.queue
            .lock()
            .iter()
            .next()
            .map(|event| event.rundate <= now)
            .unwrap_or(false)
    }

    pub fn events_len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Post one init event per planned task.
    pub fn trigger_task_init_events(&self, now: u64) {
        for task in self.planned_tasks() {
            self.add_event(Event::init(&task, now), now, true);
        }
    }

    /// Expand a taskrun event for one or all planned tasks.
    ///
    /// In an all-tasks expansion the rescheduling event goes last so
    /// the normal plan resumes afterwards.
    pub fn trigger_run_tasks_now(&self, event: &Event, now: u64) {
        let EventKind::TaskRun { task, full, partial, reschedule } = &event.kind else {
            return;
        };
        if task.eq_ignore_ascii_case("all") {
            let planned = self.planned_tasks();
            let last = planned.len().saturating_sub(1);
            for (index, name) in planned.iter().enumerate() {
                let reschedule = *reschedule && index == last;
                self.add_event(
                    Event::taskrun(name, *full, *partial, reschedule, now),
                    now,
                    true,
                );
            }
        } else {
            self.add_event(
                Event::taskrun(task, *full, *partial, *reschedule, now),
                now,
                true,
            );
        }
    }

    // -- persistence --

    fn load_state(&self, keep_max_delay: u64) {
        let Some(dump) = self.storage.restore::<TargetDump>("target") else {
            return;
        };
        {
            let mut sched = self.scheduling.lock();
            sched.max_delay = dump.max_delay;
            sched.next_run_date = dump.next_run_date;
            sched.base_run_date = dump.base_run_date;
            // Only server targets keep their learned delay
            if !matches!(self.kind, TargetKind::Server(_)) {
                sched.max_delay = keep_max_delay;
            }
        }
        if let TargetKind::Server(server) = &self.kind {
            server.restore(dump.is_glpi_server, dump.task_support);
        }
    }

    pub(crate) fn save_state(&self) {
        let dump = {
            let sched = self.scheduling.lock();
            let (is_glpi_server, task_support) = match &self.kind {
                TargetKind::Server(server) => (server.is_glpi_server(), server.task_support()),
                _ => (false, HashMap::new()),
            };
            TargetDump {
                max_delay: sched.max_delay,
                next_run_date: sched.next_run_date,
                base_run_date: sched.base_run_date,
                is_glpi_server,
                task_support,
            }
        };
        let _ = self.storage.save("target", &dump);
    }
}

fn compute_next_run_date(sched: &mut Scheduling, timeref: u64) -> u64 {
    let mut rng = rand::thread_rng();
    match sched.initial_delay.take() {
        Some(delay) => timeref + initial_delay(delay, &mut rng),
        None => next_run_date(timeref, sched.max_delay, &mut rng),
    }
}

/// Storage subdirectory for a target: the URL or path with `/` mapped
/// to `_`, and `:` mapped to `..` on windows.
pub fn storage_subdir(name: &str) -> String {
    let subdir = name.replace('/', "_");
    if cfg!(windows) {
        subdir.replace(':', "..")
    } else {
        subdir
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;

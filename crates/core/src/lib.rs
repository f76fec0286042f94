// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! qm-core: core types for the Quartermaster agent
//!
//! Events, the per-target event queue, schedule arithmetic, the clock
//! abstraction, and the unit-conversion helpers shared by the inventory
//! and task crates.

pub mod clock;
pub mod event;
pub mod identity;
pub mod queue;
pub mod schedule;
pub mod tools;

pub use clock::{Clock, FakeClock, SystemClock};
pub use event::{Event, EventKind};
pub use identity::{device_id, device_id_matches, short_hostname, AssetNamePolicy};
pub use queue::{EventQueue, EVENT_COOLDOWN_SECS, MAX_EVENTS};
pub use schedule::{backoff_delay, initial_delay, max_random, next_run_date};
pub use tools::{canonical_size, numeric_mac, primary_mac};

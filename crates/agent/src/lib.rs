// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Quartermaster agent runtime.
//!
//! Configuration layering, targets and their schedules, the logger,
//! persistent agent state, and the main loop driving tasks against
//! ready targets.

pub mod agent;
pub mod config;
pub mod daemon;
pub mod logger;
pub mod state;
pub mod target;

pub use agent::{Agent, AgentError};
pub use config::{Config, ConfigError};
pub use state::AgentState;
pub use target::{Target, TargetKind};

/// Product name; storage keys and banners derive from it.
pub const PROVIDER: &str = qm_inventory::PROVIDER;

/// Agent version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

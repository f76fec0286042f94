// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Embedded HTTP server.
//!
//! A multi-listener, plugin-dispatched endpoint that receives remote
//! control requests (`/now`, `/status`), serves deploy file parts, and
//! renders a status page. Trust evaluation gates everything sensitive.

pub mod handlers;
pub mod plugin;
pub mod server;
pub mod trust;

pub use plugin::{Plugin, PluginRequest, SslPlugin};
pub use server::{AgentHandle, HttpdConfig, HttpdError, Server};
pub use trust::TrustCache;

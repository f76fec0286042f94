// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Built-in probe modules.
//!
//! These are the minimal host probes shipped with the agent; richer
//! per-OS probes plug into the same [`crate::Module`] trait.

mod cpu;
mod environment;
mod hostname;
mod memory;
mod networks;
mod os;
mod provider;

use crate::module::Module;
use std::sync::Arc;

/// All probes compiled into this build.
pub fn builtin_modules() -> Vec<Arc<dyn Module>> {
    vec![
        Arc::new(hostname::Hostname),
        Arc::new(os::OperatingSystem),
        Arc::new(cpu::Cpu),
        Arc::new(memory::Memory),
        Arc::new(networks::Networks),
        Arc::new(environment::Environment),
        Arc::new(provider::Provider),
    ]
}

/// Set string fields on a record builder, dropping empties.
pub(crate) fn record(
    fields: &[(&str, Option<serde_json::Value>)],
) -> serde_json::Map<String, serde_json::Value> {
    let mut map = serde_json::Map::new();
    for (key, value) in fields {
        if let Some(value) = value {
            map.insert(key.to_string(), value.clone());
        }
    }
    map
}

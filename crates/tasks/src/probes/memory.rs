// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Physical memory and swap totals.

use parking_lot::Mutex;
use qm_core::canonical_size;
use qm_inventory::Inventory;
use serde_json::Value;
use std::fs;
use std::path::Path;

use super::record;
use crate::module::{Module, ModuleContext};

pub(super) struct Memory;

fn meminfo_mb(text: &str, field: &str) -> Option<u64> {
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix(field) {
            let size = rest.trim_start_matches(':').trim();
            // Memory sizes are binary: 16384000 kB is 16000 MB
            return canonical_size(size, 1024).map(|mb| mb as u64);
        }
    }
    None
}

impl Module for Memory {
    fn name(&self) -> &'static str {
        "generic::memory"
    }

    fn category(&self) -> &'static str {
        "memory"
    }

    fn run_after_if_enabled(&self) -> &'static [&'static str] {
        &["generic::hostname"]
    }

    fn is_enabled(&self, ctx: &ModuleContext) -> bool {
        ctx.remote.is_none() && Path::new("/proc/meminfo").is_file()
    }

    fn do_inventory(&self, _ctx: &ModuleContext, inventory: &Mutex<Inventory>) {
        let Ok(text) = fs::read_to_string("/proc/meminfo") else {
            return;
        };
        inventory.lock().set_hardware(record(&[
            (
                "MEMORY",
                meminfo_mb(&text, "MemTotal").map(|n| Value::Number(n.into())),
            ),
            (
                "SWAP",
                meminfo_mb(&text, "SwapTotal").map(|n| Value::Number(n.into())),
            ),
        ]));
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

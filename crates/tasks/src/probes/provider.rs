// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent self-identification probe.

use parking_lot::Mutex;
use qm_inventory::{Inventory, PROVIDER};
use serde_json::Value;

use super::record;
use crate::module::{Module, ModuleContext};

pub(super) struct Provider;

impl Module for Provider {
    fn name(&self) -> &'static str {
        "generic::provider"
    }

    fn category(&self) -> &'static str {
        "provider"
    }

    fn is_enabled(&self, _ctx: &ModuleContext) -> bool {
        true
    }

    fn do_inventory(&self, _ctx: &ModuleContext, inventory: &Mutex<Inventory>) {
        let program = std::env::current_exe()
            .ok()
            .map(|p| Value::String(p.to_string_lossy().to_string()));
        let _ = inventory.lock().add_entry(
            "VERSIONPROVIDER",
            record(&[
                ("NAME", Some(Value::String(PROVIDER.to_string()))),
                (
                    "VERSION",
                    Some(Value::String(env!("CARGO_PKG_VERSION").to_string())),
                ),
                ("PROGRAM", program),
            ]),
        );
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Asset name probe.

use parking_lot::Mutex;
use qm_inventory::Inventory;
use serde_json::Value;

use super::record;
use crate::module::{Module, ModuleContext};

pub(super) struct Hostname;

impl Module for Hostname {
    fn name(&self) -> &'static str {
        "generic::hostname"
    }

    fn category(&self) -> &'static str {
        "hardware"
    }

    fn is_enabled(&self, ctx: &ModuleContext) -> bool {
        ctx.remote.is_none()
    }

    fn do_inventory(&self, ctx: &ModuleContext, inventory: &Mutex<Inventory>) {
        let Some(name) = hostname::get().ok().and_then(|h| h.into_string().ok()) else {
            return;
        };
        let name = ctx.assetname_support.apply(&name).to_string();
        inventory.lock().set_hardware(record(&[
            ("NAME", Some(Value::String(name))),
        ]));
    }
}

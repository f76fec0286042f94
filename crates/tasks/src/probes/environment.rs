// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process environment probe.

use parking_lot::Mutex;
use qm_inventory::Inventory;
use serde_json::Value;

use super::record;
use crate::module::{Module, ModuleContext};

pub(super) struct Environment;

impl Module for Environment {
    fn name(&self) -> &'static str {
        "generic::environment"
    }

    fn category(&self) -> &'static str {
        "environment"
    }

    fn is_enabled(&self, ctx: &ModuleContext) -> bool {
        ctx.remote.is_none()
    }

    fn do_inventory(&self, _ctx: &ModuleContext, inventory: &Mutex<Inventory>) {
        let mut inventory = inventory.lock();
        for (key, value) in std::env::vars() {
            if key.is_empty() {
                continue;
            }
            let _ = inventory.add_entry(
                "ENVS",
                record(&[
                    ("KEY", Some(Value::String(key))),
                    ("VAL", Some(Value::String(value))),
                ]),
            );
        }
    }
}

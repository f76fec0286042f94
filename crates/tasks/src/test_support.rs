// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test doubles for the module pipeline.

use parking_lot::Mutex;
use qm_inventory::Inventory;
use serde_json::json;

use crate::module::{Module, ModuleContext};

/// A scriptable module that records its execution as an ENVS entry.
pub struct FakeModule {
    name: &'static str,
    category: &'static str,
    enabled: bool,
    run_after: &'static [&'static str],
    run_after_if_enabled: &'static [&'static str],
    fallback_for: &'static [&'static str],
}

impl FakeModule {
    pub fn new(name: &'static str, category: &'static str) -> Self {
        Self {
            name,
            category,
            enabled: true,
            run_after: &[],
            run_after_if_enabled: &[],
            fallback_for: &[],
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn with_run_after(mut self, deps: &'static [&'static str]) -> Self {
        self.run_after = deps;
        self
    }

    pub fn with_run_after_if_enabled(mut self, deps: &'static [&'static str]) -> Self {
        self.run_after_if_enabled = deps;
        self
    }

    pub fn with_fallback_for(mut self, others: &'static [&'static str]) -> Self {
        self.fallback_for = others;
        self
    }
}

impl Module for FakeModule {
    fn name(&self) -> &'static str {
        self.name
    }

    fn category(&self) -> &'static str {
        self.category
    }

    fn run_after(&self) -> &'static [&'static str] {
        self.run_after
    }

    fn run_after_if_enabled(&self) -> &'static [&'static str] {
        self.run_after_if_enabled
    }

    fn run_me_if_these_checks_failed(&self) -> &'static [&'static str] {
        self.fallback_for
    }

    fn is_enabled(&self, _ctx: &ModuleContext) -> bool {
        self.enabled
    }

    fn do_inventory(&self, _ctx: &ModuleContext, inventory: &Mutex<Inventory>) {
        let record = match json!({ "KEY": self.name, "VAL": "ran" }) {
            serde_json::Value::Object(map) => map,
            _ => return,
        };
        let _ = inventory.lock().add_entry("ENVS", record);
    }
}

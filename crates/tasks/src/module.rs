// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Probe modules and their registry.
//!
//! A module discovers one category of facts and feeds the shared
//! inventory document. Modules register explicitly through
//! [`ModuleRegistry`]; the planner orders them through their declared
//! dependencies, so no filesystem scanning happens at runtime.

use parking_lot::Mutex;
use qm_core::AssetNamePolicy;
use qm_inventory::Inventory;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

/// What the pipeline provides to each module entry point.
#[derive(Debug, Clone, Default)]
pub struct ModuleContext {
    pub datadir: Option<PathBuf>,
    pub deviceid: String,
    pub agentid: String,
    /// Remote context when inventorying another device.
    pub remote: Option<String>,
    pub scan_homedirs: bool,
    pub scan_profiles: bool,
    pub assetname_support: AssetNamePolicy,
    /// Parsed `--credentials` entries.
    pub credentials: Vec<Map<String, Value>>,
    /// Per-run probe parameters from the server contact answer.
    pub params: Vec<Map<String, Value>>,
    /// Categories the run must not collect.
    pub disabled_categories: HashSet<String>,
}

impl ModuleContext {
    pub fn category_disabled(&self, category: &str) -> bool {
        self.disabled_categories.contains(category)
    }
}

/// A pluggable collection module.
///
/// `is_enabled` and `do_inventory` run on the blocking pool under the
/// per-module timeout; both must tolerate being abandoned mid-run.
pub trait Module: Send + Sync {
    /// Hierarchical module name, e.g. `generic::cpu`. Dependency
    /// declarations refer to these names.
    fn name(&self) -> &'static str;

    /// Main user-facing category this module feeds.
    fn category(&self) -> &'static str;

    /// Extra categories fed besides the main one.
    fn other_categories(&self) -> &'static [&'static str] {
        &[]
    }

    /// Hard predecessors: must exist, be enabled, and run first.
    fn run_after(&self) -> &'static [&'static str] {
        &[]
    }

    /// Soft predecessors: run first when enabled, ignored otherwise.
    fn run_after_if_enabled(&self) -> &'static [&'static str] {
        &[]
    }

    /// Fallback rule: this module is disabled iff any of the listed
    /// modules is enabled.
    fn run_me_if_these_checks_failed(&self) -> &'static [&'static str] {
        &[]
    }

    fn is_enabled(&self, ctx: &ModuleContext) -> bool;

    fn do_inventory(&self, ctx: &ModuleContext, inventory: &Mutex<Inventory>);
}

/// Explicit module registry.
#[derive(Default, Clone)]
pub struct ModuleRegistry {
    modules: Vec<Arc<dyn Module>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in probe set.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for module in crate::probes::builtin_modules() {
            registry.register(module);
        }
        registry
    }

    pub fn register(&mut self, module: Arc<dyn Module>) {
        self.modules.push(module);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Module>> {
        self.modules.iter().find(|m| m.name() == name)
    }

    /// Module names, sorted for deterministic traversal.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.modules.iter().map(|m| m.name()).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// All categories declared by registered modules, sorted.
    pub fn categories(&self) -> Vec<&'static str> {
        let mut categories: HashSet<&'static str> = HashSet::new();
        for module in &self.modules {
            categories.insert(module.category());
            categories.extend(module.other_categories());
        }
        let mut categories: Vec<&'static str> = categories.into_iter().collect();
        categories.sort_unstable();
        categories
    }
}

#[cfg(test)]
#[path = "module_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Module dependency resolution and ordered execution.

use parking_lot::Mutex;
use qm_inventory::Inventory;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::module::{ModuleContext, ModuleRegistry};
use crate::runner::{run_with_timeout, AbortFlag};
use crate::task::TaskError;

#[derive(Debug, Default, Clone)]
struct ModuleState {
    enabled: bool,
    done: bool,
    /// DFS marker; a revisit while set is a dependency cycle.
    in_progress: bool,
    run_after: Vec<&'static str>,
    soft: HashSet<&'static str>,
}

/// The per-run plan over the module registry.
///
/// Built in two passes: `is_enabled` probes under timeout, then the
/// fallback rules (`run_me_if_these_checks_failed`). Execution follows
/// dependency order with alphabetical traversal among peers.
pub struct ModulePlan {
    states: BTreeMap<&'static str, ModuleState>,
}

impl ModulePlan {
    /// Probe every registered module and build the plan.
    pub async fn init(
        registry: &ModuleRegistry,
        ctx: &Arc<ModuleContext>,
        timeout_secs: u64,
        abort: &AbortFlag,
    ) -> Result<Self, TaskError> {
        if registry.is_empty() {
            return Err(TaskError::NoModules);
        }

        let mut states: BTreeMap<&'static str, ModuleState> = BTreeMap::new();

        for name in registry.names() {
            if abort.is_raised() {
                return Err(TaskError::Aborted);
            }
            #[allow(clippy::expect_used)]
            let module = registry.get(name).expect("names come from the registry");

            let category = module.category();
            if ctx.category_disabled(category) {
                tracing::trace!("module {name} disabled: '{category}' category disabled");
                states.insert(name, ModuleState::default());
                continue;
            }

            let probe = Arc::clone(module);
            let probe_ctx = Arc::clone(ctx);
            let enabled =
                run_with_timeout(name, "isEnabled", timeout_secs, move || {
                    probe.is_enabled(&probe_ctx)
                })
                .await
                .unwrap_or(false);
            if !enabled {
                tracing::trace!("module {name} disabled");
                states.insert(name, ModuleState::default());
                continue;
            }

            states.insert(
                name,
                ModuleState {
                    enabled: true,
                    done: false,
                    in_progress: false,
                    run_after: module
                        .run_after()
                        .iter()
                        .chain(module.run_after_if_enabled())
                        .copied()
                        .collect(),
                    soft: module.run_after_if_enabled().iter().copied().collect(),
                },
            );
        }

        // Fallback modules only run when everything they stand in for
        // is disabled
        for name in registry.names() {
            if !states.get(name).map(|s| s.enabled).unwrap_or(false) {
                continue;
            }
            #[allow(clippy::expect_used)]
            let module = registry.get(name).expect("names come from the registry");
            let blocking = module
                .run_me_if_these_checks_failed()
                .iter()
                .find(|other| states.get(**other).map(|s| s.enabled).unwrap_or(false));
            if let Some(other) = blocking {
                tracing::debug!("module {name} disabled because of {other}");
                if let Some(state) = states.get_mut(name) {
                    state.enabled = false;
                }
            }
        }

        Ok(Self { states })
    }

    /// Names of enabled modules, alphabetical.
    pub fn enabled(&self) -> Vec<&'static str> {
        self.states
            .iter()
            .filter(|(_, s)| s.enabled)
            .map(|(name, _)| *name)
            .collect()
    }

    /// Dependency-ordered execution sequence.
    ///
    /// A module whose hard predecessor is missing or disabled is
    /// skipped with a log; a dependency cycle is fatal.
    pub fn order(&mut self) -> Result<Vec<&'static str>, TaskError> {
        let mut order = Vec::new();
        for name in self.enabled() {
            self.visit(name, &mut order)?;
        }
        Ok(order)
    }

    fn visit(
        &mut self,
        name: &'static str,
        order: &mut Vec<&'static str>,
    ) -> Result<bool, TaskError> {
        let state = match self.states.get(name) {
            Some(state) => state.clone(),
            None => return Ok(false),
        };
        if state.done {
            return Ok(state.enabled);
        }
        if !state.enabled {
            return Ok(false);
        }
        if let Some(state) = self.states.get_mut(name) {
            state.in_progress = true;
        }

        for dep in &state.run_after {
            match self.states.get(*dep) {
                None => {
                    tracing::debug!("module {dep}, needed before {name}, not found");
                    self.skip(name);
                    return Ok(false);
                }
                Some(dep_state) if dep_state.in_progress => {
                    return Err(TaskError::DependencyCycle(name.to_string(), dep.to_string()));
                }
                Some(dep_state) if !dep_state.enabled => {
                    if state.soft.contains(dep) {
                        continue;
                    }
                    tracing::debug!("module {dep}, needed before {name}, not enabled");
                    self.skip(name);
                    return Ok(false);
                }
                Some(_) => {
                    let dep_ran = self.visit(dep, order)?;
                    if !dep_ran && !state.soft.contains(dep) {
                        tracing::debug!("module {dep}, needed before {name}, was skipped");
                        self.skip(name);
                        return Ok(false);
                    }
                }
            }
        }

        if let Some(state) = self.states.get_mut(name) {
            state.in_progress = false;
            state.done = true;
        }
        order.push(name);
        Ok(true)
    }

    fn skip(&mut self, name: &'static str) {
        if let Some(state) = self.states.get_mut(name) {
            state.enabled = false;
            state.in_progress = false;
            state.done = true;
        }
    }

    /// Run every planned module in dependency order.
    ///
    /// Returns false when the abort flag stopped the run between
    /// modules.
    pub async fn run(
        &mut self,
        registry: &ModuleRegistry,
        ctx: &Arc<ModuleContext>,
        inventory: &Arc<Mutex<Inventory>>,
        timeout_secs: u64,
        abort: &AbortFlag,
    ) -> Result<bool, TaskError> {
        for name in self.order()? {
            if abort.is_raised() {
                return Ok(false);
            }
            let Some(module) = registry.get(name) else {
                continue;
            };
            tracing::debug!("running {name}");
            let probe = Arc::clone(module);
            let probe_ctx = Arc::clone(ctx);
            let document = Arc::clone(inventory);
            run_with_timeout(name, "doInventory", timeout_secs, move || {
                probe.do_inventory(&probe_ctx, &document);
            })
            .await;
        }
        Ok(true)
    }
}

#[cfg(test)]
#[path = "planner_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The reference task: build an inventory document through the module
//! pipeline and deliver it to the target.

use async_trait::async_trait;
use parking_lot::Mutex;
use qm_core::{Event, EventKind};
use qm_inventory::{Format, Inventory, InventoryConfig};
use qm_proto::{Answer, Client, Pending};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::module::{ModuleContext, ModuleRegistry};
use crate::runner::AbortFlag;
use crate::task::{Artifact, Task, TaskConfig, TaskError, TaskOutput, TargetView};

/// The inventory task for one target run.
pub struct InventoryTask {
    config: TaskConfig,
    target: TargetView,
    /// The target's private storage directory, used for last-state.
    statedir: PathBuf,
    deviceid: String,
    agentid: Uuid,
    registry: ModuleRegistry,
    event: Option<Event>,
    /// BIOS/HARDWARE cache carried between partial runs.
    cached: Option<Value>,
    /// Validated probe parameters from the contact answer.
    params: Vec<Map<String, Value>>,
    abort: AbortFlag,
}

impl InventoryTask {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: TaskConfig,
        target: TargetView,
        statedir: PathBuf,
        deviceid: String,
        agentid: Uuid,
        registry: ModuleRegistry,
        event: Option<Event>,
        cached: Option<Value>,
    ) -> Self {
        Self {
            config,
            target,
            statedir,
            deviceid,
            agentid,
            registry,
            event,
            cached,
            params: Vec::new(),
            abort: AbortFlag::new(),
        }
    }

    fn disabled_categories(&self) -> HashSet<String> {
        self.config
            .no_category
            .iter()
            .map(|c| c.to_lowercase())
            .collect()
    }

    /// Apply the triggering event: full/partial flags and, for partial
    /// inventories, the category narrowing. Returns false when the run
    /// must be skipped, with the reason logged.
    fn setup_event(
        &mut self,
        inventory: &mut Inventory,
        disabled: &mut HashSet<String>,
        nochecksum: &mut bool,
        keepcache: &mut bool,
    ) -> bool {
        let Some(event) = self.event.clone() else {
            return true;
        };

        let (taskrun_full, categories) = match &event.kind {
            EventKind::TaskRun { full, partial, .. } => (*full && !*partial, None),
            EventKind::Partial { categories } => (false, Some(categories.clone())),
            _ => {
                tracing::debug!(
                    "only taskrun or partial inventory events are supported for inventory task"
                );
                return false;
            }
        };

        if event.is_partial() {
            if let TargetView::Server { is_glpi: false, id, .. } = &self.target {
                tracing::debug!(
                    "{id}: server target for partial inventory events need to be a GLPI server"
                );
                return false;
            }
        }

        inventory.set_full(taskrun_full);
        inventory.set_partial(!taskrun_full);

        let Some(categories) = categories else {
            return true;
        };

        let mut keep: HashSet<String> = categories
            .iter()
            .map(|c| c.to_lowercase())
            .filter(|c| !c.is_empty() && !disabled.contains(c))
            .collect();
        if keep.is_empty() {
            tracing::info!("nothing to inventory on partial inventory event");
            return false;
        }

        let known = self.registry.categories();
        let mut any_valid = false;
        for category in &keep {
            if known.contains(&category.as_str()) {
                any_valid = true;
            } else {
                tracing::error!("unknown category on partial inventory event: {category}");
            }
        }
        if !any_valid {
            tracing::error!("invalid partial inventory event with no supported category");
            return false;
        }

        match self.cached.take() {
            Some(cached) => {
                if inventory.merge_content(cached).is_err() {
                    tracing::debug!("stale partial inventory cache ignored");
                }
                *keepcache = false;
            }
            None => {
                // Hardware and bios anchor every partial submission
                keep.insert("hardware".into());
                keep.insert("bios".into());
                if keep.contains("software") {
                    keep.insert("os".into());
                }
                *keepcache = true;
            }
        }

        for category in known {
            if !keep.contains(category) {
                disabled.insert(category.to_string());
            }
        }
        *nochecksum = true;
        true
    }

    fn choose_format(&self, inventory: &Inventory) -> Format {
        match &self.target {
            TargetView::Local { format, .. } => {
                if inventory.is_partial() {
                    Format::Json
                } else {
                    format.parse().unwrap_or(Format::Json)
                }
            }
            TargetView::Server { is_glpi: true, .. } => Format::Json,
            TargetView::Server { is_glpi: false, .. } | TargetView::Listener { .. } => Format::Xml,
        }
    }

    fn inject_additional_content(&self, inventory: &mut Inventory) {
        let Some(file) = &self.config.additional_content else {
            return;
        };
        if !file.is_file() {
            return;
        }
        tracing::debug!("importing {} file content to the inventory", file.display());
        let Ok(bytes) = std::fs::read(file) else {
            tracing::error!("can't read {}", file.display());
            return;
        };
        let content = if file.extension().map(|e| e == "xml").unwrap_or(false) {
            qm_inventory::parse_xml_content(&bytes)
        } else {
            serde_json::from_slice::<Value>(&bytes)
                .ok()
                .and_then(|message| message.get("content").cloned().or(Some(message)))
        };
        match content {
            Some(content) => {
                if inventory.merge_content(content).is_err() {
                    tracing::error!("no content found in {}", file.display());
                }
            }
            None => tracing::error!("failed to load {}", file.display()),
        }
    }

    async fn submit(&self, inventory: &mut Inventory) -> Result<TaskOutput, TaskError> {
        let mut output = TaskOutput::default();

        match &self.target {
            TargetView::Local { path, .. } => {
                match inventory.save(path)? {
                    Some(file) => tracing::info!("inventory saved in {}", file.display()),
                    None => tracing::info!("inventory dumped on standard output"),
                }
            }
            TargetView::Server { url, is_glpi: true, task_version, .. } => {
                let client =
                    Client::new(self.agentid, None, self.config.client.clone())?;
                let message = inventory.normalized(task_version.as_deref()).message();
                client.send(url, &message, Pending::Retry).await?;
            }
            TargetView::Server { url, is_glpi: false, .. } => {
                let client =
                    Client::new(self.agentid, None, self.config.client.clone())?;
                let xml = inventory.xml_document()?;
                client.send_legacy(url, &xml).await?;
            }
            TargetView::Listener { .. } => {
                output.artifact = Some(Artifact::ListenerInventory(inventory.xml_document()?));
            }
        }
        Ok(output)
    }
}

#[async_trait]
impl Task for InventoryTask {
    fn name(&self) -> &'static str {
        "inventory"
    }

    fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    fn is_enabled(&mut self, contact: Option<&Answer>) -> bool {
        match &self.target {
            TargetView::Local { .. } | TargetView::Listener { .. } => true,
            TargetView::Server { is_glpi: true, .. } => {
                if let Some(answer) = contact {
                    if let Some(support) = answer.tasks.get("inventory") {
                        if let Some(params) = &support.params {
                            self.params =
                                validate_params(params, &self.disabled_categories());
                        }
                    }
                }
                true
            }
            // Legacy servers request inventories through the PROLOG
            // answer, which the runtime gates on before scheduling us
            TargetView::Server { is_glpi: false, .. } => true,
        }
    }

    async fn run(&mut self) -> Result<TaskOutput, TaskError> {
        let start = Instant::now();
        let glpi = match &self.target {
            TargetView::Server { task_version: Some(v), .. } => Some(v.clone()),
            _ => self.config.glpi_version.clone(),
        };

        let mut inventory = Inventory::new(InventoryConfig {
            deviceid: self.deviceid.clone(),
            statedir: Some(self.statedir.clone()),
            glpi,
            required: self.config.required_category.clone(),
            itemtype: self.config.itemtype.clone(),
            tag: self.config.tag.clone(),
        });

        if self.config.full {
            inventory.set_full(true);
        }

        let event_name = self.event.as_ref().map(|e| e.name.clone());
        match &self.config.tag {
            Some(tag) => tracing::info!(
                "new {} from {} for {} (tag={tag})",
                event_name.as_deref().unwrap_or("inventory"),
                inventory.device_id(),
                self.target.id(),
            ),
            None => tracing::info!(
                "new {} from {} for {}",
                event_name.as_deref().unwrap_or("inventory"),
                inventory.device_id(),
                self.target.id(),
            ),
        }

        let mut disabled = self.disabled_categories();
        let mut nochecksum = false;
        let mut keepcache = false;
        if !self.setup_event(&mut inventory, &mut disabled, &mut nochecksum, &mut keepcache) {
            tracing::info!("skipping inventory task event on {}", self.target.id());
            return Ok(TaskOutput::default());
        }

        let format = self.choose_format(&inventory);
        inventory.set_format(format);
        // Databases have no representation in the legacy XML dialect
        if format == Format::Xml {
            disabled.insert("database".to_string());
        }

        let ctx = Arc::new(ModuleContext {
            datadir: None,
            deviceid: self.deviceid.clone(),
            agentid: self.agentid.to_string(),
            remote: None,
            scan_homedirs: self.config.scan_homedirs,
            scan_profiles: self.config.scan_profiles,
            assetname_support: self.config.assetname_support,
            credentials: parse_credentials(&self.config.credentials),
            params: self.params.clone(),
            disabled_categories: disabled,
        });

        let registry = self.registry.clone();
        let timeout = self.config.backend_collect_timeout;
        let mut plan =
            crate::planner::ModulePlan::init(&registry, &ctx, timeout, &self.abort).await?;

        let document = Arc::new(Mutex::new(inventory));
        let completed = plan
            .run(&registry, &ctx, &document, timeout, &self.abort)
            .await?;

        // An abandoned (timed out) module may still hold a reference;
        // fall back to a deep copy under the lock
        let mut inventory = match Arc::try_unwrap(document) {
            Ok(mutex) => mutex.into_inner(),
            Err(shared) => shared.lock().clone(),
        };
        if !completed {
            return Err(TaskError::Aborted);
        }

        self.inject_additional_content(&mut inventory);

        let etime = start.elapsed().as_secs();
        if let Some(Value::Object(provider)) = inventory.content_mut().get_mut("VERSIONPROVIDER")
        {
            provider.insert("ETIME".into(), Value::Number(etime.into()));
        }

        if !nochecksum {
            inventory.compute_checksum(self.config.full_inventory_postpone);
        }

        let mut output = self.submit(&mut inventory).await?;

        // Keep BIOS and HARDWARE for the next partial run
        if inventory.is_partial() && keepcache {
            let mut cache = Map::new();
            for section in ["BIOS", "HARDWARE"] {
                if let Some(content) = inventory.get_section(section) {
                    cache.insert(section.to_string(), content.clone());
                }
            }
            if !cache.is_empty() {
                output.keep_cache = Some(Value::Object(cache));
            }
        }

        Ok(output)
    }

    fn abort(&self) {
        self.abort.raise();
    }

    fn abort_handle(&self) -> AbortFlag {
        self.abort.clone()
    }
}

/// Validate server-provided probe parameters.
///
/// Entries without a usable `use` list or with a disabled category are
/// dropped; `params_id` entries expand per category and per id, with
/// `use[<id>]` overriding the shared `use` list.
pub(crate) fn validate_params(
    params: &[Map<String, Value>],
    disabled: &HashSet<String>,
) -> Vec<Map<String, Value>> {
    let mut validated = Vec::new();
    for param in params {
        let category = param.get("category").and_then(Value::as_str).unwrap_or("");
        if category.is_empty() || disabled.contains(&category.to_lowercase()) {
            let skipped = Value::Object(param.clone());
            tracing::debug!("skipping invalid params: {}", skipped);
            continue;
        }

        let ids = param.get("params_id").and_then(Value::as_str);
        let mut expanded = Vec::new();
        match ids {
            Some(ids) => {
                for category in category.split(',').map(str::trim).filter(|c| !c.is_empty()) {
                    for id in ids.split(',').map(str::trim).filter(|i| !i.is_empty()) {
                        let use_list = param
                            .get(&format!("use[{id}]"))
                            .or_else(|| param.get("use"))
                            .and_then(Value::as_str)
                            .map(|use_| {
                                use_.split(',')
                                    .map(|u| Value::String(u.trim().to_string()))
                                    .collect::<Vec<Value>>()
                            })
                            .unwrap_or_default();
                        if use_list.is_empty() {
                            continue;
                        }
                        let mut entry = Map::new();
                        entry.insert("category".into(), Value::String(category.to_string()));
                        entry.insert("params_id".into(), Value::String(id.to_string()));
                        entry.insert("use".into(), Value::Array(use_list));
                        expanded.push(entry);
                    }
                }
            }
            None => {
                if param.get("use").is_some() {
                    expanded.push(param.clone());
                }
            }
        }

        if expanded.is_empty() {
            let skipped = Value::Object(param.clone());
            tracing::debug!("skipping invalid params: {}", skipped);
        } else {
            validated.extend(expanded);
        }
    }
    validated
}

/// Parse `--credentials` definitions: comma-separated `key:value`
/// pairs, one map per definition. A missing `params_id` defaults to
/// the definition index.
pub(crate) fn parse_credentials(definitions: &[String]) -> Vec<Map<String, Value>> {
    let mut credentials = Vec::new();
    for (index, definition) in definitions.iter().enumerate() {
        let mut parsed = Map::new();
        for pair in definition.split(',') {
            let Some((key, value)) = pair.split_once(':') else {
                parsed.clear();
                break;
            };
            parsed.insert(
                key.trim().to_string(),
                Value::String(value.trim().to_string()),
            );
        }
        if parsed.is_empty() {
            tracing::debug!("invalid credential definition: {definition}");
            continue;
        }
        parsed
            .entry("params_id".to_string())
            .or_insert_with(|| Value::String(index.to_string()));
        credentials.push(parsed);
    }
    credentials
}

#[cfg(test)]
#[path = "inventory_task_tests.rs"]
mod tests;

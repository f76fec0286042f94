// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The agent runtime: owns the targets, drives the task pipeline, and
//! hosts the embedded HTTP server.

use parking_lot::Mutex;
use qm_core::{Clock, Event, EventKind, SystemClock};
use qm_httpd::HttpdConfig;
use qm_proto::{Answer, Client, ClientError, ContactRequest, LegacyAnswer, Pending};
use qm_storage::{Storage, StorageError};
use qm_tasks::{
    enabled_tasks, task_execution_plan, Artifact, InventoryTask, MaintenanceTask, ModuleRegistry,
    Task, TaskConfig, TaskError, TargetView,
};
use serde_json::Value;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::{default_vardir, Config, ConfigError};
use crate::state::AgentState;
use crate::target::{canonical_url, storage_subdir, ListenerTarget, ServerTarget, Target, TargetKind};
use crate::{PROVIDER, VERSION};

/// Initial retry delay after a failed server exchange, seconds.
const ERROR_RETRY_DELAY: u64 = 60;

/// Errors that end the agent before the main loop
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("no target defined, aborting")]
    NoTarget,
}

/// Shared pieces the HTTP server and the loop both see.
struct Shared {
    targets: Vec<Arc<Target>>,
    status: Mutex<String>,
    clock: SystemClock,
}

impl qm_httpd::AgentHandle for Shared {
    fn status(&self) -> String {
        self.status.lock().clone()
    }

    fn server_urls(&self) -> Vec<String> {
        self.targets
            .iter()
            .filter_map(|t| t.server().map(|s| s.url().to_string()))
            .collect()
    }

    fn target_descriptions(&self) -> Vec<String> {
        self.targets.iter().map(|t| t.description()).collect()
    }

    fn storage_dirs(&self) -> Vec<PathBuf> {
        self.targets
            .iter()
            .map(|t| t.storage().directory().to_path_buf())
            .collect()
    }

    fn run_now_url(&self, url: &str) {
        let now = self.clock.epoch_secs();
        for target in &self.targets {
            if target.server().map(|s| s.url() == url).unwrap_or(false) {
                target.run_now(now);
            }
        }
    }

    fn run_now_all(&self) {
        let now = self.clock.epoch_secs();
        for target in &self.targets {
            target.run_now(now);
        }
    }
}

/// The agent process state.
pub struct Agent {
    config: Config,
    storage: Storage,
    state: AgentState,
    shared: Arc<Shared>,
    registry: ModuleRegistry,
    task_cache: Mutex<HashMap<String, Value>>,
    terminate: CancellationToken,
    current_abort: Mutex<Option<qm_tasks::AbortFlag>>,
    httpd: Option<qm_httpd::Server>,
}

impl Agent {
    /// Build the runtime: storage, identity, targets, task plan.
    pub fn init(config: Config) -> Result<Self, AgentError> {
        let vardir = config.vardir.clone().unwrap_or_else(default_vardir);
        // Pre-rename installs kept their state under the -agent dir
        let oldvardir = vardir.with_file_name(format!(
            "{}-agent",
            vardir.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default()
        ));
        let storage = Storage::with_migration(&vardir, &oldvardir)?;

        let clock = SystemClock;
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| format!("device-by-{}-agent", PROVIDER.to_lowercase()));
        let policy = qm_core::AssetNamePolicy::from_option(config.assetname_support)
            .unwrap_or_default();
        let mut state =
            AgentState::load_or_create(&storage, &hostname, policy, clock.epoch_secs());
        if config.set_forcerun {
            state.set_forcerun(&storage);
        }

        let targets = build_targets(&config, &vardir, clock.epoch_secs())?;
        // Setting the forcerun flag is a valid run without targets
        if targets.is_empty() && !config.set_forcerun {
            return Err(AgentError::NoTarget);
        }

        let plan = execution_plan(&config);
        for target in &targets {
            target.set_planned_tasks(plan.clone());
            tracing::info!(
                "target {}: planned tasks: {}",
                target.id(),
                if target.planned_tasks().is_empty() {
                    "none".to_string()
                } else {
                    target.planned_tasks().join(", ")
                }
            );
        }

        tracing::info!("{PROVIDER} Agent starting up (version {VERSION})");
        tracing::debug!("deviceid: {}", state.deviceid);

        Ok(Self {
            config,
            storage,
            state,
            shared: Arc::new(Shared {
                targets,
                status: Mutex::new("waiting".to_string()),
                clock,
            }),
            registry: ModuleRegistry::builtin(),
            task_cache: Mutex::new(HashMap::new()),
            terminate: CancellationToken::new(),
            current_abort: Mutex::new(None),
            httpd: None,
        })
    }

    pub fn targets(&self) -> &[Arc<Target>] {
        &self.shared.targets
    }

    pub fn deviceid(&self) -> &str {
        &self.state.deviceid
    }

    pub fn status(&self) -> String {
        self.shared.status.lock().clone()
    }

    fn set_status(&self, status: &str) {
        *self.shared.status.lock() = status.to_string();
    }

    /// A token cancelled on SIGINT/SIGTERM.
    pub fn terminate_token(&self) -> CancellationToken {
        self.terminate.clone()
    }

    /// Stop everything: no new runs, abort the current task.
    pub fn terminate(&self) {
        self.terminate.cancel();
        if let Some(abort) = self.current_abort.lock().as_ref() {
            abort.raise();
        }
    }

    async fn start_httpd(&mut self) {
        if self.config.no_httpd {
            return;
        }
        let ip = self
            .config
            .httpd_ip
            .as_deref()
            .and_then(|ip| ip.parse::<IpAddr>().ok())
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        let httpd_config = HttpdConfig {
            ip,
            port: self.config.httpd_port,
            trust: self.config.httpd_trust.clone(),
        };
        let mut server = qm_httpd::Server::new(
            httpd_config,
            Arc::clone(&self.shared) as Arc<dyn qm_httpd::AgentHandle>,
            Vec::new(),
        );
        match server.init().await {
            Ok(()) => self.httpd = Some(server),
            // The agent runs on without its endpoint
            Err(e) => tracing::error!("httpd: {e}"),
        }
    }

    /// Run the agent: once over all targets, or as a daemon until
    /// terminated.
    pub async fn run(&mut self) -> Result<(), AgentError> {
        if let Some(wait) = self.config.wait {
            let delay = if wait > 0 {
                use rand::Rng;
                rand::thread_rng().gen_range(0..=wait)
            } else {
                0
            };
            if delay > 0 {
                tracing::debug!("waiting {delay} seconds before first run");
                tokio::time::sleep(Duration::from_secs(delay)).await;
            }
        }

        let forcerun = self.state.take_forcerun(&self.storage);
        let forced = self.config.force || forcerun;

        // A requested partial inventory becomes an event on every
        // target
        if !self.config.partial.is_empty() {
            let now = self.shared.clock.epoch_secs();
            let event = Event::partial(self.config.partial.clone(), now);
            for target in &self.shared.targets {
                target.add_event(event.clone(), now, true);
            }
        }

        if self.config.daemon {
            self.start_httpd().await;
            self.daemon_loop(forced).await;
        } else {
            self.single_pass(forced).await;
        }

        for target in &self.shared.targets {
            if let Some(listener) = target.listener() {
                listener.flush_sessions();
            }
        }
        if let Some(mut httpd) = self.httpd.take() {
            httpd.stop().await;
        }
        Ok(())
    }

    async fn single_pass(&self, forced: bool) {
        for target in self.shared.targets.iter().cloned() {
            if self.terminate.is_cancelled() {
                break;
            }
            let now = self.shared.clock.epoch_secs();
            if self.config.lazy && !forced && now < target.next_run_date() {
                tracing::info!(
                    "target {} is not ready yet, next server contact planned at {}",
                    target.id(),
                    target.next_run_date()
                );
                continue;
            }
            self.run_target_guarded(&target).await;
        }
    }

    async fn daemon_loop(&mut self, forced: bool) {
        let mut first_pass = forced;
        let mut last_reload = std::time::Instant::now();
        loop {
            if self.terminate.is_cancelled() {
                break;
            }

            let reload_due = self.config.conf_reload_interval > 0
                && last_reload.elapsed().as_secs() >= self.config.conf_reload_interval;
            if reload_due {
                last_reload = std::time::Instant::now();
                self.reload_config().await;
            }

            let targets: Vec<Arc<Target>> = self.shared.targets.to_vec();
            for target in targets {
                if self.terminate.is_cancelled() {
                    break;
                }
                if target.paused() {
                    continue;
                }
                let now = self.shared.clock.epoch_secs();
                let due = first_pass || now >= target.next_run_date();
                let has_event = target.next_event_ready(now);
                if !due && !has_event {
                    continue;
                }
                self.run_target_guarded(&target).await;
            }
            first_pass = false;
            tokio::select! {
                _ = self.terminate.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_secs(1)) => {}
            }
        }
    }

    /// Re-read configuration files and apply what can change at
    /// runtime: the task plan and the HTTP server parameters.
    async fn reload_config(&mut self) {
        tracing::debug!("reloading configuration");
        let fresh = match self.config.reload() {
            Ok(fresh) => fresh,
            Err(e) => {
                tracing::error!("configuration reload failed: {e}");
                return;
            }
        };
        self.config = fresh;

        let plan = execution_plan(&self.config);
        for target in &self.shared.targets {
            target.set_planned_tasks(plan.clone());
        }

        if let Some(server) = &self.httpd {
            let ip = self
                .config
                .httpd_ip
                .as_deref()
                .and_then(|ip| ip.parse::<IpAddr>().ok())
                .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
            let httpd_config = HttpdConfig {
                ip,
                port: self.config.httpd_port,
                trust: self.config.httpd_trust.clone(),
            };
            if server.need_to_restart(&httpd_config, &[]) {
                if let Some(mut old) = self.httpd.take() {
                    old.stop().await;
                }
                self.start_httpd().await;
            }
        }
    }

    /// Run one target, recovering any panic into the logger, and plan
    /// the next run.
    async fn run_target_guarded(&self, target: &Arc<Target>) {
        match self.run_target(target).await {
            Ok(()) => target.reset_next_run_date(self.shared.clock.epoch_secs()),
            Err(retry) => {
                if retry {
                    target
                        .set_next_run_date_from_now(ERROR_RETRY_DELAY, self.shared.clock.epoch_secs());
                } else {
                    target.reset_next_run_date(self.shared.clock.epoch_secs());
                }
            }
        }
        self.set_status(if target.paused() { "paused" } else { "waiting" });
    }

    /// One full pass over a target: events, handshake, planned tasks.
    ///
    /// `Err(true)` asks for a retry with backoff; `Err(false)` for a
    /// normal reschedule.
    async fn run_target(&self, target: &Arc<Target>) -> Result<(), bool> {
        if target.is_type("local") || target.is_type("server") {
            tracing::info!("target {}: {}", target.id(), target.description());
        }

        // Ready events run ahead of the normal plan
        let mut ran_event = false;
        let mut resume_plan = false;
        loop {
            let now = self.shared.clock.epoch_secs();
            let Some(event) = target.next_event(now) else {
                break;
            };
            if self.terminate.is_cancelled() {
                return Ok(());
            }
            match &event.kind {
                EventKind::Init { task } => {
                    if let Some(new_event) = self.task_init_event(target, task) {
                        let now = self.shared.clock.epoch_secs();
                        target.add_event(new_event, now, true);
                    }
                }
                EventKind::TaskRun { task, reschedule, .. } => {
                    if task.eq_ignore_ascii_case("all") {
                        target.trigger_run_tasks_now(&event, now);
                        continue;
                    }
                    resume_plan |= *reschedule;
                    ran_event = true;
                    let _ = self.run_task(target, task, None, None, Some(event.clone())).await;
                }
                EventKind::Partial { .. } => {
                    ran_event = true;
                    let _ = self
                        .run_task(target, "inventory", None, None, Some(event.clone()))
                        .await;
                }
                EventKind::Maintenance { task, .. } | EventKind::Job { task } => {
                    ran_event = true;
                    let _ = self.run_task(target, task, None, None, Some(event.clone())).await;
                }
            }
        }
        if ran_event && !resume_plan {
            return Ok(());
        }

        // Server handshake
        let mut answer: Option<Answer> = None;
        let mut legacy: Option<LegacyAnswer> = None;
        if let Some(server) = target.server() {
            match self.handshake(target, server).await {
                Ok((contact, prolog)) => {
                    answer = contact;
                    legacy = prolog;
                }
                Err(e) => {
                    tracing::error!("target {}: {e}", target.id());
                    return Err(true);
                }
            }
        }

        // Planned tasks
        let mut retry = false;
        for name in target.planned_tasks() {
            if self.terminate.is_cancelled() || target.paused() {
                break;
            }
            if let Err(e) = self
                .run_task(target, &name, answer.as_ref(), legacy.as_ref(), None)
                .await
            {
                match e {
                    TaskError::Client(_) => {
                        tracing::error!("target {}: task {name}: {e}", target.id());
                        retry = true;
                    }
                    other => tracing::error!("target {}: task {name}: {other}", target.id()),
                }
            }
            self.set_status(if target.paused() { "paused" } else { "waiting" });
        }
        if retry {
            return Err(true);
        }
        Ok(())
    }

    /// Contact (and, when needed, PROLOG) exchange with a server.
    ///
    /// A server is elevated to GLPI server iff a contact answer
    /// parses; unparseable answers fall back to the legacy handshake.
    async fn handshake(
        &self,
        target: &Arc<Target>,
        server: &ServerTarget,
    ) -> Result<(Option<Answer>, Option<LegacyAnswer>), ClientError> {
        let client = Client::new(self.state.agentid, None, self.config.client_options())?;
        let url = server.url().to_string();

        let mut contact_answer = None;
        let mut request = ContactRequest::new(PROVIDER, VERSION, &self.state.deviceid)
            .with_tag(self.config.tag.clone());
        if !self.config.no_httpd && self.config.daemon {
            request = request.with_httpd_port(Some(self.config.httpd_port));
        }
        for task in enabled_tasks(&self.config.no_task) {
            request = request.with_task(task.name, task.version);
        }

        match client.send(&url, &request.to_value(), Pending::Retry).await {
            Ok(answer) => {
                server.set_glpi_server(true);
                for (task, support) in &answer.tasks {
                    server.set_server_task_support(
                        task,
                        support.server.as_deref().unwrap_or("glpi"),
                        &support.version,
                    );
                }
                let expiration = answer.expiration_hours_secs();
                if expiration > 0 {
                    target.set_max_delay(expiration);
                }
                contact_answer = Some(answer);
            }
            Err(ClientError::UnexpectedContent(_)) | Err(ClientError::ErrorStatus(_)) => {
                tracing::debug!(
                    "target {}: server does not understand the contact request",
                    target.id()
                );
                server.set_glpi_server(false);
            }
            Err(e @ ClientError::ServerError(_)) => {
                // An error status is still a parsed protocol answer
                server.set_glpi_server(true);
                target.save_state();
                return Err(e);
            }
            Err(other) => return Err(other),
        }

        let mut legacy = None;
        if server.do_prolog() {
            let prolog = qm_proto::prolog_request(&self.state.deviceid);
            match client.send_legacy(&url, &prolog).await {
                Ok(body) => {
                    legacy = LegacyAnswer::parse(&body);
                    if let Some(answer) = &legacy {
                        if let Some(hours) = answer.prolog_freq {
                            target.set_max_delay(hours * 3_600);
                        }
                    }
                }
                Err(e) if contact_answer.is_some() => {
                    // Legacy tasks stay unserved this round
                    tracing::debug!("target {}: prolog failed: {e}", target.id());
                }
                Err(e) => return Err(e),
            }
        }
        target.save_state();

        Ok((contact_answer, legacy))
    }

    fn task_view(&self, target: &Arc<Target>, task: &str) -> TargetView {
        match target.kind() {
            TargetKind::Server(server) => TargetView::Server {
                id: target.id().to_string(),
                url: server.url().to_string(),
                is_glpi: server.is_glpi_server(),
                task_version: server.task_version(task),
            },
            TargetKind::Local { path, format } => TargetView::Local {
                id: target.id().to_string(),
                path: path.clone(),
                format: format.clone(),
            },
            TargetKind::Listener(_) => TargetView::Listener { id: target.id().to_string() },
        }
    }

    fn task_config(&self) -> TaskConfig {
        TaskConfig {
            tag: self.config.tag.clone(),
            no_category: self.config.no_category.clone(),
            required_category: self.config.required_category.clone(),
            itemtype: self.config.itemtype.clone(),
            scan_homedirs: self.config.scan_homedirs,
            scan_profiles: self.config.scan_profiles,
            assetname_support: qm_core::AssetNamePolicy::from_option(self.config.assetname_support)
                .unwrap_or_default(),
            additional_content: self.config.additional_content.clone(),
            backend_collect_timeout: self.config.backend_collect_timeout,
            full_inventory_postpone: self.config.full_inventory_postpone,
            full: self.config.full,
            force: self.config.force,
            credentials: self.config.credentials.clone(),
            glpi_version: self.config.glpi_version.clone(),
            client: self.config.client_options(),
        }
    }

    fn build_task(
        &self,
        target: &Arc<Target>,
        name: &str,
        event: Option<Event>,
    ) -> Option<Box<dyn Task>> {
        let statedir = target.storage().directory().to_path_buf();
        match name.to_lowercase().as_str() {
            "inventory" => {
                let cached = self.task_cache.lock().get("inventory").cloned();
                Some(Box::new(InventoryTask::new(
                    self.task_config(),
                    self.task_view(target, "inventory"),
                    statedir,
                    self.state.deviceid.clone(),
                    self.state.agentid,
                    self.registry.clone(),
                    event,
                    cached,
                )))
            }
            "maintenance" => Some(Box::new(MaintenanceTask::new(
                statedir,
                target.id().to_string(),
            ))),
            other => {
                tracing::trace!("{other} task module is not available");
                None
            }
        }
    }

    fn task_init_event(&self, target: &Arc<Target>, name: &str) -> Option<Event> {
        self.build_task(target, name, None)?.new_event()
    }

    async fn run_task(
        &self,
        target: &Arc<Target>,
        name: &str,
        answer: Option<&Answer>,
        legacy: Option<&LegacyAnswer>,
        event: Option<Event>,
    ) -> Result<(), TaskError> {
        let Some(mut task) = self.build_task(target, name, event.clone()) else {
            return Ok(());
        };

        // Legacy servers only get an inventory when they asked for one
        if let Some(server) = target.server() {
            if !server.is_glpi_server() && name.eq_ignore_ascii_case("inventory") {
                let requested = legacy.map(|l| l.inventory_requested()).unwrap_or(false);
                if !requested {
                    if self.config.force {
                        tracing::debug!("inventory task execution not requested, but execution forced");
                    } else {
                        tracing::debug!("inventory task execution not requested");
                        return Ok(());
                    }
                }
            }
        }

        if !task.is_enabled(answer) {
            tracing::debug!("target {}: task {name} is not enabled", target.id());
            return Ok(());
        }

        match &event {
            Some(event) => tracing::info!("running task {name}: {} event", event.name),
            None => tracing::info!("running task {name}"),
        }
        self.set_status(&format!("running task {name}"));

        *self.current_abort.lock() = Some(task.abort_handle());
        let result = task.run().await;
        *self.current_abort.lock() = None;

        let output = result?;
        let now = self.shared.clock.epoch_secs();
        for event in output.events {
            target.add_event(event, now, true);
        }
        if let Some(Artifact::ListenerInventory(xml)) = output.artifact {
            if let Some(listener) = target.listener() {
                listener.set_inventory(xml);
            }
        }
        if let Some(cache) = output.keep_cache {
            self.task_cache.lock().insert(name.to_lowercase(), cache);
        } else if event.is_none() {
            // A full run invalidates any partial-run cache
            self.task_cache.lock().remove(&name.to_lowercase());
        }
        Ok(())
    }
}

/// Materialize the typed target list: locals, then servers, then the
/// singleton listener when nothing else is configured.
fn build_targets(config: &Config, vardir: &std::path::Path, now: u64) -> Result<Vec<Arc<Target>>, AgentError> {
    let mut targets: Vec<Arc<Target>> = Vec::new();
    let max_delay = 3_600;
    // The first-run spread only matters for long-lived agents
    let initial_delay = (config.daemon && config.delaytime > 0).then_some(config.delaytime);

    for (index, path) in config.local.iter().enumerate() {
        let storage = Storage::new(vardir.join(storage_subdir(path)))?;
        targets.push(Arc::new(Target::new(
            format!("local{index}"),
            TargetKind::Local {
                path: PathBuf::from(path),
                format: config.local_format().to_string(),
            },
            storage,
            max_delay,
            None,
            now,
        )));
    }

    for (index, url) in config.server.iter().enumerate() {
        let Some(url) = canonical_url(url) else {
            continue;
        };
        let storage = Storage::new(vardir.join(storage_subdir(&url)))?;
        targets.push(Arc::new(Target::new(
            format!("server{index}"),
            TargetKind::Server(ServerTarget::new(url)),
            storage,
            max_delay,
            initial_delay,
            now,
        )));
    }

    if targets.is_empty() && config.listen && !config.no_httpd {
        let storage = Arc::new(Storage::new(vardir.join("__LISTENER__"))?);
        targets.push(Arc::new(Target::new(
            "listener".to_string(),
            TargetKind::Listener(ListenerTarget::new(Arc::clone(&storage))),
            Storage::new(vardir.join("__LISTENER__"))?,
            max_delay,
            None,
            now,
        )));
    }

    Ok(targets)
}

/// The task plan from configuration: every enabled task, or the
/// explicit `tasks` list with `...` expansion.
fn execution_plan(config: &Config) -> Vec<String> {
    let enabled = enabled_tasks(&config.no_task);
    if config.tasks.is_empty() {
        enabled.iter().map(|t| t.name.to_string()).collect()
    } else {
        task_execution_plan(&enabled, &config.tasks)
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;

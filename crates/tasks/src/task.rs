// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task trait and the context handed to every task.

use async_trait::async_trait;
use qm_core::Event;
use qm_proto::{Answer, ClientError, ClientOptions};
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while running a task
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("no inventory module found")]
    NoModules,
    #[error("module {needed}, needed before {module}, not found")]
    MissingDependency { module: String, needed: String },
    #[error("module {needed}, needed before {module}, not enabled")]
    DependencyNotEnabled { module: String, needed: String },
    #[error("circular dependency between {0} and {1}")]
    DependencyCycle(String, String),
    #[error("task aborted")]
    Aborted,
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Inventory(#[from] qm_inventory::InventoryError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// The target a task works against, as a plain view.
///
/// Tasks never hold the runtime's target objects; the runtime hands
/// them this value and applies any produced artifact itself.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetView {
    Server {
        id: String,
        url: String,
        is_glpi: bool,
        /// Version the server advertised for this task, if any.
        task_version: Option<String>,
    },
    Local {
        id: String,
        /// Output directory or `-` for stdout.
        path: PathBuf,
        /// `json`, `xml` or `html`.
        format: String,
    },
    Listener {
        id: String,
    },
}

impl TargetView {
    pub fn id(&self) -> &str {
        match self {
            TargetView::Server { id, .. }
            | TargetView::Local { id, .. }
            | TargetView::Listener { id } => id,
        }
    }

    pub fn is_glpi_server(&self) -> bool {
        matches!(self, TargetView::Server { is_glpi: true, .. })
    }
}

/// Configuration slice a task needs, resolved by the runtime.
#[derive(Debug, Clone, Default)]
pub struct TaskConfig {
    pub tag: Option<String>,
    pub no_category: Vec<String>,
    pub required_category: Vec<String>,
    pub itemtype: Option<String>,
    pub scan_homedirs: bool,
    pub scan_profiles: bool,
    pub assetname_support: qm_core::AssetNamePolicy,
    pub additional_content: Option<PathBuf>,
    /// Per-module timeout, seconds.
    pub backend_collect_timeout: u64,
    pub full_inventory_postpone: u32,
    /// Force a full inventory regardless of postpone state.
    pub full: bool,
    pub force: bool,
    pub credentials: Vec<String>,
    pub glpi_version: Option<String>,
    pub client: ClientOptions,
}

/// An artifact a task hands back to the runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum Artifact {
    /// Inventory document for the listener target to serve.
    ListenerInventory(Vec<u8>),
}

/// What a task run produced.
#[derive(Debug, Default)]
pub struct TaskOutput {
    /// Events to persist on the target (e.g. a partial inventory
    /// following a deploy).
    pub events: Vec<Event>,
    pub artifact: Option<Artifact>,
    /// Data to cache on the runtime for the task's next run.
    pub keep_cache: Option<serde_json::Value>,
}

/// A unit of work the runtime schedules against a target.
#[async_trait]
pub trait Task: Send {
    fn name(&self) -> &'static str;

    fn version(&self) -> &'static str;

    /// Whether this task should run, given the handshake answer.
    ///
    /// May capture per-run parameters from the answer, e.g. server
    /// provided probe parameters.
    fn is_enabled(&mut self, contact: Option<&Answer>) -> bool;

    async fn run(&mut self) -> Result<TaskOutput, TaskError>;

    /// Ask the task to stop at the next module boundary.
    fn abort(&self);

    /// The task's abort flag, for the runtime to raise from a signal
    /// handler while the task runs.
    fn abort_handle(&self) -> crate::AbortFlag;

    /// The event this task wants scheduled when the runtime delivers
    /// an `init` event for it.
    fn new_event(&self) -> Option<Event> {
        None
    }
}

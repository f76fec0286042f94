// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server target specifics: canonical URL and learned task support.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

/// What a server advertised for one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSupportRecord {
    pub server: String,
    pub version: String,
}

/// Legacy server kinds that require the PROLOG handshake.
const PROLOG_SERVERS: &[&str] = &["glpiinventory", "fusioninventory"];

pub struct ServerTarget {
    url: String,
    is_glpi: Mutex<bool>,
    task_support: Mutex<HashMap<String, TaskSupportRecord>>,
}

impl ServerTarget {
    pub fn new(url: String) -> Self {
        Self {
            url,
            is_glpi: Mutex::new(false),
            task_support: Mutex::new(HashMap::new()),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_glpi_server(&self) -> bool {
        *self.is_glpi.lock()
    }

    pub fn set_glpi_server(&self, is_glpi: bool) {
        *self.is_glpi.lock() = is_glpi;
    }

    /// Record what the server advertised for a task. Entries missing
    /// server or version are rejected.
    pub fn set_server_task_support(&self, task: &str, server: &str, version: &str) -> bool {
        if task.is_empty() || server.is_empty() || version.is_empty() {
            tracing::debug!("invalid task support for {task}: missing server or version");
            return false;
        }
        tracing::debug!("server supports {task}: {server} v{version}");
        self.task_support.lock().insert(
            task.to_lowercase(),
            TaskSupportRecord {
                server: server.to_string(),
                version: version.to_string(),
            },
        );
        true
    }

    pub fn task_support(&self) -> HashMap<String, TaskSupportRecord> {
        self.task_support.lock().clone()
    }

    pub(crate) fn restore(&self, is_glpi: bool, support: HashMap<String, TaskSupportRecord>) {
        *self.is_glpi.lock() = is_glpi;
        *self.task_support.lock() = support;
    }

    /// True iff the PROLOG handshake is still needed: no support known
    /// yet, or any task served by a legacy inventory server.
    pub fn do_prolog(&self) -> bool {
        let support = self.task_support.lock();
        if support.is_empty() {
            return true;
        }
        support
            .values()
            .any(|record| PROLOG_SERVERS.contains(&record.server.to_lowercase().as_str()))
    }

    pub fn task_server(&self, task: &str) -> Option<String> {
        self.task_support
            .lock()
            .get(&task.to_lowercase())
            .map(|record| record.server.clone())
    }

    pub fn task_version(&self, task: &str) -> Option<String> {
        self.task_support
            .lock()
            .get(&task.to_lowercase())
            .map(|record| record.version.clone())
    }
}

/// Canonicalize a server URL: bare hostnames get an http scheme, the
/// path defaults to `/`, and only http/https are accepted.
pub fn canonical_url(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    let with_scheme = if input.contains("://") {
        input.to_string()
    } else {
        format!("http://{input}")
    };
    let mut url = Url::parse(&with_scheme).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        tracing::error!("invalid server url {input}: only http and https are supported");
        return None;
    }
    url.host_str()?;
    if url.path().is_empty() {
        url.set_path("/");
    }
    Some(url.to_string())
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Protocol message types.
//!
//! Requests serialize with `{"action": ..., "deviceid": ..., ...}`;
//! answers carry `status ∈ {ok, error, pending}` plus action-specific
//! fields.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Server answer status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerStatus {
    Ok,
    Error,
    Pending,
}

/// Per-task support advertised in a contact answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSupport {
    pub version: String,
    /// Which server serves this task, e.g. `glpi`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    /// Per-run probe parameters the task must materialize.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Vec<Map<String, Value>>>,
}

/// A parsed server answer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Answer {
    pub status: AnswerStatus,
    /// Delay hint; seconds, or with an explicit `s`/`h`/`d` suffix.
    #[serde(default)]
    pub expiration: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub tasks: HashMap<String, TaskSupport>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Answer {
    /// Expiration in seconds; a bare number is seconds.
    ///
    /// Used for pending retries, where the server hints the per
    /// iteration sleep.
    pub fn expiration_secs(&self) -> u64 {
        parse_delay(self.expiration.as_ref(), 1)
    }

    /// Expiration in seconds; a bare number is hours.
    ///
    /// Used for contact answers, where servers advertise the next
    /// expected contact in hours unless suffixed.
    pub fn expiration_hours_secs(&self) -> u64 {
        parse_delay(self.expiration.as_ref(), 3_600)
    }
}

fn parse_delay(value: Option<&Value>, bare_unit: u64) -> u64 {
    match value {
        None => 0,
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0) * bare_unit,
        Some(Value::String(s)) => {
            let s = s.trim();
            if let Some(n) = s.strip_suffix('s') {
                n.trim().parse().unwrap_or(0)
            } else if let Some(n) = s.strip_suffix('h') {
                n.trim().parse::<u64>().unwrap_or(0) * 3_600
            } else if let Some(n) = s.strip_suffix('d') {
                n.trim().parse::<u64>().unwrap_or(0) * 86_400
            } else {
                s.parse::<u64>().unwrap_or(0) * bare_unit
            }
        }
        Some(_) => 0,
    }
}

/// Handshake request listing the agent's enabled tasks.
#[derive(Debug, Clone, Serialize)]
pub struct ContactRequest {
    pub action: String,
    pub name: String,
    pub version: String,
    pub deviceid: String,
    #[serde(rename = "httpd-port", skip_serializing_if = "Option::is_none")]
    pub httpd_port: Option<u16>,
    #[serde(rename = "enabled-tasks")]
    pub enabled_tasks: HashMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl ContactRequest {
    pub fn new(name: &str, version: &str, deviceid: &str) -> Self {
        Self {
            action: "contact".to_string(),
            name: name.to_string(),
            version: version.to_string(),
            deviceid: deviceid.to_string(),
            httpd_port: None,
            enabled_tasks: HashMap::new(),
            tag: None,
        }
    }

    pub fn with_task(mut self, task: &str, version: &str) -> Self {
        self.enabled_tasks
            .insert(task.to_string(), serde_json::json!({ "version": version }));
        self
    }

    pub fn with_httpd_port(mut self, port: Option<u16>) -> Self {
        self.httpd_port = port;
        self
    }

    pub fn with_tag(mut self, tag: Option<String>) -> Self {
        self.tag = tag;
        self
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Deployment subsystem requests.
///
/// These all share the `{action, deviceid, ...}` envelope; the enum
/// keeps their shapes in one place.
#[derive(Debug, Clone, PartialEq)]
pub enum DeployMessage {
    GetJobs {
        deviceid: String,
    },
    SetStatus {
        deviceid: String,
        /// Job identifier the status refers to.
        uuid: String,
        status: String,
        message: Option<String>,
    },
    SetUserEvent {
        deviceid: String,
        uuid: String,
        event: String,
        user: Option<String>,
    },
    GetFile {
        deviceid: String,
        sha512: String,
    },
    JobsDone {
        deviceid: String,
        uuid: String,
    },
}

impl DeployMessage {
    pub fn to_value(&self) -> Value {
        match self {
            DeployMessage::GetJobs { deviceid } => serde_json::json!({
                "action": "getJobs",
                "deviceid": deviceid,
            }),
            DeployMessage::SetStatus { deviceid, uuid, status, message } => {
                let mut value = serde_json::json!({
                    "action": "setStatus",
                    "deviceid": deviceid,
                    "uuid": uuid,
                    "status": status,
                });
                if let Some(message) = message {
                    value["message"] = Value::String(message.clone());
                }
                value
            }
            DeployMessage::SetUserEvent { deviceid, uuid, event, user } => {
                let mut value = serde_json::json!({
                    "action": "setUserEvent",
                    "deviceid": deviceid,
                    "uuid": uuid,
                    "event": event,
                });
                if let Some(user) = user {
                    value["user"] = Value::String(user.clone());
                }
                value
            }
            DeployMessage::GetFile { deviceid, sha512 } => serde_json::json!({
                "action": "getFile",
                "deviceid": deviceid,
                "sha512": sha512,
            }),
            DeployMessage::JobsDone { deviceid, uuid } => serde_json::json!({
                "action": "jobsDone",
                "deviceid": deviceid,
                "uuid": uuid,
            }),
        }
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;

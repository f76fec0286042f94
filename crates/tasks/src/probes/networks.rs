// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Network interface probe, fed from /sys/class/net.

use parking_lot::Mutex;
use qm_core::primary_mac;
use qm_inventory::Inventory;
use serde_json::Value;
use std::fs;
use std::path::Path;

use super::record;
use crate::module::{Module, ModuleContext};

pub(super) struct Networks;

fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn interface_type(name: &str, sys: &Path) -> Option<&'static str> {
    if name == "lo" {
        return Some("loopback");
    }
    if sys.join("wireless").is_dir() || sys.join("phy80211").is_dir() {
        return Some("wifi");
    }
    if sys.join("bridge").is_dir() {
        return Some("bridge");
    }
    match read_trimmed(&sys.join("type")).as_deref() {
        // ARPHRD_ETHER
        Some("1") => Some("ethernet"),
        _ => None,
    }
}

impl Module for Networks {
    fn name(&self) -> &'static str {
        "generic::networks"
    }

    fn category(&self) -> &'static str {
        "network"
    }

    fn is_enabled(&self, ctx: &ModuleContext) -> bool {
        ctx.remote.is_none() && Path::new("/sys/class/net").is_dir()
    }

    fn do_inventory(&self, _ctx: &ModuleContext, inventory: &Mutex<Inventory>) {
        let Ok(entries) = fs::read_dir("/sys/class/net") else {
            return;
        };
        let mut macs: Vec<String> = Vec::new();

        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            let sys = entry.path();

            let mac = read_trimmed(&sys.join("address")).filter(|m| m != "00:00:00:00:00:00");
            let status = match read_trimmed(&sys.join("operstate")).as_deref() {
                Some("up") => Some("up"),
                Some("down") | Some("lowerlayerdown") => Some("down"),
                _ => None,
            };
            let virtualdev = !sys.join("device").exists();
            if !virtualdev {
                if let Some(mac) = &mac {
                    macs.push(mac.clone());
                }
            }

            let record = record(&[
                ("DESCRIPTION", Some(Value::String(name.clone()))),
                ("MACADDR", mac.map(Value::String)),
                ("STATUS", status.map(|s| Value::String(s.to_string()))),
                ("VIRTUALDEV", Some(Value::Bool(virtualdev))),
                (
                    "TYPE",
                    interface_type(&name, &sys).map(|t| Value::String(t.to_string())),
                ),
                (
                    "SPEED",
                    read_trimmed(&sys.join("speed"))
                        .filter(|s| !s.starts_with('-'))
                        .map(Value::String),
                ),
            ]);
            let _ = inventory.lock().add_entry("NETWORKS", record);
        }

        // The lowest physical address identifies the host
        let candidates: Vec<&str> = macs.iter().map(String::as_str).collect();
        if let Some(_primary) = primary_mac(&candidates) {
            tracing::trace!("primary interface address: {_primary}");
        }
    }
}

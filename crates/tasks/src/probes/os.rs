// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operating system probe.

use chrono::{Local, TimeZone};
use parking_lot::Mutex;
use qm_inventory::Inventory;
use serde_json::Value;
use std::fs;

use super::record;
use crate::module::{Module, ModuleContext};

pub(super) struct OperatingSystem;

fn sys_value(path: &str) -> Option<Value> {
    fs::read_to_string(path)
        .ok()
        .map(|s| Value::String(s.trim().to_string()))
        .filter(|v| v.as_str().map(|s| !s.is_empty()).unwrap_or(false))
}

/// Boot time derived from the uptime counter.
fn boot_time() -> Option<Value> {
    let uptime = fs::read_to_string("/proc/uptime").ok()?;
    let secs: f64 = uptime.split_whitespace().next()?.parse().ok()?;
    let booted = chrono::Utc::now().timestamp() - secs as i64;
    let stamp = Local.timestamp_opt(booted, 0).single()?;
    Some(Value::String(stamp.format("%Y-%m-%d %H:%M:%S").to_string()))
}

impl Module for OperatingSystem {
    fn name(&self) -> &'static str {
        "generic::os"
    }

    fn category(&self) -> &'static str {
        "os"
    }

    fn is_enabled(&self, ctx: &ModuleContext) -> bool {
        ctx.remote.is_none()
    }

    fn do_inventory(&self, _ctx: &ModuleContext, inventory: &Mutex<Inventory>) {
        let fqdn = hostname::get().ok().and_then(|h| h.into_string().ok());
        let dns_domain = fqdn
            .as_deref()
            .and_then(|h| h.split_once('.'))
            .map(|(_, domain)| Value::String(domain.to_string()));

        inventory.lock().set_operating_system(record(&[
            (
                "KERNEL_NAME",
                sys_value("/proc/sys/kernel/ostype")
                    .or_else(|| Some(Value::String(std::env::consts::OS.to_string()))),
            ),
            ("KERNEL_VERSION", sys_value("/proc/sys/kernel/osrelease")),
            ("NAME", Some(Value::String(std::env::consts::OS.to_string()))),
            ("FULL_NAME", os_release_name()),
            ("VERSION", os_release_version()),
            ("ARCH", Some(Value::String(std::env::consts::ARCH.to_string()))),
            ("FQDN", fqdn.map(Value::String)),
            ("DNS_DOMAIN", dns_domain),
            ("BOOT_TIME", boot_time()),
        ]));
    }
}

fn os_release_field(field: &str) -> Option<String> {
    let release = fs::read_to_string("/etc/os-release").ok()?;
    for line in release.lines() {
        if let Some(value) = line.strip_prefix(field) {
            return Some(value.trim().trim_matches('"').to_string());
        }
    }
    None
}

fn os_release_name() -> Option<Value> {
    os_release_field("PRETTY_NAME=").map(Value::String)
}

fn os_release_version() -> Option<Value> {
    os_release_field("VERSION_ID=").map(Value::String)
}

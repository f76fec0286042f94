// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CPU probe, fed from /proc/cpuinfo.

use parking_lot::Mutex;
use qm_inventory::Inventory;
use serde_json::Value;
use std::fs;
use std::path::Path;

use super::record;
use crate::module::{Module, ModuleContext};

pub(super) struct Cpu;

#[derive(Default)]
struct CpuInfo {
    model: Option<String>,
    vendor: Option<String>,
    mhz: Option<u64>,
    cores: Option<u64>,
    threads: u64,
}

fn parse_cpuinfo(text: &str) -> CpuInfo {
    let mut info = CpuInfo::default();
    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        match key {
            "processor" => info.threads += 1,
            "model name" if info.model.is_none() => info.model = Some(value.to_string()),
            "vendor_id" if info.vendor.is_none() => info.vendor = Some(value.to_string()),
            "cpu MHz" if info.mhz.is_none() => {
                info.mhz = value.parse::<f64>().ok().map(|f| f as u64);
            }
            "cpu cores" if info.cores.is_none() => info.cores = value.parse().ok(),
            _ => {}
        }
    }
    info
}

impl Module for Cpu {
    fn name(&self) -> &'static str {
        "generic::cpu"
    }

    fn category(&self) -> &'static str {
        "cpu"
    }

    fn is_enabled(&self, ctx: &ModuleContext) -> bool {
        ctx.remote.is_none() && Path::new("/proc/cpuinfo").is_file()
    }

    fn do_inventory(&self, _ctx: &ModuleContext, inventory: &Mutex<Inventory>) {
        let Ok(text) = fs::read_to_string("/proc/cpuinfo") else {
            return;
        };
        let info = parse_cpuinfo(&text);
        if info.threads == 0 {
            return;
        }

        let entry = record(&[
            ("NAME", info.model.map(Value::String)),
            ("MANUFACTURER", info.vendor.map(Value::String)),
            ("SPEED", info.mhz.map(|n| Value::Number(n.into()))),
            ("CORE", info.cores.map(|n| Value::Number(n.into()))),
            ("THREAD", Some(Value::Number(info.threads.into()))),
            ("ARCH", Some(Value::String(std::env::consts::ARCH.to_string()))),
        ]);
        if !entry.is_empty() {
            let _ = inventory.lock().add_entry("CPUS", entry);
        }
    }
}

#[cfg(test)]
#[path = "cpu_tests.rs"]
mod tests;

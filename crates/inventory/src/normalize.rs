// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Normalization of a document to the server JSON format.
//!
//! Coerces declared fields, enforces required fields, applies legacy
//! renames, and strips values the server schema rejects.

use chrono::NaiveDate;
use regex::Regex;
use serde_json::{Map, Number, Value};
use std::sync::LazyLock;

#[allow(clippy::expect_used)]
static DATE_QR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}$").expect("constant regex pattern is valid")
});

#[allow(clippy::expect_used)]
static DATETIME_QR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}[ T][0-9]{2}:[0-9]{2}:[0-9]{2}(Z|[+-][0-9]{2}:[0-9]{2}(:[0-9]{2})?)?$")
        .expect("constant regex pattern is valid")
});

#[allow(clippy::expect_used)]
static DATEORDATETIME_QR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}([ T][0-9]{2}:[0-9]{2}:[0-9]{2}(Z|[+-][0-9]{2}:[0-9]{2}(:[0-9]{2})?)?)?$")
        .expect("constant regex pattern is valid")
});

#[allow(clippy::expect_used)]
static DMY_QR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{2})/(\d{2})/(\d{4})").expect("constant regex pattern is valid")
});

/// One section's coercion and constraint set.
///
/// Keys of the form `PARENT/CHILD` address nested entries, e.g. the
/// databases below each database service.
pub(crate) struct NormRule {
    pub key: &'static str,
    pub required: &'static [&'static str],
    pub integer: &'static [&'static str],
    pub string: &'static [&'static str],
    pub boolean: &'static [&'static str],
    pub lowercase: &'static [&'static str],
    pub uppercase: &'static [&'static str],
    pub date: &'static [&'static str],
    pub datetime: &'static [&'static str],
    pub dateordatetime: &'static [&'static str],
    pub patterns: &'static [(&'static str, &'static str)],
}

const BASE: NormRule = NormRule {
    key: "",
    required: &[],
    integer: &[],
    string: &[],
    boolean: &[],
    lowercase: &[],
    uppercase: &[],
    date: &[],
    datetime: &[],
    dateordatetime: &[],
    patterns: &[],
};

pub(crate) const NORMALIZE: &[NormRule] = &[
    NormRule { key: "ACCESSLOG", required: &["LOGDATE"], datetime: &["LOGDATE"], ..BASE },
    NormRule { key: "ANTIVIRUS", boolean: &["ENABLED", "UPTODATE"], date: &["EXPIRATION"], ..BASE },
    NormRule {
        key: "BATTERIES",
        date: &["DATE"],
        integer: &["CAPACITY", "REAL_CAPACITY", "VOLTAGE"],
        ..BASE
    },
    NormRule { key: "BIOS", dateordatetime: &["BDATE"], ..BASE },
    NormRule {
        key: "CPUS",
        integer: &["CORE", "CORECOUNT", "EXTERNAL_CLOCK", "SPEED", "STEPPING", "THREAD"],
        string: &["MODEL", "FAMILYNUMBER"],
        ..BASE
    },
    NormRule {
        key: "DATABASES_SERVICES",
        required: &["NAME", "VERSION"],
        integer: &["PORT", "SIZE"],
        boolean: &["IS_ACTIVE", "IS_ONBACKUP"],
        datetime: &["LAST_BOOT_DATE", "LAST_BACKUP_DATE"],
        ..BASE
    },
    NormRule {
        key: "DATABASES_SERVICES/DATABASES",
        required: &["NAME"],
        integer: &["SIZE"],
        boolean: &["IS_ACTIVE", "IS_ONBACKUP"],
        datetime: &["CREATION_DATE", "UPDATE_DATE", "LAST_BACKUP_DATE"],
        ..BASE
    },
    NormRule {
        key: "DRIVES",
        boolean: &["SYSTEMDRIVE"],
        integer: &["FREE", "TOTAL"],
        ..BASE
    },
    NormRule { key: "ENVS", required: &["KEY", "VAL"], ..BASE },
    NormRule { key: "FIREWALLS", required: &["STATUS"], ..BASE },
    NormRule { key: "HARDWARE", integer: &["MEMORY", "SWAP"], ..BASE },
    NormRule { key: "LOCAL_GROUPS", required: &["ID", "NAME"], ..BASE },
    NormRule { key: "LOCAL_USERS", required: &["ID"], ..BASE },
    NormRule {
        key: "PHYSICAL_VOLUMES",
        required: &["DEVICE", "FORMAT", "FREE", "PV_PE_COUNT", "PV_UUID", "SIZE"],
        integer: &["FREE", "PE_SIZE", "PV_PE_COUNT", "SIZE"],
        ..BASE
    },
    NormRule {
        key: "VOLUME_GROUPS",
        required: &["FREE", "LV_COUNT", "PV_COUNT", "SIZE", "VG_EXTENT_SIZE", "VG_NAME", "VG_UUID"],
        integer: &["FREE", "LV_COUNT", "PV_COUNT", "SIZE"],
        ..BASE
    },
    NormRule {
        key: "LOGICAL_VOLUMES",
        required: &["LV_NAME", "LV_UUID", "SIZE"],
        integer: &["SEG_COUNT", "SIZE"],
        ..BASE
    },
    NormRule {
        key: "MEMORIES",
        integer: &["CAPACITY", "NUMSLOTS"],
        boolean: &["REMOVABLE"],
        ..BASE
    },
    NormRule { key: "MONITORS", string: &["DESCRIPTION", "SERIAL", "ALTSERIAL"], ..BASE },
    NormRule {
        key: "NETWORKS",
        required: &["DESCRIPTION"],
        boolean: &["MANAGEMENT", "VIRTUALDEV"],
        integer: &["MTU"],
        lowercase: &["STATUS"],
        string: &["SPEED"],
        ..BASE
    },
    NormRule {
        key: "OPERATINGSYSTEM",
        datetime: &["BOOT_TIME", "INSTALL_DATE"],
        ..BASE
    },
    NormRule { key: "OPERATINGSYSTEM/TIMEZONE", required: &["NAME", "OFFSET"], ..BASE },
    NormRule { key: "PORTS", required: &["TYPE"], ..BASE },
    NormRule {
        key: "PRINTERS",
        required: &["NAME"],
        boolean: &["NETWORK", "SHARED"],
        ..BASE
    },
    NormRule {
        key: "PROCESSES",
        required: &["CMD", "PID", "USER"],
        datetime: &["STARTED"],
        integer: &["PID", "VIRTUALMEMORY"],
        ..BASE
    },
    NormRule { key: "REMOTE_MGMT", required: &["ID", "TYPE"], string: &["ID"], ..BASE },
    NormRule { key: "SLOTS", required: &["DESCRIPTION", "NAME"], ..BASE },
    NormRule {
        key: "SOFTWARES",
        required: &["NAME"],
        boolean: &["NO_REMOVE"],
        dateordatetime: &["INSTALLDATE"],
        integer: &["FILESIZE"],
        string: &["VERSION_MAJOR", "VERSION_MINOR"],
        ..BASE
    },
    NormRule {
        key: "STORAGES",
        integer: &["DISKSIZE"],
        uppercase: &["INTERFACE"],
        ..BASE
    },
    NormRule { key: "VIDEOS", integer: &["MEMORY"], ..BASE },
    NormRule {
        key: "VIRTUALMACHINES",
        required: &["NAME", "VMTYPE"],
        integer: &["MEMORY", "VCPU"],
        lowercase: &["STATUS", "VMTYPE"],
        patterns: &[("STATUS", r"^(running|blocked|idle|paused|shutdown|crashed|dying|off)$")],
        ..BASE
    },
    NormRule {
        key: "LICENSEINFOS",
        boolean: &["TRIAL"],
        datetime: &["ACTIVATION_DATE"],
        ..BASE
    },
    NormRule {
        key: "POWERSUPPLIES",
        boolean: &["HOTREPLACEABLE", "PLUGGED"],
        integer: &["POWER_MAX"],
        ..BASE
    },
    NormRule { key: "VERSIONPROVIDER", integer: &["ETIME"], ..BASE },
];

/// Server-version specifics that amend the rule set.
struct VersionTweaks {
    /// 10.0.0-beta has no boolean support for MEMORIES.REMOVABLE.
    memories_removable_as_string: bool,
}

fn version_tweaks(version: Option<&str>) -> VersionTweaks {
    let mut tweaks = VersionTweaks { memories_removable_as_string: false };
    let Some(version) = version else {
        return tweaks;
    };
    let base = version.split('-').next().unwrap_or(version);
    let suffix = version.strip_prefix(base).unwrap_or("").trim_start_matches('-');
    match suffix {
        "dev" => tracing::trace!(
            "inventory format: server is a development version, \
             the JSON inventory may be rejected by an outdated server schema"
        ),
        "beta" => {
            tracing::trace!("inventory format: server is a beta version");
            if base == "10.0.0" {
                tweaks.memories_removable_as_string = true;
            }
        }
        _ => {}
    }
    tweaks
}

/// Normalize content in place; returns the hoisted tag, if any.
pub(crate) fn normalize(content: &mut Map<String, Value>, server_version: Option<&str>) -> Option<String> {
    let tweaks = version_tweaks(server_version);

    for rule in NORMALIZE {
        match rule.key.split_once('/') {
            None => {
                if content.contains_key(rule.key) {
                    apply_rule_at(content, rule.key, rule, &tweaks);
                }
            }
            Some((parent_key, child_key)) => {
                let Some(parent) = content.get_mut(parent_key) else {
                    continue;
                };
                match parent {
                    Value::Array(items) => {
                        for item in items {
                            if let Some(record) = item.as_object_mut() {
                                if record.contains_key(child_key) {
                                    apply_rule_at(record, child_key, rule, &tweaks);
                                }
                            }
                        }
                    }
                    Value::Object(record) => {
                        if record.contains_key(child_key) {
                            apply_rule_at(record, child_key, rule, &tweaks);
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    cleanup_nulls(content);
    transform(content);
    hoist_tag(content)
}

/// Apply one rule to `container[key]`, removing the key when every
/// entry fails a required constraint.
fn apply_rule_at(
    container: &mut Map<String, Value>,
    key: &str,
    rule: &NormRule,
    tweaks: &VersionTweaks,
) {
    let Some(value) = container.get_mut(key) else {
        return;
    };

    match value {
        Value::Array(items) => {
            for item in items.iter_mut() {
                if let Some(record) = item.as_object_mut() {
                    apply_norms(record, rule, tweaks);
                }
            }
            if !rule.required.is_empty() {
                items.retain(|item| match item.as_object() {
                    Some(record) => require_ok(record, rule),
                    None => false,
                });
                if items.is_empty() {
                    tracing::debug!("inventory format: removed all {} entry elements", rule.key);
                    container.remove(key);
                }
            }
        }
        Value::Object(record) => {
            apply_norms(record, rule, tweaks);
            if !rule.required.is_empty() && !require_ok(record, rule) {
                container.remove(key);
            }
        }
        _ => {}
    }
}

fn require_ok(record: &Map<String, Value>, rule: &NormRule) -> bool {
    let missing: Vec<&str> = rule
        .required
        .iter()
        .filter(|field| record.get(**field).map(Value::is_null).unwrap_or(true))
        .copied()
        .collect();
    if missing.is_empty() {
        return true;
    }
    tracing::debug!(
        "inventory format: removing {} entry with required missing {}",
        rule.key,
        missing.join(", "),
    );
    false
}

fn apply_norms(record: &mut Map<String, Value>, rule: &NormRule, tweaks: &VersionTweaks) {
    for field in rule.integer {
        norm_integer(record, field, rule.key);
    }
    for field in rule.string {
        norm_string(record, field);
    }
    for field in rule.boolean {
        if rule.key == "MEMORIES" && *field == "REMOVABLE" && tweaks.memories_removable_as_string {
            norm_string(record, field);
        } else {
            norm_boolean(record, field);
        }
    }
    for field in rule.lowercase {
        if let Some(Value::String(s)) = record.get_mut(*field) {
            *s = s.to_lowercase();
        }
    }
    for field in rule.uppercase {
        if let Some(Value::String(s)) = record.get_mut(*field) {
            *s = s.to_uppercase();
        }
    }
    for field in rule.date {
        norm_temporal(record, field, rule.key, &DATE_QR, |v| canonical_date(v));
    }
    for field in rule.datetime {
        norm_temporal(record, field, rule.key, &DATETIME_QR, |v| canonical_datetime(v));
    }
    for field in rule.dateordatetime {
        let inverted = *field == "BDATE";
        norm_temporal(record, field, rule.key, &DATEORDATETIME_QR, |v| {
            canonical_dateordatetime(v, inverted)
        });
    }
    for (field, pattern) in rule.patterns {
        norm_pattern(record, field, pattern, rule.key);
    }
}

fn norm_integer(record: &mut Map<String, Value>, field: &str, key: &str) {
    let Some(value) = record.get(field) else {
        return;
    };
    match value {
        Value::Null => {}
        Value::Number(n) if n.is_u64() || n.is_i64() => {}
        Value::String(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => {
            if let Ok(n) = s.parse::<u64>() {
                record.insert(field.to_string(), Value::Number(Number::from(n)));
            } else {
                drop_field(record, field, key, "integer");
            }
        }
        _ => drop_field(record, field, key, "integer"),
    }
}

fn norm_string(record: &mut Map<String, Value>, field: &str) {
    let Some(value) = record.get(field) else {
        return;
    };
    match value {
        Value::Null | Value::String(_) => {}
        other => {
            let text = other.to_string();
            record.insert(field.to_string(), Value::String(text));
        }
    }
}

fn norm_boolean(record: &mut Map<String, Value>, field: &str) {
    let Some(value) = record.get(field) else {
        return;
    };
    let truthy = match value {
        Value::Null => return,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        _ => true,
    };
    record.insert(field.to_string(), Value::Bool(truthy));
}

fn norm_temporal(
    record: &mut Map<String, Value>,
    field: &str,
    key: &str,
    accept: &Regex,
    canonical: impl Fn(&str) -> Option<String>,
) {
    let Some(value) = record.get(field) else {
        return;
    };
    if value.is_null() {
        return;
    }
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if accept.is_match(&text) {
        return;
    }
    match canonical(&text) {
        Some(fixed) => {
            record.insert(field.to_string(), Value::String(fixed));
        }
        None => drop_field(record, field, key, "date"),
    }
}

fn norm_pattern(record: &mut Map<String, Value>, field: &str, pattern: &str, key: &str) {
    let Some(Value::String(text)) = record.get(field) else {
        return;
    };
    #[allow(clippy::expect_used)]
    let re = Regex::new(&format!("(?i){pattern}")).expect("constant regex pattern is valid");
    if !re.is_match(text) {
        tracing::debug!(
            "inventory format: removing {key} {field} value as not matching /{pattern}/: '{text}'"
        );
        record.remove(field);
    }
}

fn drop_field(record: &mut Map<String, Value>, field: &str, key: &str, norm: &str) {
    if let Some(value) = record.remove(field) {
        tracing::debug!(
            "inventory format: removing {key} {field} value as not of {norm} type: '{value}'"
        );
    }
}

fn cleanup_nulls(map: &mut Map<String, Value>) {
    map.retain(|_, v| !v.is_null());
    for value in map.values_mut() {
        cleanup_nulls_value(value);
    }
}

fn cleanup_nulls_value(value: &mut Value) {
    match value {
        Value::Object(map) => cleanup_nulls(map),
        Value::Array(items) => {
            for item in items {
                cleanup_nulls_value(item);
            }
        }
        _ => {}
    }
}

/// Legacy renames and server-rejected values.
fn transform(content: &mut Map<String, Value>) {
    rename_in_entries(content, "LOCAL_GROUPS", "MEMBER", "MEMBERS");
    rename_in_entries(content, "SOFTWARES", "INSTALLDATE", "INSTALL_DATE");

    if let Some(Value::Array(storages)) = content.get_mut("STORAGES") {
        for storage in storages {
            let Some(record) = storage.as_object_mut() else {
                continue;
            };
            if let Some(serialnumber) = record.remove("SERIALNUMBER") {
                if let Some(serial) = record.get("SERIAL") {
                    if *serial != serialnumber {
                        tracing::trace!("replacing {serial} storage serial by {serialnumber}");
                    }
                }
                record.insert("SERIAL".into(), serialnumber);
            }
        }
    }

    if let Some(firewall) = content.remove("FIREWALL") {
        if firewall.is_array() {
            content.insert("FIREWALLS".into(), firewall);
        }
    }

    rename_in_entries(content, "NETWORKS", "MACADDR", "MAC");
    remove_in_entries(content, "LICENSEINFOS", "OEM");
    remove_in_entries(content, "VIDEOS", "PCIID");
    content.remove("RUDDER");
    content.remove("REGISTRY");
}

fn rename_in_entries(content: &mut Map<String, Value>, section: &str, from: &str, to: &str) {
    if let Some(Value::Array(entries)) = content.get_mut(section) {
        for entry in entries {
            if let Some(record) = entry.as_object_mut() {
                if let Some(value) = record.remove(from) {
                    record.insert(to.to_string(), value);
                }
            }
        }
    }
}

fn remove_in_entries(content: &mut Map<String, Value>, section: &str, field: &str) {
    if let Some(Value::Array(entries)) = content.get_mut(section) {
        for entry in entries {
            if let Some(record) = entry.as_object_mut() {
                record.remove(field);
            }
        }
    }
}

/// Pop ACCOUNTINFO and return the TAG value for the envelope.
fn hoist_tag(content: &mut Map<String, Value>) -> Option<String> {
    let infos = content.remove("ACCOUNTINFO")?;
    let Value::Array(infos) = infos else {
        return None;
    };
    for info in infos {
        if info.get("KEYNAME").and_then(Value::as_str) == Some("TAG") {
            if let Some(tag) = info.get("KEYVALUE").and_then(Value::as_str) {
                if !tag.is_empty() {
                    return Some(tag.to_string());
                }
            }
        }
    }
    None
}

/// Merge additional content into a normalized document: list sections
/// concatenate, singletons update, scalars replace.
pub(crate) fn merge_additional(content: &mut Map<String, Value>, merge: Map<String, Value>) {
    for (key, value) in merge {
        match (content.get_mut(&key), value) {
            (Some(Value::Array(existing)), Value::Array(mut items)) => {
                existing.append(&mut items);
            }
            (Some(Value::Object(existing)), Value::Object(update)) => {
                for (k, v) in update {
                    existing.insert(k, v);
                }
            }
            (Some(existing), value) if !value.is_array() && !value.is_object() => {
                *existing = value;
            }
            (Some(_), _) => {
                tracing::debug!("content merge: skipping '{key}' due to content type mismatch");
            }
            (None, value) => {
                content.insert(key, value);
            }
        }
    }
}

/// Validate a Y-M-D triple, tolerating swapped month and day.
fn ymd(year: i32, month: u32, day: u32) -> Option<String> {
    NaiveDate::from_ymd_opt(year, month, day)
        .or_else(|| NaiveDate::from_ymd_opt(year, day, month))
        .map(|d| d.format("%Y-%m-%d").to_string())
}

fn canonical_date(text: &str) -> Option<String> {
    if let Some(caps) = DMY_QR.captures(text) {
        let day = caps[1].parse().ok()?;
        let month = caps[2].parse().ok()?;
        let year = caps[3].parse().ok()?;
        return ymd(year, month, day);
    }
    let prefix = text.get(..10)?;
    if DATE_QR.is_match(prefix) {
        let mut parts = prefix.split('-');
        let year = parts.next()?.parse().ok()?;
        let month = parts.next()?.parse().ok()?;
        let day = parts.next()?.parse().ok()?;
        return ymd(year, month, day);
    }
    None
}

fn canonical_datetime(text: &str) -> Option<String> {
    if let Some(caps) = DMY_QR.captures(text) {
        if caps[0].len() == text.len() {
            let day = caps[1].parse().ok()?;
            let month = caps[2].parse().ok()?;
            let year = caps[3].parse().ok()?;
            return ymd(year, month, day).map(|d| format!("{d} 00:00:00"));
        }
    }
    // YYYY-MM-DD HH:MM needs seconds padding
    #[allow(clippy::expect_used)]
    static SHORT_TIME: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^(\d{4})-(\d{2})-(\d{2}) (\d{2}:\d{2})$")
            .expect("constant regex pattern is valid")
    });
    if let Some(caps) = SHORT_TIME.captures(text) {
        let year = caps[1].parse().ok()?;
        let month = caps[2].parse().ok()?;
        let day = caps[3].parse().ok()?;
        return ymd(year, month, day).map(|d| format!("{d} {}:00", &caps[4]));
    }
    None
}

fn canonical_dateordatetime(text: &str, inverted: bool) -> Option<String> {
    let caps = DMY_QR.captures(text)?;
    if caps[0].len() != text.len() {
        return None;
    }
    let first: u32 = caps[1].parse().ok()?;
    let second: u32 = caps[2].parse().ok()?;
    let year: i32 = caps[3].parse().ok()?;
    if inverted {
        ymd(year, first, second)
    } else {
        ymd(year, second, first)
    }
}

#[cfg(test)]
#[path = "normalize_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unit-conversion helpers shared by probes and normalization.

/// Normalize a size string with unit to megabytes.
///
/// Accepts `"120 GB"`, `"1,5 TB"` (decimal comma), `"1 000 000 bytes"`
/// (thousands separators), and binary units (`GiB` forces base 1024).
/// A bare integer passes through unchanged. Unknown units return None.
pub fn canonical_size(size: &str, base: u64) -> Option<f64> {
    let size = size.trim();
    if size.is_empty() {
        return None;
    }
    if size.bytes().all(|b| b.is_ascii_digit()) {
        return size.parse::<f64>().ok();
    }

    let compact: String = size.chars().filter(|c| !c.is_whitespace()).collect();
    let split = compact.find(|c: char| c.is_ascii_alphabetic())?;
    let (value_str, unit) = compact.split_at(split);
    let unit = unit.to_ascii_lowercase();

    // "1,000,000" is a thousands-separated integer, "1,5" a decimal comma
    let looks_grouped = value_str
        .split(',')
        .skip(1)
        .all(|group| group.len() == 3 && group.bytes().all(|b| b.is_ascii_digit()))
        && value_str.contains(',')
        && !value_str.contains('.');
    let normalized = if looks_grouped {
        value_str.replace(',', "")
    } else {
        value_str.replace(',', ".")
    };
    let value: f64 = normalized.parse().ok()?;

    let (unit, base) = match unit.strip_suffix("ib") {
        Some(prefix) if prefix.len() == 1 => (format!("{prefix}b"), 1024u64),
        _ => (unit, base),
    };

    let base = base as f64;
    let multiplier = match unit.as_str() {
        "eb" => base.powi(4),
        "pb" => base.powi(3),
        "tb" => base.powi(2),
        "gb" => base,
        "mb" => 1.0,
        "kb" => 1.0 / base,
        "bytes" | "b" => 1.0 / (base * base),
        _ => return None,
    };
    Some(value * multiplier)
}

/// Numeric value of a colon-separated MAC address.
pub fn numeric_mac(mac: &str) -> Option<u64> {
    let mut value: u64 = 0;
    let mut octets = 0;
    for part in mac.split(':') {
        if part.len() != 2 {
            return None;
        }
        value = (value << 8) | u64::from_str_radix(part, 16).ok()?;
        octets += 1;
    }
    (octets == 6).then_some(value)
}

/// Pick the primary MAC among candidates.
///
/// Virtual interfaces often carry an address one above the physical
/// port, so between numerically adjacent addresses the lower wins;
/// picking the overall lowest satisfies that.
pub fn primary_mac<'a>(macs: &[&'a str]) -> Option<&'a str> {
    macs.iter()
        .filter_map(|m| numeric_mac(m).map(|n| (n, *m)))
        .min_by_key(|(n, _)| *n)
        .map(|(_, m)| m)
}

#[cfg(test)]
#[path = "tools_tests.rs"]
mod tests;

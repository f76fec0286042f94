// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Device identity.
//!
//! The deviceid is the stable key servers use to deduplicate
//! submissions. It is computed once, persisted, and only invalidated
//! when the asset-name policy changes.

use chrono::{DateTime, Datelike, Local, TimeZone, Timelike};
use serde::{Deserialize, Serialize};

/// How the hostname part of the deviceid is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AssetNamePolicy {
    /// Hostname as reported by the system.
    #[default]
    FullName,
    /// Short hostname, domain part stripped.
    Short,
}

impl AssetNamePolicy {
    pub fn from_option(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::FullName),
            2 => Some(Self::Short),
            _ => None,
        }
    }

    pub fn apply<'a>(&self, hostname: &'a str) -> &'a str {
        match self {
            Self::FullName => hostname,
            Self::Short => short_hostname(hostname),
        }
    }
}

/// Strip the domain part of a fully qualified hostname.
pub fn short_hostname(hostname: &str) -> &str {
    hostname.split('.').next().unwrap_or(hostname)
}

/// Build a deviceid: `hostname-YYYY-MM-DD-HH-MM-SS`.
pub fn device_id(hostname: &str, policy: AssetNamePolicy, epoch_secs: u64) -> String {
    let stamp = Local
        .timestamp_opt(epoch_secs as i64, 0)
        .single()
        .unwrap_or_else(|| DateTime::UNIX_EPOCH.into());
    format!(
        "{}-{:04}-{:02}-{:02}-{:02}-{:02}-{:02}",
        policy.apply(hostname),
        stamp.year(),
        stamp.month(),
        stamp.day(),
        stamp.hour(),
        stamp.minute(),
        stamp.second(),
    )
}

/// Check whether a deviceid was built for the given hostname under the
/// given policy. Used to invalidate the stored id on policy change.
pub fn device_id_matches(deviceid: &str, hostname: &str, policy: AssetNamePolicy) -> bool {
    deviceid
        .strip_prefix(policy.apply(hostname))
        .map(|rest| rest.starts_with('-'))
        .unwrap_or(false)
}

#[cfg(test)]
#[path = "identity_tests.rs"]
mod tests;

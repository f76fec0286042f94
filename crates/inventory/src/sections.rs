// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Known sections, their field sets, per-field checks, and the
//! user-facing category map.

use regex::Regex;
use std::sync::LazyLock;

/// Declared fields per section. Unknown sections and unknown fields are
/// rejected at insertion time.
pub const FIELDS: &[(&str, &[&str])] = &[
    ("BIOS", &[
        "SMODEL", "SMANUFACTURER", "SSN", "BDATE", "BVERSION", "BMANUFACTURER",
        "MMANUFACTURER", "MSN", "MMODEL", "ASSETTAG", "ENCLOSURESERIAL", "BIOSSERIAL",
        "SKUNUMBER",
    ]),
    ("HARDWARE", &[
        "NAME", "SWAP", "TYPE", "WORKGROUP", "DESCRIPTION", "MEMORY", "UUID", "DNS",
        "LASTLOGGEDUSER", "DATELASTLOGGEDUSER", "DEFAULTGATEWAY", "VMSYSTEM", "WINOWNER",
        "WINPRODID", "WINPRODKEY", "WINCOMPANY", "WINLANG", "CHASSIS_TYPE",
    ]),
    ("OPERATINGSYSTEM", &[
        "KERNEL_NAME", "KERNEL_VERSION", "NAME", "VERSION", "FULL_NAME", "SERVICE_PACK",
        "INSTALL_DATE", "FQDN", "DNS_DOMAIN", "HOSTID", "SSH_KEY", "ARCH", "BOOT_TIME",
        "TIMEZONE",
    ]),
    ("ACCESSLOG", &["USERID", "LOGDATE"]),
    ("ANTIVIRUS", &[
        "COMPANY", "ENABLED", "GUID", "NAME", "UPTODATE", "VERSION", "EXPIRATION",
        "BASE_CREATION", "BASE_VERSION",
    ]),
    ("BATTERIES", &[
        "CAPACITY", "CHEMISTRY", "DATE", "NAME", "SERIAL", "MANUFACTURER", "VOLTAGE",
        "REAL_CAPACITY",
    ]),
    ("CONTROLLERS", &[
        "CAPTION", "DRIVER", "NAME", "MANUFACTURER", "PCICLASS", "VENDORID", "SERIAL",
        "MODEL", "PRODUCTID", "PCISUBSYSTEMID", "PCISLOT", "TYPE", "REV",
    ]),
    ("CPUS", &[
        "CACHE", "CORE", "DESCRIPTION", "MANUFACTURER", "NAME", "THREAD", "SERIAL",
        "STEPPING", "FAMILYNAME", "FAMILYNUMBER", "MODEL", "SPEED", "ID",
        "EXTERNAL_CLOCK", "ARCH", "CORECOUNT",
    ]),
    ("DATABASES_SERVICES", &[
        "TYPE", "NAME", "VERSION", "MANUFACTURER", "PORT", "PATH", "SIZE", "IS_ACTIVE",
        "IS_ONBACKUP", "LAST_BOOT_DATE", "LAST_BACKUP_DATE", "DATABASES",
    ]),
    ("DRIVES", &[
        "CREATEDATE", "DESCRIPTION", "FREE", "FILESYSTEM", "LABEL", "LETTER", "SERIAL",
        "SYSTEMDRIVE", "TOTAL", "TYPE", "VOLUMN", "ENCRYPT_NAME", "ENCRYPT_ALGO",
        "ENCRYPT_STATUS", "ENCRYPT_TYPE",
    ]),
    ("ENVS", &["KEY", "VAL"]),
    ("INPUTS", &[
        "NAME", "MANUFACTURER", "CAPTION", "DESCRIPTION", "INTERFACE", "LAYOUT",
        "POINTINGTYPE", "TYPE",
    ]),
    ("FIREWALL", &["PROFILE", "STATUS", "DESCRIPTION", "IPADDRESS", "IPADDRESS6"]),
    ("LICENSEINFOS", &[
        "NAME", "FULLNAME", "KEY", "COMPONENTS", "TRIAL", "UPDATE", "OEM",
        "ACTIVATION_DATE", "PRODUCTID",
    ]),
    ("LOCAL_GROUPS", &["ID", "MEMBER", "NAME"]),
    ("LOCAL_USERS", &["HOME", "ID", "LOGIN", "NAME", "SHELL"]),
    ("LOGICAL_VOLUMES", &[
        "LV_NAME", "VG_NAME", "ATTR", "SIZE", "LV_UUID", "SEG_COUNT", "VG_UUID",
    ]),
    ("MEMORIES", &[
        "CAPACITY", "CAPTION", "FORMFACTOR", "REMOVABLE", "PURPOSE", "SPEED",
        "SERIALNUMBER", "TYPE", "DESCRIPTION", "NUMSLOTS", "MEMORYCORRECTION",
        "MANUFACTURER", "MODEL",
    ]),
    ("MODEMS", &["DESCRIPTION", "NAME", "TYPE", "MODEL"]),
    ("MONITORS", &[
        "BASE64", "CAPTION", "DESCRIPTION", "MANUFACTURER", "SERIAL", "UUENCODE", "NAME",
        "TYPE", "ALTSERIAL", "PORT",
    ]),
    ("NETWORKS", &[
        "DESCRIPTION", "MANUFACTURER", "MODEL", "MANAGEMENT", "TYPE", "VIRTUALDEV",
        "MACADDR", "WWN", "DRIVER", "FIRMWARE", "PCIID", "PCISLOT", "PNPDEVICEID", "MTU",
        "SPEED", "STATUS", "SLAVES", "BASE", "IPADDRESS", "IPSUBNET", "IPMASK", "IPDHCP",
        "IPGATEWAY", "IPADDRESS6", "IPSUBNET6", "IPMASK6", "WIFI_BSSID", "WIFI_SSID",
        "WIFI_MODE", "WIFI_VERSION",
    ]),
    ("PHYSICAL_VOLUMES", &[
        "DEVICE", "PV_PE_COUNT", "PV_UUID", "FORMAT", "ATTR", "SIZE", "FREE", "PE_SIZE",
        "VG_UUID",
    ]),
    ("PORTS", &["CAPTION", "DESCRIPTION", "NAME", "TYPE"]),
    ("POWERSUPPLIES", &[
        "PARTNUM", "SERIALNUMBER", "MANUFACTURER", "POWER_MAX", "NAME", "HOTREPLACEABLE",
        "PLUGGED", "STATUS", "LOCATION", "MODEL",
    ]),
    ("PRINTERS", &[
        "COMMENT", "DESCRIPTION", "DRIVER", "NAME", "NETWORK", "PORT", "RESOLUTION",
        "SHARED", "STATUS", "ERRSTATUS", "SERVERNAME", "SHARENAME", "PRINTPROCESSOR",
        "SERIAL",
    ]),
    ("PROCESSES", &[
        "USER", "PID", "CPUUSAGE", "MEM", "VIRTUALMEMORY", "TTY", "STARTED", "CMD",
    ]),
    ("REGISTRY", &["NAME", "REGVALUE", "HIVE"]),
    ("REMOTE_MGMT", &["ID", "TYPE"]),
    ("RUDDER", &["AGENT", "UUID", "HOSTNAME", "SERVER_ROLES", "AGENT_CAPABILITIES"]),
    ("SLOTS", &["DESCRIPTION", "DESIGNATION", "NAME", "STATUS"]),
    ("SOFTWARES", &[
        "COMMENTS", "FILESIZE", "FOLDER", "FROM", "HELPLINK", "INSTALLDATE", "NAME",
        "NO_REMOVE", "RELEASE_TYPE", "PUBLISHER", "UNINSTALL_STRING", "URL_INFO_ABOUT",
        "VERSION", "VERSION_MINOR", "VERSION_MAJOR", "GUID", "ARCH", "USERNAME", "USERID",
        "SYSTEM_CATEGORY",
    ]),
    ("SOUNDS", &["CAPTION", "DESCRIPTION", "MANUFACTURER", "NAME"]),
    ("STORAGES", &[
        "DESCRIPTION", "DISKSIZE", "INTERFACE", "MANUFACTURER", "MODEL", "NAME", "TYPE",
        "SERIAL", "SERIALNUMBER", "FIRMWARE", "SCSI_COID", "SCSI_CHID", "SCSI_UNID",
        "SCSI_LUN", "WWN", "ENCRYPT_NAME", "ENCRYPT_ALGO", "ENCRYPT_STATUS",
        "ENCRYPT_TYPE",
    ]),
    ("VIDEOS", &["CHIPSET", "MEMORY", "NAME", "RESOLUTION", "PCISLOT", "PCIID"]),
    ("USBDEVICES", &[
        "VENDORID", "PRODUCTID", "MANUFACTURER", "CAPTION", "SERIAL", "CLASS", "SUBCLASS",
        "NAME",
    ]),
    ("USERS", &["LOGIN", "DOMAIN"]),
    ("VIRTUALMACHINES", &[
        "MEMORY", "NAME", "UUID", "STATUS", "SUBSYSTEM", "VMTYPE", "VCPU", "MAC",
        "COMMENT", "OWNER", "SERIAL", "IMAGE", "IPADDRESS", "OPERATINGSYSTEM",
    ]),
    ("VOLUME_GROUPS", &[
        "VG_NAME", "PV_COUNT", "LV_COUNT", "ATTR", "SIZE", "FREE", "VG_UUID",
        "VG_EXTENT_SIZE",
    ]),
    ("VERSIONPROVIDER", &[
        "NAME", "VERSION", "COMMENTS", "PROGRAM", "ETIME",
    ]),
];

/// Sections holding a single record instead of a sequence.
pub const SINGLETON_SECTIONS: &[&str] = &[
    "BIOS",
    "HARDWARE",
    "OPERATINGSYSTEM",
    "ACCESSLOG",
    "VERSIONPROVIDER",
];

/// Sections always kept in a partial submission.
pub const ALWAYS_KEEP_SECTIONS: &[&str] = &["BIOS", "HARDWARE"];

/// Sections excluded from change detection.
pub const DONT_CHECK_SECTIONS: &[&str] = &["ACCESSLOG", "VERSIONPROVIDER"];

/// Sections subject to change detection, alphabetical for determinism.
pub static CHECKED_SECTIONS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    let mut sections: Vec<&str> = FIELDS
        .iter()
        .map(|(name, _)| *name)
        .filter(|name| !DONT_CHECK_SECTIONS.contains(name))
        .collect();
    sections.sort_unstable();
    sections
});

/// Per-field value constraint.
///
/// `not_since` disables the check when targeting a server at or above
/// that version.
pub struct FieldCheck {
    pub section: &'static str,
    pub field: &'static str,
    pub pattern: &'static str,
    pub not_since: Option<u64>,
}

pub const CHECKS: &[FieldCheck] = &[
    FieldCheck {
        section: "STORAGES",
        field: "INTERFACE",
        pattern: r"^(SCSI|HDC|IDE|USB|1394|SATA|SAS|ATAPI)$",
        // 10.0.4 accepts free-form interfaces
        not_since: Some(10_000_004),
    },
    FieldCheck {
        section: "VIRTUALMACHINES",
        field: "STATUS",
        pattern: r"^(running|blocked|idle|paused|shutdown|crashed|dying|off)$",
        not_since: None,
    },
    FieldCheck {
        section: "SLOTS",
        field: "STATUS",
        pattern: r"^(free|used)$",
        not_since: None,
    },
    FieldCheck {
        section: "NETWORKS",
        field: "TYPE",
        pattern: r"^(ethernet|wifi|infiniband|aggregate|alias|dialup|loopback|bridge|fibrechannel|bluetooth)$",
        not_since: None,
    },
    FieldCheck {
        section: "CPUS",
        field: "ARCH",
        pattern: r"^(mips|mips64|alpha|sparc|sparc64|m68k|i386|x86_64|powerpc|powerpc64|arm.*|aarch64)$",
        not_since: None,
    },
];

/// Category → sections. Categories are what users disable or require;
/// sections are what the document stores.
pub const CATEGORY_MAP: &[(&str, &[&str])] = &[
    ("os", &["OPERATINGSYSTEM"]),
    ("battery", &["BATTERIES"]),
    ("controller", &["CONTROLLERS"]),
    ("cpu", &["CPUS"]),
    ("database", &["DATABASES_SERVICES"]),
    ("drive", &["DRIVES"]),
    ("environment", &["ENVS"]),
    ("input", &["INPUTS"]),
    ("licenseinfo", &["LICENSEINFOS"]),
    ("local_group", &["LOCAL_GROUPS"]),
    ("local_user", &["LOCAL_USERS"]),
    ("lvm", &["LOGICAL_VOLUMES", "PHYSICAL_VOLUMES", "VOLUME_GROUPS"]),
    ("memory", &["MEMORIES"]),
    ("modem", &["MODEMS"]),
    ("monitor", &["MONITORS"]),
    ("network", &["NETWORKS"]),
    ("port", &["PORTS"]),
    ("psu", &["POWERSUPPLIES"]),
    ("printer", &["PRINTERS"]),
    ("process", &["PROCESSES"]),
    ("slot", &["SLOTS"]),
    ("software", &["SOFTWARES", "OPERATINGSYSTEM"]),
    ("sound", &["SOUNDS"]),
    ("storage", &["STORAGES"]),
    ("video", &["VIDEOS"]),
    ("usb", &["USBDEVICES"]),
    ("user", &["USERS"]),
    ("virtualmachine", &["VIRTUALMACHINES"]),
    ("provider", &["VERSIONPROVIDER"]),
];

/// True if the section is declared.
pub fn known_section(name: &str) -> bool {
    FIELDS.iter().any(|(section, _)| *section == name)
}

/// Declared fields for a section.
pub fn section_fields(name: &str) -> Option<&'static [&'static str]> {
    FIELDS
        .iter()
        .find(|(section, _)| *section == name)
        .map(|(_, fields)| *fields)
}

pub fn is_singleton_section(name: &str) -> bool {
    SINGLETON_SECTIONS.contains(&name)
}

/// The value constraint for a field, honoring the targeted server
/// version.
pub fn field_check(section: &str, field: &str, glpi_version: u64) -> Option<&'static FieldCheck> {
    CHECKS
        .iter()
        .find(|c| c.section == section && c.field == field)
        .filter(|c| match c.not_since {
            Some(since) => glpi_version < since,
            None => true,
        })
}

#[allow(clippy::expect_used)]
pub(crate) fn check_regex(check: &FieldCheck) -> Regex {
    Regex::new(check.pattern).expect("constant regex pattern is valid")
}

/// Sections for one category, if declared.
pub fn category_sections(category: &str) -> Option<&'static [&'static str]> {
    CATEGORY_MAP
        .iter()
        .find(|(name, _)| *name == category)
        .map(|(_, sections)| *sections)
}

/// All declared categories, in declaration order.
pub fn known_categories() -> impl Iterator<Item = &'static str> {
    CATEGORY_MAP.iter().map(|(name, _)| *name)
}

/// Expand categories to section names. An unknown category falls back
/// to its uppercased name, letting callers require a raw section.
pub fn sections_for_categories<'a>(
    categories: impl IntoIterator<Item = &'a str>,
) -> Vec<String> {
    let mut sections = Vec::new();
    for category in categories {
        match category_sections(category) {
            Some(mapped) => sections.extend(mapped.iter().map(|s| s.to_string())),
            None => sections.push(category.to_uppercase()),
        }
    }
    sections
}

/// Numeric form of a GLPI version string: `10.0.4` → 10_000_004.
/// A leading `v` and any `-suffix` are tolerated.
pub fn glpi_version(version: &str) -> u64 {
    let version = version.trim().trim_start_matches('v');
    let version = version.split('-').next().unwrap_or(version);
    let mut parts = version.split('.');
    let mut next = |scale: u64| {
        parts
            .next()
            .and_then(|p| p.parse::<u64>().ok())
            .unwrap_or(0)
            * scale
    };
    next(1_000_000) + next(1_000) + next(1)
}

#[cfg(test)]
#[path = "sections_tests.rs"]
mod tests;

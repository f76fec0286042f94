// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The inventory document: a sectioned entity store with field
//! validation at insertion time.

use serde_json::{Map, Value};
use std::path::PathBuf;
use thiserror::Error;

use crate::normalize;
use crate::sections::{self, field_check, is_singleton_section, section_fields};

/// Agent software identification carried in every document.
pub const PROVIDER: &str = "Quartermaster";
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Errors that can occur while building a document
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("unknown section {0}")]
    UnknownSection(String),
    #[error("no entry")]
    EmptyEntry,
    #[error("no content to merge")]
    NoContent,
    #[error("unsupported format {0}")]
    UnsupportedFormat(String),
    #[error("can't write to {0}: {1}")]
    Write(PathBuf, std::io::Error),
    #[error("xml serialization error: {0}")]
    Xml(String),
}

/// Output serialization for a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Json,
    Xml,
    Html,
}

impl Format {
    pub fn extension(&self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Xml => "xml",
            Format::Html => "html",
        }
    }
}

impl std::str::FromStr for Format {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(Format::Json),
            "xml" => Ok(Format::Xml),
            "html" => Ok(Format::Html),
            other => Err(InventoryError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Construction parameters for [`Inventory`].
#[derive(Debug, Default, Clone)]
pub struct InventoryConfig {
    pub deviceid: String,
    /// Directory holding last-state files; change suppression is
    /// disabled without it.
    pub statedir: Option<PathBuf>,
    /// Targeted GLPI version, e.g. `10.0.4`.
    pub glpi: Option<String>,
    /// Categories that must never be dropped from a submission.
    pub required: Vec<String>,
    /// Asset item type, `Computer` unless configured.
    pub itemtype: Option<String>,
    pub tag: Option<String>,
}

/// The in-memory inventory document.
///
/// Content maps section name to a record (singleton sections) or a
/// sequence of records. All values pass field validation on the way in.
#[derive(Clone)]
pub struct Inventory {
    deviceid: String,
    statedir: Option<PathBuf>,
    glpi_version: u64,
    required: Vec<String>,
    itemtype: String,
    format: Format,
    remote: Option<String>,
    full: bool,
    partial: bool,
    content: Map<String, Value>,
    /// Deferred additional content, merged after normalization.
    json_merge: Option<Map<String, Value>>,
}

/// A document normalized for the JSON protocol, ready for enveloping.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedInventory {
    pub deviceid: String,
    pub itemtype: String,
    pub partial: bool,
    pub tag: Option<String>,
    pub content: Map<String, Value>,
}

impl Inventory {
    pub fn new(config: InventoryConfig) -> Self {
        let mut content = Map::new();
        let mut hardware = Map::new();
        hardware.insert("VMSYSTEM".into(), Value::String("Physical".into()));
        content.insert("HARDWARE".into(), Value::Object(hardware));
        content.insert(
            "VERSIONCLIENT".into(),
            Value::String(format!("{PROVIDER}-Inventory_v{VERSION}")),
        );
        if let Some(tag) = config.tag.as_deref().filter(|t| !t.is_empty()) {
            content.insert(
                "ACCOUNTINFO".into(),
                serde_json::json!([{ "KEYNAME": "TAG", "KEYVALUE": tag }]),
            );
        }

        Self {
            deviceid: config.deviceid,
            statedir: config.statedir,
            glpi_version: config
                .glpi
                .as_deref()
                .map(sections::glpi_version)
                .unwrap_or_else(|| sections::glpi_version("10")),
            required: config.required,
            itemtype: match config.itemtype {
                Some(t) if !t.is_empty() => t,
                _ => "Computer".to_string(),
            },
            format: Format::default(),
            remote: None,
            full: false,
            partial: false,
            content,
            json_merge: None,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.deviceid
    }

    pub fn itemtype(&self) -> &str {
        &self.itemtype
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn set_format(&mut self, format: Format) {
        self.format = format;
    }

    pub fn is_full(&self) -> bool {
        self.full
    }

    pub fn set_full(&mut self, full: bool) {
        self.full = full;
    }

    pub fn is_partial(&self) -> bool {
        self.partial
    }

    pub fn set_partial(&mut self, partial: bool) {
        self.partial = partial;
    }

    /// The remote task identity, when inventorying a remote device.
    pub fn remote(&self) -> Option<&str> {
        self.remote.as_deref()
    }

    pub fn set_remote(&mut self, task: Option<String>) {
        self.remote = task.filter(|t| !t.is_empty());
    }

    pub(crate) fn statedir(&self) -> Option<&std::path::Path> {
        self.statedir.as_deref()
    }

    pub(crate) fn required_categories(&self) -> &[String] {
        &self.required
    }

    pub fn content(&self) -> &Map<String, Value> {
        &self.content
    }

    pub fn content_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.content
    }

    pub fn get_section(&self, section: &str) -> Option<&Value> {
        self.content.get(section)
    }

    pub fn get_field(&self, section: &str, field: &str) -> Option<&Value> {
        self.content.get(section)?.get(field)
    }

    /// Upsert fields into a singleton section, rejecting unknown fields
    /// and dropping nil/empty values.
    fn set_singleton(&mut self, section: &'static str, kv: Map<String, Value>) {
        let entry = self
            .content
            .entry(section.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        let Some(record) = entry.as_object_mut() else {
            return;
        };
        #[allow(clippy::expect_used)]
        let fields = section_fields(section).expect("singleton sections are declared");
        for (field, value) in kv {
            if !fields.contains(&field.as_str()) {
                tracing::debug!("unknown field {field} for section {section}");
                continue;
            }
            if value.is_null() || value.as_str().map(str::is_empty).unwrap_or(false) {
                continue;
            }
            record.insert(field, sanitize_value(value));
        }
    }

    pub fn set_hardware(&mut self, kv: Map<String, Value>) {
        self.set_singleton("HARDWARE", kv);
    }

    pub fn set_bios(&mut self, kv: Map<String, Value>) {
        self.set_singleton("BIOS", kv);
    }

    pub fn set_operating_system(&mut self, kv: Map<String, Value>) {
        self.set_singleton("OPERATINGSYSTEM", kv);
    }

    pub fn set_access_log(&mut self, kv: Map<String, Value>) {
        self.set_singleton("ACCESSLOG", kv);
    }

    pub fn hardware(&self, field: &str) -> Option<&Value> {
        self.get_field("HARDWARE", field)
    }

    pub fn bios(&self, field: &str) -> Option<&Value> {
        self.get_field("BIOS", field)
    }

    /// Append a record to a list section.
    ///
    /// Unknown fields are dropped, strings sanitized, and per-field
    /// checks applied (a non-matching value is dropped with a debug
    /// log). In `STORAGES`, a missing `SERIALNUMBER` is copied from
    /// `SERIAL`.
    pub fn add_entry(
        &mut self,
        section: &str,
        entry: Map<String, Value>,
    ) -> Result<(), InventoryError> {
        if entry.is_empty() {
            return Err(InventoryError::EmptyEntry);
        }
        let Some(fields) = section_fields(section) else {
            return Err(InventoryError::UnknownSection(section.to_string()));
        };

        let mut record = Map::new();
        for (field, value) in entry {
            if !fields.contains(&field.as_str()) {
                tracing::debug!("unknown field {field} for section {section}");
                continue;
            }
            if value.is_null() {
                continue;
            }
            let value = sanitize_value(value);
            if let Some(check) = field_check(section, &field, self.glpi_version) {
                let text = value_text(&value);
                if !sections::check_regex(check).is_match(&text) {
                    tracing::debug!(
                        "invalid value {text} for field {field} for section {section}"
                    );
                    continue;
                }
            }
            record.insert(field, value);
        }

        if section == "STORAGES" && !record.contains_key("SERIALNUMBER") {
            if let Some(serial) = record.get("SERIAL").cloned() {
                record.insert("SERIALNUMBER".into(), serial);
            }
        }

        match self.content.get_mut(section) {
            Some(Value::Array(list)) => list.push(Value::Object(record)),
            Some(_) => {
                // Singleton updated through add_entry keeps single shape
                self.content
                    .insert(section.to_string(), Value::Object(record));
            }
            None => {
                if is_singleton_section(section) {
                    self.content
                        .insert(section.to_string(), Value::Object(record));
                } else {
                    self.content
                        .insert(section.to_string(), Value::Array(vec![Value::Object(record)]));
                }
            }
        }
        Ok(())
    }

    /// Deep merge a document fragment.
    ///
    /// For JSON output the fragment is kept aside and merged after
    /// normalization, matching what servers expect from additional
    /// content. Other formats merge immediately through the validating
    /// setters: list sections concatenate, singletons update.
    pub fn merge_content(&mut self, content: Value) -> Result<(), InventoryError> {
        let Value::Object(content) = content else {
            return Err(InventoryError::NoContent);
        };
        if content.is_empty() {
            return Err(InventoryError::NoContent);
        }

        if self.format == Format::Json {
            self.json_merge = Some(content);
            return Ok(());
        }

        for (section, data) in content {
            match data {
                Value::Array(entries) => {
                    for entry in entries {
                        if let Value::Object(record) = entry {
                            self.add_entry(&section, record)?;
                        }
                    }
                }
                Value::Object(record) => match section.as_str() {
                    "HARDWARE" => self.set_hardware(record),
                    "OPERATINGSYSTEM" => self.set_operating_system(record),
                    "BIOS" => self.set_bios(record),
                    "ACCESSLOG" => self.set_access_log(record),
                    _ => self.add_entry(&section, record)?,
                },
                other => {
                    self.content.insert(section, other);
                }
            }
        }
        Ok(())
    }

    /// Produce the normalized document for the JSON protocol.
    ///
    /// Deep-copies the content, applies the per-section normalization
    /// rules for the given server version, merges deferred additional
    /// content, and hoists the tag to the envelope.
    pub fn normalized(&mut self, server_version: Option<&str>) -> NormalizedInventory {
        let mut content = self.content.clone();
        let tag = normalize::normalize(&mut content, server_version);

        if let Some(merge) = self.json_merge.take() {
            normalize::merge_additional(&mut content, merge);
        }

        NormalizedInventory {
            deviceid: self.deviceid.clone(),
            itemtype: self.itemtype.clone(),
            partial: self.partial,
            tag,
            content,
        }
    }
}

impl NormalizedInventory {
    /// The full protocol message for this document.
    ///
    /// Section and field keys are converted to lowercase, the shape
    /// servers validate against their JSON schema.
    pub fn message(&self) -> Value {
        let mut message = Map::new();
        message.insert("action".into(), Value::String("inventory".into()));
        message.insert("deviceid".into(), Value::String(self.deviceid.clone()));
        message.insert("itemtype".into(), Value::String(self.itemtype.clone()));
        if self.partial {
            message.insert("partial".into(), Value::Bool(true));
        }
        if let Some(tag) = &self.tag {
            message.insert("tag".into(), Value::String(tag.clone()));
        }
        message.insert(
            "content".into(),
            lowercase_keys(Value::Object(self.content.clone())),
        );
        Value::Object(message)
    }
}

/// Recursively lowercase all object keys.
fn lowercase_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k.to_lowercase(), lowercase_keys(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(lowercase_keys).collect()),
        other => other,
    }
}

/// Strip control characters from every string in a value.
fn sanitize_value(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(sanitize_string(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_value).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter().map(|(k, v)| (k, sanitize_value(v))).collect(),
        ),
        other => other,
    }
}

/// Remove control characters, keeping tab, newline and carriage return.
pub fn sanitize_string(text: &str) -> String {
    text.chars()
        .filter(|&c| !c.is_control() || c == '\t' || c == '\n' || c == '\r')
        .collect()
}

/// Textual form of a scalar for check matching.
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
#[path = "document_tests.rs"]
mod tests;

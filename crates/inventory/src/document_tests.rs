// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

fn record(value: serde_json::Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("not an object: {other}"),
    }
}

fn inventory() -> Inventory {
    Inventory::new(InventoryConfig {
        deviceid: "host1-2026-01-01-00-00-00".into(),
        ..Default::default()
    })
}

#[test]
fn test_new_document_defaults() {
    let inv = inventory();
    assert_eq!(inv.itemtype(), "Computer");
    assert_eq!(inv.format(), Format::Json);
    assert_eq!(
        inv.get_field("HARDWARE", "VMSYSTEM"),
        Some(&json!("Physical"))
    );
    assert!(inv
        .get_section("VERSIONCLIENT")
        .and_then(Value::as_str)
        .map(|s| s.starts_with("Quartermaster-Inventory_v"))
        .unwrap_or(false));
}

#[test]
fn test_tag_lands_in_accountinfo() {
    let inv = Inventory::new(InventoryConfig {
        deviceid: "d".into(),
        tag: Some("paris".into()),
        ..Default::default()
    });
    assert_eq!(
        inv.get_section("ACCOUNTINFO"),
        Some(&json!([{ "KEYNAME": "TAG", "KEYVALUE": "paris" }]))
    );
}

#[test]
fn test_set_hardware_rejects_unknown_and_empty() {
    let mut inv = inventory();
    inv.set_hardware(record(json!({
        "NAME": "host1",
        "BOGUS": "x",
        "MEMORY": 8192,
        "UUID": "",
        "SWAP": null,
    })));

    assert_eq!(inv.hardware("NAME"), Some(&json!("host1")));
    assert_eq!(inv.hardware("MEMORY"), Some(&json!(8192)));
    assert!(inv.hardware("BOGUS").is_none());
    assert!(inv.hardware("UUID").is_none());
    assert!(inv.hardware("SWAP").is_none());
}

#[test]
fn test_add_entry_unknown_section() {
    let mut inv = inventory();
    let err = inv.add_entry("BOGUS", record(json!({"X": 1}))).unwrap_err();
    assert!(matches!(err, InventoryError::UnknownSection(_)));
}

#[test]
fn test_add_entry_appends_to_list() {
    let mut inv = inventory();
    inv.add_entry("CPUS", record(json!({"NAME": "cpu0", "CORE": 4})))
        .unwrap();
    inv.add_entry("CPUS", record(json!({"NAME": "cpu1", "CORE": 4})))
        .unwrap();

    let cpus = inv.get_section("CPUS").and_then(Value::as_array).unwrap();
    assert_eq!(cpus.len(), 2);
    assert_eq!(cpus[0]["NAME"], json!("cpu0"));
}

#[test]
fn test_add_entry_drops_unknown_fields() {
    let mut inv = inventory();
    inv.add_entry("USERS", record(json!({"LOGIN": "alice", "SHOESIZE": 42})))
        .unwrap();

    let users = inv.get_section("USERS").and_then(Value::as_array).unwrap();
    assert_eq!(users[0], json!({"LOGIN": "alice"}));
}

#[test]
fn test_add_entry_sanitizes_control_chars() {
    let mut inv = inventory();
    inv.add_entry("USERS", record(json!({"LOGIN": "al\u{0007}ice"})))
        .unwrap();

    let users = inv.get_section("USERS").and_then(Value::as_array).unwrap();
    assert_eq!(users[0]["LOGIN"], json!("alice"));
}

#[test]
fn test_add_entry_applies_field_checks() {
    let mut inv = inventory();
    inv.add_entry(
        "NETWORKS",
        record(json!({"DESCRIPTION": "eth0", "TYPE": "ethernet"})),
    )
    .unwrap();
    inv.add_entry(
        "NETWORKS",
        record(json!({"DESCRIPTION": "weird0", "TYPE": "quantum"})),
    )
    .unwrap();

    let nets = inv.get_section("NETWORKS").and_then(Value::as_array).unwrap();
    assert_eq!(nets[0]["TYPE"], json!("ethernet"));
    // Value failed its check: dropped, entry kept
    assert!(nets[1].get("TYPE").is_none());
    assert_eq!(nets[1]["DESCRIPTION"], json!("weird0"));
}

#[test]
fn test_storages_serialnumber_backfill() {
    let mut inv = inventory();
    inv.add_entry("STORAGES", record(json!({"NAME": "sda", "SERIAL": "S123"})))
        .unwrap();

    let storages = inv.get_section("STORAGES").and_then(Value::as_array).unwrap();
    assert_eq!(storages[0]["SERIALNUMBER"], json!("S123"));
}

#[test]
fn test_merge_content_xml_format_is_immediate() {
    let mut inv = inventory();
    inv.set_format(Format::Xml);
    inv.merge_content(json!({
        "HARDWARE": {"NAME": "merged"},
        "CPUS": [{"NAME": "cpu0"}],
    }))
    .unwrap();

    assert_eq!(inv.hardware("NAME"), Some(&json!("merged")));
    assert!(inv.get_section("CPUS").is_some());
}

#[test]
fn test_merge_content_json_format_is_deferred() {
    let mut inv = inventory();
    inv.merge_content(json!({"CPUS": [{"NAME": "late-cpu"}]}))
        .unwrap();
    // Nothing visible until normalization
    assert!(inv.get_section("CPUS").is_none());

    let normalized = inv.normalized(None);
    let cpus = normalized.content.get("CPUS").and_then(Value::as_array).unwrap();
    assert_eq!(cpus[0]["NAME"], json!("late-cpu"));
}

#[test]
fn test_merge_content_rejects_empty() {
    let mut inv = inventory();
    assert!(matches!(
        inv.merge_content(json!({})),
        Err(InventoryError::NoContent)
    ));
    assert!(matches!(
        inv.merge_content(json!(42)),
        Err(InventoryError::NoContent)
    ));
}

#[test]
fn test_normalized_hoists_tag() {
    let mut inv = Inventory::new(InventoryConfig {
        deviceid: "d".into(),
        tag: Some("paris".into()),
        ..Default::default()
    });
    let normalized = inv.normalized(None);

    assert_eq!(normalized.tag.as_deref(), Some("paris"));
    assert!(!normalized.content.contains_key("ACCOUNTINFO"));
}

#[test]
fn test_message_envelope_lowercases_content() {
    let mut inv = inventory();
    inv.set_hardware(record(json!({"NAME": "h1"})));
    inv.set_partial(true);

    let message = inv.normalized(None).message();

    assert_eq!(message["action"], json!("inventory"));
    assert_eq!(message["deviceid"], json!("host1-2026-01-01-00-00-00"));
    assert_eq!(message["itemtype"], json!("Computer"));
    assert_eq!(message["partial"], json!(true));
    assert_eq!(message["content"]["hardware"]["name"], json!("h1"));
}

#[test]
fn test_message_envelope_omits_partial_when_full() {
    let mut inv = inventory();
    let message = inv.normalized(None).message();
    assert!(message.get("partial").is_none());
}

#[test]
fn test_sanitize_string_keeps_whitespace_controls() {
    assert_eq!(sanitize_string("a\u{0000}b\tc\n"), "ab\tc\n");
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Checksum, postpone, and submission flow across crates.

use qm_inventory::{Format, Inventory, InventoryConfig, LastState};
use serde_json::{json, Map, Value};
use tempfile::tempdir;

fn record(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("not an object: {other}"),
    }
}

fn document(statedir: &std::path::Path) -> Inventory {
    let mut inv = Inventory::new(InventoryConfig {
        deviceid: "host1-2026-01-01-00-00-00".into(),
        statedir: Some(statedir.to_path_buf()),
        ..Default::default()
    });
    inv.set_hardware(record(json!({"NAME": "host1"})));
    inv.add_entry("CPUS", record(json!({"NAME": "cpu0", "CORE": 4}))).unwrap();
    inv.add_entry("SOFTWARES", record(json!({"NAME": "pkg", "VERSION": "1.0"}))).unwrap();
    inv
}

#[test]
fn serialized_document_normalizes_to_the_same_content() {
    let dir = tempdir().unwrap();
    let mut inv = document(dir.path());

    let first = inv.normalized(None).message();
    let text = serde_json::to_string(&first).unwrap();
    let parsed: Value = serde_json::from_str(&text).unwrap();

    assert_eq!(first, parsed);
}

#[test]
fn checksum_twice_leaves_state_unchanged() {
    let dir = tempdir().unwrap();
    document(dir.path()).compute_checksum(3);
    let first = LastState::load(&dir.path().join("last_state.json")).unwrap();

    document(dir.path()).compute_checksum(3);
    let second = LastState::load(&dir.path().join("last_state.json")).unwrap();

    assert_eq!(first.sections, second.sections);
}

#[test]
fn postponed_submission_keeps_anchors_and_drops_the_rest() {
    let dir = tempdir().unwrap();
    document(dir.path()).compute_checksum(0);

    let mut inv = document(dir.path());
    let outcome = inv.compute_checksum(2);

    assert_eq!(outcome.postpone_count, 1);
    assert!(inv.is_partial());
    assert!(inv.get_section("HARDWARE").is_some());
    assert!(inv.get_section("CPUS").is_none());

    let message = inv.normalized(None).message();
    assert_eq!(message["partial"], json!(true));
    assert!(message["content"].get("cpus").is_none());
}

#[test]
fn postpone_budget_forces_a_full_inventory() {
    let dir = tempdir().unwrap();
    document(dir.path()).compute_checksum(0);
    // Two consecutive postponed submissions
    document(dir.path()).compute_checksum(2);
    document(dir.path()).compute_checksum(2);

    let mut inv = document(dir.path());
    let outcome = inv.compute_checksum(2);

    assert_eq!(outcome.postpone_count, 0);
    assert!(!inv.is_partial());
    assert!(inv.get_section("CPUS").is_some());
    assert!(inv.get_section("SOFTWARES").is_some());
}

#[test]
fn xml_output_round_trips_through_the_content_parser() {
    let dir = tempdir().unwrap();
    let mut inv = document(dir.path());
    inv.set_format(Format::Xml);

    let xml = {
        let path = inv.save(dir.path()).unwrap().unwrap();
        std::fs::read(path).unwrap()
    };
    let content = qm_inventory::parse_xml_content(&xml).unwrap();

    assert_eq!(content["HARDWARE"]["NAME"], json!("host1"));
    assert_eq!(content["CPUS"]["NAME"], json!("cpu0"));
}

#[test]
fn storage_roundtrip_survives_restart() {
    let dir = tempdir().unwrap();
    {
        let storage = qm_storage::Storage::new(dir.path()).unwrap();
        storage.save("target", &json!({"max_delay": 3600})).unwrap();
    }
    let storage = qm_storage::Storage::new(dir.path()).unwrap();
    let value: Value = storage.restore("target").unwrap();
    assert_eq!(value["max_delay"], json!(3600));
}

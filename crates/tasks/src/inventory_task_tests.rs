// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use qm_core::Event;
use serde_json::json;
use tempfile::tempdir;

fn task_for(target: TargetView, statedir: &std::path::Path) -> InventoryTask {
    InventoryTask::new(
        TaskConfig {
            backend_collect_timeout: 30,
            ..Default::default()
        },
        target,
        statedir.to_path_buf(),
        "host1-2026-01-01-00-00-00".into(),
        Uuid::new_v4(),
        ModuleRegistry::builtin(),
        None,
        None,
    )
}

fn local_target(dir: &std::path::Path, format: &str) -> TargetView {
    TargetView::Local {
        id: "local0".into(),
        path: dir.to_path_buf(),
        format: format.into(),
    }
}

#[tokio::test]
async fn test_local_json_run_writes_document() {
    let out = tempdir().unwrap();
    let state = tempdir().unwrap();
    let mut task = task_for(local_target(out.path(), "json"), state.path());

    assert!(task.is_enabled(None));
    task.run().await.unwrap();

    let path = out.path().join("host1-2026-01-01-00-00-00.json");
    assert!(path.is_file());
    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(written["action"], json!("inventory"));
    assert_eq!(written["deviceid"], json!("host1-2026-01-01-00-00-00"));
    // The provider probe always reports itself
    assert_eq!(
        written["content"]["versionprovider"]["name"],
        json!(qm_inventory::PROVIDER)
    );
    // Checksum state was recorded next to the target
    assert!(state.path().join("last_state.json").is_file());
}

#[tokio::test]
async fn test_local_xml_format() {
    let out = tempdir().unwrap();
    let state = tempdir().unwrap();
    let mut task = task_for(local_target(out.path(), "xml"), state.path());

    task.run().await.unwrap();

    let path = out.path().join("host1-2026-01-01-00-00-00.xml");
    let xml = std::fs::read_to_string(path).unwrap();
    assert!(xml.contains("<QUERY>INVENTORY</QUERY>"));
}

#[tokio::test]
async fn test_listener_target_produces_artifact() {
    let state = tempdir().unwrap();
    let mut task = task_for(TargetView::Listener { id: "listener".into() }, state.path());

    let output = task.run().await.unwrap();

    match output.artifact {
        Some(Artifact::ListenerInventory(xml)) => {
            assert!(String::from_utf8(xml).unwrap().contains("<QUERY>INVENTORY</QUERY>"));
        }
        other => panic!("expected listener artifact, got {other:?}"),
    }
}

#[tokio::test]
async fn test_partial_event_narrows_categories() {
    let out = tempdir().unwrap();
    let state = tempdir().unwrap();
    let mut task = task_for(local_target(out.path(), "json"), state.path());
    task.event = Some(Event::partial(vec!["environment".into()], 0));

    task.run().await.unwrap();

    let path = out.path().join("host1-2026-01-01-00-00-00.json");
    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(written["partial"], json!(true));
    assert!(written["content"].get("envs").is_some());
    // Provider category was not selected
    assert!(written["content"].get("versionprovider").is_none());
}

#[tokio::test]
async fn test_partial_event_with_unknown_category_skips_run() {
    let out = tempdir().unwrap();
    let state = tempdir().unwrap();
    let mut task = task_for(local_target(out.path(), "json"), state.path());
    task.event = Some(Event::partial(vec!["warpdrive".into()], 0));

    let output = task.run().await.unwrap();

    assert!(output.artifact.is_none());
    assert!(!out.path().join("host1-2026-01-01-00-00-00.json").exists());
}

#[tokio::test]
async fn test_partial_run_keeps_bios_hardware_cache() {
    let out = tempdir().unwrap();
    let state = tempdir().unwrap();
    let mut task = task_for(local_target(out.path(), "json"), state.path());
    task.event = Some(Event::partial(vec!["environment".into()], 0));

    let output = task.run().await.unwrap();

    let cache = output.keep_cache.unwrap();
    assert!(cache.get("HARDWARE").is_some());
}

#[test]
fn test_validate_params_plain_use() {
    let params = vec![
        json_record(json!({"category": "database", "use": "login"})),
        json_record(json!({"category": "", "use": "login"})),
        json_record(json!({"category": "database"})),
    ];
    let validated = validate_params(&params, &HashSet::new());
    assert_eq!(validated.len(), 1);
    assert_eq!(validated[0]["category"], json!("database"));
}

#[test]
fn test_validate_params_disabled_category() {
    let params = vec![json_record(json!({"category": "database", "use": "login"}))];
    let mut disabled = HashSet::new();
    disabled.insert("database".to_string());
    assert!(validate_params(&params, &disabled).is_empty());
}

#[test]
fn test_validate_params_expands_ids() {
    let params = vec![json_record(json!({
        "category": "database, environment",
        "params_id": "1,2",
        "use": "login",
        "use[2]": "token, key",
    }))];
    let validated = validate_params(&params, &HashSet::new());

    assert_eq!(validated.len(), 4);
    let entry = validated
        .iter()
        .find(|e| e["category"] == json!("environment") && e["params_id"] == json!("2"))
        .unwrap();
    assert_eq!(entry["use"], json!(["token", "key"]));
    let entry = validated
        .iter()
        .find(|e| e["category"] == json!("database") && e["params_id"] == json!("1"))
        .unwrap();
    assert_eq!(entry["use"], json!(["login"]));
}

#[test]
fn test_parse_credentials() {
    let credentials = parse_credentials(&[
        "type:esx,login:root,password:secret".to_string(),
        "garbage".to_string(),
        "type:database,params_id:9".to_string(),
    ]);

    assert_eq!(credentials.len(), 2);
    assert_eq!(credentials[0]["type"], json!("esx"));
    assert_eq!(credentials[0]["login"], json!("root"));
    // Index-derived params_id for the first definition
    assert_eq!(credentials[0]["params_id"], json!("0"));
    // Explicit params_id wins
    assert_eq!(credentials[1]["params_id"], json!("9"));
}

fn json_record(value: serde_json::Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("not an object: {other}"),
    }
}

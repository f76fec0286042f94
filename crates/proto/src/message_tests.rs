// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;
use yare::parameterized;

#[test]
fn test_answer_parses_contact_shape() {
    let answer: Answer = serde_json::from_value(json!({
        "status": "ok",
        "expiration": 24,
        "tasks": {
            "inventory": { "version": "1.0", "server": "glpi" },
            "deploy": { "version": "1.2" },
        },
        "message": "contact done",
    }))
    .unwrap();

    assert_eq!(answer.status, AnswerStatus::Ok);
    assert_eq!(answer.tasks["inventory"].server.as_deref(), Some("glpi"));
    assert_eq!(answer.tasks["deploy"].server, None);
    assert_eq!(answer.expiration_hours_secs(), 24 * 3_600);
}

#[test]
fn test_answer_rejects_unknown_status() {
    let result: Result<Answer, _> =
        serde_json::from_value(json!({ "status": "maybe" }));
    assert!(result.is_err());
}

#[parameterized(
    bare_number_is_seconds = { json!(30), 30 },
    suffixed_seconds = { json!("45s"), 45 },
    suffixed_hours = { json!("2h"), 7_200 },
    suffixed_days = { json!("1d"), 86_400 },
    bare_string = { json!("15"), 15 },
    garbage = { json!("soon"), 0 },
)]
fn pending_expiration(value: serde_json::Value, expected: u64) {
    let answer: Answer =
        serde_json::from_value(json!({ "status": "pending", "expiration": value })).unwrap();
    assert_eq!(answer.expiration_secs(), expected);
}

#[test]
fn test_contact_request_shape() {
    let request = ContactRequest::new("Quartermaster", "0.2.0", "host-2026-01-01-00-00-00")
        .with_task("inventory", "0.2.0")
        .with_httpd_port(Some(62_354))
        .with_tag(Some("paris".into()));
    let value = request.to_value();

    assert_eq!(value["action"], json!("contact"));
    assert_eq!(value["deviceid"], json!("host-2026-01-01-00-00-00"));
    assert_eq!(value["httpd-port"], json!(62_354));
    assert_eq!(value["enabled-tasks"]["inventory"]["version"], json!("0.2.0"));
    assert_eq!(value["tag"], json!("paris"));
}

#[test]
fn test_contact_request_omits_empty_options() {
    let value = ContactRequest::new("Quartermaster", "0.2.0", "d").to_value();
    assert!(value.get("httpd-port").is_none());
    assert!(value.get("tag").is_none());
}

#[test]
fn test_deploy_message_shapes() {
    let value = DeployMessage::GetJobs { deviceid: "d".into() }.to_value();
    assert_eq!(value, json!({ "action": "getJobs", "deviceid": "d" }));

    let value = DeployMessage::SetStatus {
        deviceid: "d".into(),
        uuid: "j1".into(),
        status: "ok".into(),
        message: Some("done".into()),
    }
    .to_value();
    assert_eq!(value["action"], json!("setStatus"));
    assert_eq!(value["message"], json!("done"));

    let value = DeployMessage::JobsDone { deviceid: "d".into(), uuid: "j1".into() }.to_value();
    assert_eq!(value["action"], json!("jobsDone"));
}

#[test]
fn test_answer_keeps_extra_fields() {
    let answer: Answer = serde_json::from_value(json!({
        "status": "ok",
        "disabled": ["netdiscovery"],
    }))
    .unwrap();
    assert_eq!(answer.extra["disabled"], json!(["netdiscovery"]));
}

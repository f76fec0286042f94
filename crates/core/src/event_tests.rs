// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn test_serialize_taskrun_skips_default_flags() {
    let event = Event::taskrun("inventory", false, false, false, 42);
    let json = serde_json::to_value(&event).unwrap();

    assert_eq!(json["type"], "taskrun");
    assert_eq!(json["task"], "inventory");
    assert_eq!(json["rundate"], 42);
    assert!(json.get("full").is_none());
    assert!(json.get("reschedule").is_none());
}

#[test]
fn test_roundtrip_partial() {
    let event = Event::partial(vec!["cpu".into(), "memory".into()], 100);
    let json = serde_json::to_string(&event).unwrap();
    let back: Event = serde_json::from_str(&json).unwrap();

    assert_eq!(back, event);
    assert!(back.is_partial());
    assert_eq!(back.task(), "inventory");
}

#[test]
fn test_task_accessor() {
    assert_eq!(Event::init("deploy", 0).task(), "deploy");
    assert_eq!(Event::maintenance("deploy", "server0", 0).task(), "deploy");
    assert_eq!(Event::job("collect", 0).task(), "collect");
    assert_eq!(Event::partial(vec!["cpu".into()], 0).task(), "inventory");
}

#[test]
fn test_event_names_are_stable() {
    // Cooldown matches on name, so names must be deterministic
    let a = Event::partial(vec!["cpu".into()], 1);
    let b = Event::partial(vec!["cpu".into()], 500);
    assert_eq!(a.name, b.name);

    let m = Event::maintenance("deploy", "server0", 0);
    assert_eq!(m.name, "deploy maintenance");
}

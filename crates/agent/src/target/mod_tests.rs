// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use qm_core::Event;
use tempfile::tempdir;

const NOW: u64 = 1_700_000_000;

fn server_target(dir: &std::path::Path, max_delay: u64) -> Target {
    Target::new(
        "server0".to_string(),
        TargetKind::Server(ServerTarget::new("https://srv/".to_string())),
        Storage::new(dir).unwrap(),
        max_delay,
        None,
        NOW,
    )
}

#[test]
fn test_schedule_invariants_after_new() {
    let dir = tempdir().unwrap();
    let target = server_target(dir.path(), 3_600);

    let next = target.next_run_date();
    let base = target.base_run_date();
    assert!(next <= base);
    assert!(base <= next + target.max_delay());
}

#[test]
fn test_schedule_invariants_after_reset() {
    let dir = tempdir().unwrap();
    let target = server_target(dir.path(), 3_600);

    target.reset_next_run_date(NOW);

    let next = target.next_run_date();
    let base = target.base_run_date();
    assert!(next <= base);
    assert!(base <= next + target.max_delay());
    assert!(next > NOW);
}

#[test]
fn test_schedule_survives_restart() {
    let dir = tempdir().unwrap();
    let first = server_target(dir.path(), 3_600);
    let planned = first.next_run_date();
    drop(first);

    let second = server_target(dir.path(), 3_600);
    assert_eq!(second.next_run_date(), planned);
}

#[test]
fn test_initial_delay_reduced_up_to_half() {
    let dir = tempdir().unwrap();
    let target = Target::new(
        "server0".to_string(),
        TargetKind::Server(ServerTarget::new("https://srv/".to_string())),
        Storage::new(dir.path()).unwrap(),
        3_600,
        Some(600),
        NOW,
    );

    let next = target.next_run_date();
    assert!(next > NOW + 300 - 1);
    assert!(next <= NOW + 600);
}

#[test]
fn test_backoff_doubles_and_caps() {
    let dir = tempdir().unwrap();
    let target = server_target(dir.path(), 3_600);

    target.set_next_run_date_from_now(60, NOW);
    assert_eq!(target.next_run_date(), NOW + 60);

    target.set_next_run_date_from_now(60, NOW);
    assert_eq!(target.next_run_date(), NOW + 120);

    target.set_next_run_date_from_now(60, NOW);
    assert_eq!(target.next_run_date(), NOW + 240);

    // A successful reset clears the retry delay
    target.reset_next_run_date(NOW);
    target.set_next_run_date_from_now(60, NOW);
    assert_eq!(target.next_run_date(), NOW + 60);
}

#[test]
fn test_run_now() {
    let dir = tempdir().unwrap();
    let target = server_target(dir.path(), 3_600);
    target.run_now(NOW);
    assert_eq!(target.next_run_date(), NOW);
}

#[test]
fn test_expiration_skips_one_reset() {
    let dir = tempdir().unwrap();
    let target = server_target(dir.path(), 3_600);

    target.set_next_run_on_expiration(500, NOW);
    assert_eq!(target.next_run_date(), NOW + 500);

    // The reset right after an expiration is a no-op
    target.reset_next_run_date(NOW);
    assert_eq!(target.next_run_date(), NOW + 500);

    // Further resets schedule normally
    target.reset_next_run_date(NOW + 500);
    assert_ne!(target.next_run_date(), NOW + 500);
}

#[test]
fn test_pause_freezes_without_losing_state() {
    let dir = tempdir().unwrap();
    let target = server_target(dir.path(), 3_600);
    let next = target.next_run_date();

    target.pause();
    assert!(target.paused());
    assert_eq!(target.next_run_date(), next);

    target.resume();
    assert!(!target.paused());
}

#[test]
fn test_is_type() {
    let dir = tempdir().unwrap();
    let target = server_target(dir.path(), 3_600);
    assert!(target.is_type("server"));
    assert!(!target.is_type("local"));
    assert!(!target.is_type("listener"));
}

#[test]
fn test_local_planned_tasks_filtered() {
    let dir = tempdir().unwrap();
    let target = Target::new(
        "local0".to_string(),
        TargetKind::Local { path: "/out".into(), format: "json".into() },
        Storage::new(dir.path()).unwrap(),
        3_600,
        None,
        NOW,
    );

    target.set_planned_tasks(vec!["inventory".to_string(), "maintenance".to_string()]);

    assert_eq!(target.planned_tasks(), vec!["inventory".to_string()]);
}

#[test]
fn test_event_queue_roundtrip() {
    let dir = tempdir().unwrap();
    let target = server_target(dir.path(), 3_600);

    assert!(target.add_event(Event::job("collect", NOW + 5), NOW, true));
    assert!(target.next_event(NOW).is_none());
    assert!(target.next_event(NOW + 5).is_some());
}

#[test]
fn test_trigger_task_init_events() {
    let dir = tempdir().unwrap();
    let target = server_target(dir.path(), 3_600);
    target.set_planned_tasks(vec!["inventory".to_string(), "maintenance".to_string()]);

    target.trigger_task_init_events(NOW);

    assert_eq!(target.events_len(), 2);
    let event = target.next_event(NOW).unwrap();
    assert!(matches!(event.kind, qm_core::EventKind::Init { .. }));
}

#[test]
fn test_trigger_run_tasks_now_all_reschedules_last() {
    let dir = tempdir().unwrap();
    let target = server_target(dir.path(), 3_600);
    target.set_planned_tasks(vec!["inventory".to_string(), "maintenance".to_string()]);

    let trigger = Event::taskrun("all", true, false, true, NOW);
    target.trigger_run_tasks_now(&trigger, NOW);

    let first = target.next_event(NOW).unwrap();
    let second = target.next_event(NOW).unwrap();
    match (&first.kind, &second.kind) {
        (
            qm_core::EventKind::TaskRun { task: t1, reschedule: r1, .. },
            qm_core::EventKind::TaskRun { task: t2, reschedule: r2, full, .. },
        ) => {
            assert_eq!(t1, "inventory");
            assert!(!r1);
            assert_eq!(t2, "maintenance");
            assert!(r2);
            assert!(full);
        }
        other => panic!("unexpected events: {other:?}"),
    }
}

#[test]
fn test_storage_subdir_mapping() {
    let expected = if cfg!(windows) {
        "https..__srv_glpi_"
    } else {
        "https:__srv_glpi_"
    };
    assert_eq!(storage_subdir("https://srv/glpi/"), expected);
    assert_eq!(storage_subdir("/out/dir"), "_out_dir");
}

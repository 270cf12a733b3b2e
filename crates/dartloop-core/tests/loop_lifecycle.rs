//! End-to-end loop scenarios against the file and memory stores.

use chrono::Utc;
use dartloop_core::classify::{classify_report, ClassifyOptions};
use dartloop_core::gate;
use dartloop_core::{
    FailureMode, FileStateStore, Limits, LoopAction, LoopState, MemoryStateStore, ResultStatus,
    StateStore,
};
use tempfile::TempDir;

fn queue_a() -> Option<String> {
    Some("queue-A".to_string())
}

#[test]
fn single_failure_in_stop_mode_halts_the_loop() {
    let dir = TempDir::new().unwrap();
    let store = FileStateStore::new(dir.path().join(".dartloop/loop-state.json"));
    let limits = Limits::default();

    let mut state = store.load();
    state.start("queue-A", FailureMode::Stop, Utc::now()).unwrap();
    store.save(&state).unwrap();

    let mut state = store.load();
    state.set_current_task("T1", "Fix bug", Utc::now()).unwrap();
    store.save(&state).unwrap();

    let mut state = store.load();
    state.complete_task("T1", false, Some("build broke"), &limits, Utc::now());
    store.save(&state).unwrap();

    let state = store.load();
    assert!(!state.running);
    assert_eq!(state.tasks_failed, 1);
    assert!(state.current_task.is_none());
    assert_eq!(state.history.len(), 1);
    assert_eq!(state.history[0].stop_reason, "task_failure:T1");

    let outcome = gate::check(&store, &queue_a);
    assert!(!outcome.continue_loop);
    assert_eq!(outcome.reason, gate::NO_ACTIVE_LOOP);
}

#[test]
fn successes_keep_the_gate_open() {
    let store = MemoryStateStore::new();
    let limits = Limits::default();

    let mut state = store.load();
    state.start("queue-A", FailureMode::Stop, Utc::now()).unwrap();
    for id in ["T1", "T2", "T3"] {
        state.set_current_task(id, "", Utc::now()).unwrap();
        state.complete_task(id, true, None, &limits, Utc::now());
    }
    store.save(&state).unwrap();

    let state = store.load();
    assert!(state.running);
    assert_eq!(state.tasks_completed, 3);

    let outcome = gate::check(&store, &queue_a);
    assert!(outcome.continue_loop);
    assert_eq!(outcome.action, Some(LoopAction::Continue));
    assert_eq!(outcome.reason, "last task completed successfully");
}

#[test]
fn continue_mode_failure_leads_to_replan() {
    let store = MemoryStateStore::new();
    let limits = Limits::default();

    let mut state = store.load();
    state
        .start("queue-A", FailureMode::ContinueOnFailure, Utc::now())
        .unwrap();
    let (result, _) = classify_report(
        Some(r#"{"status": "failed", "failed_phase": "tests"}"#),
        ClassifyOptions::default(),
    );
    state.record_iteration(result, Some("agent-1"), &limits, Utc::now());
    store.save(&state).unwrap();

    let state = store.load();
    assert!(state.running);
    assert_eq!(state.iterations, 1);
    assert_eq!(state.last_agent.as_deref(), Some("agent-1"));

    let outcome = gate::check(&store, &queue_a);
    assert_eq!(outcome.action, Some(LoopAction::Replan));
    assert_eq!(outcome.reason, "task failed at tests");
}

#[test]
fn save_of_load_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("loop-state.json");
    std::fs::write(
        &path,
        r#"{"running": true, "dartboard": "queue-A", "iterations": 2, "custom_note": "keep"}"#,
    )
    .unwrap();
    let store = FileStateStore::new(&path);

    let first = store.load();
    store.save(&first).unwrap();
    let after_first = std::fs::read_to_string(&path).unwrap();

    store.save(&store.load()).unwrap();
    let after_second = std::fs::read_to_string(&path).unwrap();

    assert_eq!(after_first, after_second);
    assert_eq!(store.load(), first);
    assert!(after_second.contains("custom_note"));
}

#[test]
fn corrupt_record_loads_as_idle() {
    let store = MemoryStateStore::with_raw("{ not json");
    let state = store.load();
    assert_eq!(state, LoopState::default());

    let outcome = gate::check(&store, &queue_a);
    assert_eq!(outcome.reason, gate::NO_ACTIVE_LOOP);
}

#[test]
fn results_are_capped() {
    let mut state = LoopState::default();
    let limits = Limits::default();
    for i in 0..(limits.results_cap + 5) {
        state.complete_task(&format!("T{i}"), true, None, &limits, Utc::now());
    }
    assert_eq!(state.tasks.len(), limits.results_cap);
    assert_eq!(state.tasks[0].task_id.as_deref(), Some("T5"));
    assert_eq!(state.last_result().unwrap().status, ResultStatus::Completed);
}

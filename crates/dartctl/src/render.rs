//! Output rendering for dartctl.
//!
//! Every command prints exactly one JSON record to stdout. Diagnostics go to
//! stderr through tracing.

use chrono::{DateTime, Utc};
use dartloop_core::classify::ClassifySource;
use dartloop_core::lifecycle::TaskCompletion;
use dartloop_core::session::SessionCleanup;
use dartloop_core::tracker::IterationSummary;
use dartloop_core::{CurrentTask, FailureMode, LoopState, LoopSummary};
use serde_json::{json, Value};

/// Print a record as pretty JSON.
pub fn print_record(record: &Value) {
    let text = serde_json::to_string_pretty(record).unwrap_or_else(|_| record.to_string());
    println!("{text}");
}

/// Print the failure record for an error and its causes.
pub fn print_error(err: &eyre::Report) {
    let message = err
        .chain()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(": ");
    print_record(&error_record(&message));
}

pub fn error_record(message: &str) -> Value {
    json!({ "success": false, "error": message })
}

pub fn loop_started(dartboard: &str, failure_mode: FailureMode, started_at: DateTime<Utc>) -> Value {
    json!({
        "success": true,
        "message": format!("Loop started for dartboard: {dartboard}"),
        "dartboard": dartboard,
        "failure_mode": failure_mode,
        "started_at": started_at,
    })
}

pub fn loop_stopped(summary: &LoopSummary) -> Value {
    json!({
        "success": true,
        "message": "Loop stopped",
        "summary": summary,
    })
}

pub fn history(state: &LoopState) -> Value {
    json!({
        "history": state.history,
        "total_loops": state.history.len(),
    })
}

pub fn task_set(task: Option<&CurrentTask>) -> Value {
    json!({
        "success": true,
        "current_task": task,
    })
}

pub fn task_completed(completion: &TaskCompletion, state: &LoopState) -> Value {
    let mut record = json!({
        "success": true,
        "task_id": completion.task_id,
        "task_success": completion.task_success,
        "loop_running": completion.loop_running,
        "tasks_completed": state.tasks_completed,
        "tasks_failed": state.tasks_failed,
    });
    if let Some(reason) = &completion.halted {
        record["stop_reason"] = json!(reason);
        record["message"] = json!("Loop stopped due to task failure");
    }
    record
}

pub fn iteration_recorded(summary: &IterationSummary, source: ClassifySource) -> Value {
    json!({
        "success": true,
        "iteration": summary.iteration,
        "result_status": summary.result_status,
        "classified_by": source_name(source),
        "message": summary.message,
    })
}

fn source_name(source: ClassifySource) -> &'static str {
    match source {
        ClassifySource::Structured => "structured",
        ClassifySource::Heuristic => "heuristic",
        ClassifySource::Empty => "empty",
    }
}

pub fn counter(name: &str, value: u64) -> Value {
    let mut record = json!({ "success": true });
    record[name] = json!(value);
    record
}

/// `{key: dartboard}`, with `null` when unset.
pub fn dartboard(key: &str, value: Option<String>) -> Value {
    let mut record = json!({});
    record[key] = json!(value);
    record
}

pub fn dartboard_saved(key: &str, value: &str) -> Value {
    let mut record = json!({ "success": true });
    record[key] = json!(value);
    record
}

pub fn dartboard_tracked(value: Option<&str>, session_updated: bool) -> Value {
    json!({
        "success": true,
        "tracked": value.is_some(),
        "dartboard": value,
        "session_updated": session_updated,
    })
}

pub fn session_cleaned(cleanup: &SessionCleanup) -> Value {
    json!({
        "success": true,
        "session_ended": cleanup.session_ended,
        "archived": cleanup.archived,
        "archived_sessions": cleanup.archived_sessions,
    })
}

pub fn change_tracked(retained: usize) -> Value {
    json!({ "success": true, "tracked_changes": retained })
}

pub fn task_update_logged(timestamp: DateTime<Utc>, retained: usize) -> Value {
    json!({
        "success": true,
        "logged": true,
        "timestamp": timestamp,
        "task_updates": retained,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_record_shape() {
        assert_eq!(
            error_record("loop not running"),
            json!({"success": false, "error": "loop not running"})
        );
    }

    #[test]
    fn print_error_joins_causes() {
        let err = eyre::eyre!("inner").wrap_err("outer");
        let message = err
            .chain()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(": ");
        assert_eq!(message, "outer: inner");
    }

    #[test]
    fn dartboard_record_is_keyed() {
        assert_eq!(
            dartboard("last_dartboard", Some("Eng/Sprint".to_string())),
            json!({"last_dartboard": "Eng/Sprint"})
        );
        assert_eq!(dartboard("default_dartboard", None), json!({"default_dartboard": null}));
    }

    #[test]
    fn counter_uses_given_key() {
        assert_eq!(counter("spawns", 3), json!({"success": true, "spawns": 3}));
    }

    #[test]
    fn completion_reports_halt() {
        let completion = TaskCompletion {
            task_id: "T1".to_string(),
            task_success: false,
            loop_running: false,
            halted: Some("task_failure:T1".to_string()),
        };
        let state = LoopState {
            tasks_failed: 1,
            ..LoopState::default()
        };
        let record = task_completed(&completion, &state);
        assert_eq!(record["stop_reason"], json!("task_failure:T1"));
        assert_eq!(record["tasks_failed"], json!(1));
    }
}

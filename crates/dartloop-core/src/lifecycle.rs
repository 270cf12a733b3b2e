//! Loop lifecycle transitions on `LoopState`.
//!
//! States are Idle, Running and Halted. Idle and Halted both persist as
//! `running=false`; they differ only in counters and history.
//!
//! ```text
//! Idle/Halted --start--> Running
//! Running --complete(ok)--> Running
//! Running --complete(fail, stop)--> Halted
//! Running --complete(fail, continue-on-failure)--> Running
//! Running --stop--> Halted
//! ```

use crate::bounded::{push_capped, Limits};
use crate::classify::{extract_phase, mentions_fix_task, UNKNOWN_PHASE};
use crate::decision::failure_halts_loop;
use crate::types::{CurrentTask, FailureMode, IterationResult, LoopState, LoopSummary, ResultStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

/// Stop reason used when the caller gives none.
pub const DEFAULT_STOP_REASON: &str = "user_request";

/// Prefix of the stop reason recorded when a failure halts the loop.
pub const TASK_FAILURE_PREFIX: &str = "task_failure:";

#[derive(Debug, Error)]
pub enum LoopError {
    #[error("loop already running for dartboard {}", dartboard.as_deref().unwrap_or("<none>"))]
    AlreadyRunning { dartboard: Option<String> },
    #[error("loop not running")]
    NotRunning,
    #[error(transparent)]
    Store(#[from] crate::store::StoreError),
}

/// Result of `complete_task`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskCompletion {
    pub task_id: String,
    pub task_success: bool,
    pub loop_running: bool,
    /// Stop reason when this completion halted the loop.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub halted: Option<String>,
}

/// Point-in-time view of the loop for `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub running: bool,
    pub dartboard: Option<String>,
    pub current_task: Option<CurrentTask>,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub failure_mode: FailureMode,
    pub iterations: u64,
    pub spawns: u64,
    pub verifications: u64,
    pub doc_updates: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub last_activity: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_human: Option<String>,
}

impl LoopState {
    /// Begin a new loop, resetting per-loop counters. History is kept.
    pub fn start(
        &mut self,
        dartboard: &str,
        failure_mode: FailureMode,
        now: DateTime<Utc>,
    ) -> Result<(), LoopError> {
        if self.running {
            return Err(LoopError::AlreadyRunning {
                dartboard: self.dartboard.clone(),
            });
        }

        self.running = true;
        self.dartboard = Some(dartboard.to_string());
        self.current_task = None;
        self.failure_mode = failure_mode;
        self.tasks_completed = 0;
        self.tasks_failed = 0;
        self.iterations = 0;
        self.spawns = 0;
        self.verifications = 0;
        self.doc_updates = 0;
        self.tasks.clear();
        self.started_at = Some(now);
        self.last_activity = Some(now);
        self.last_iteration_at = None;
        self.last_spawn_at = None;
        self.last_verification_at = None;
        self.last_doc_update_at = None;
        self.last_agent = None;

        info!(dartboard, failure_mode = failure_mode.as_str(), "loop started");
        Ok(())
    }

    /// Explicitly stop a running loop, archiving its summary.
    pub fn stop(
        &mut self,
        reason: &str,
        limits: &Limits,
        now: DateTime<Utc>,
    ) -> Result<LoopSummary, LoopError> {
        if !self.running {
            return Err(LoopError::NotRunning);
        }
        let summary = self.halt(reason, limits, now);
        info!(reason, "loop stopped");
        Ok(summary)
    }

    /// Mark the task now being worked on.
    pub fn set_current_task(
        &mut self,
        task_id: &str,
        title: &str,
        now: DateTime<Utc>,
    ) -> Result<(), LoopError> {
        if !self.running {
            return Err(LoopError::NotRunning);
        }
        self.current_task = Some(CurrentTask {
            id: task_id.to_string(),
            title: title.to_string(),
            started_at: now,
        });
        self.last_activity = Some(now);
        Ok(())
    }

    /// Record a task outcome and apply the failure policy.
    ///
    /// Allowed while idle: counters and results are still updated, but a
    /// failure only halts (and archives) a loop that was running.
    pub fn complete_task(
        &mut self,
        task_id: &str,
        success: bool,
        details: Option<&str>,
        limits: &Limits,
        now: DateTime<Utc>,
    ) -> TaskCompletion {
        let mut result = IterationResult::with_status(if success {
            ResultStatus::Completed
        } else {
            ResultStatus::Failed
        })
        .with_task_id(task_id);
        result.recorded_at = Some(now);

        if !success {
            let details = details.unwrap_or_default();
            result.failed_phase =
                Some(extract_phase(details).unwrap_or_else(|| UNKNOWN_PHASE.to_string()));
            result.fix_task_created = mentions_fix_task(details);
        }
        push_capped(&mut self.tasks, result, limits.results_cap);

        let mut halted = None;
        if success {
            self.tasks_completed += 1;
        } else {
            self.tasks_failed += 1;
            if self.running && failure_halts_loop(self.failure_mode) {
                let reason = format!("{TASK_FAILURE_PREFIX}{task_id}");
                self.halt(&reason, limits, now);
                info!(task_id, "task failure halted loop");
                halted = Some(reason);
            }
        }

        self.current_task = None;
        self.last_activity = Some(now);

        TaskCompletion {
            task_id: task_id.to_string(),
            task_success: success,
            loop_running: self.running,
            halted,
        }
    }

    /// Status view with running duration while active.
    pub fn snapshot(&self, now: DateTime<Utc>) -> StatusSnapshot {
        let duration = self
            .started_at
            .filter(|_| self.running)
            .map(|started| now.signed_duration_since(started).num_seconds().max(0));

        StatusSnapshot {
            running: self.running,
            dartboard: self.dartboard.clone(),
            current_task: self.current_task.clone(),
            tasks_completed: self.tasks_completed,
            tasks_failed: self.tasks_failed,
            failure_mode: self.failure_mode,
            iterations: self.iterations,
            spawns: self.spawns,
            verifications: self.verifications,
            doc_updates: self.doc_updates,
            started_at: self.started_at,
            last_activity: self.last_activity,
            duration_seconds: duration,
            duration_human: duration.map(format_duration),
        }
    }

    fn halt(&mut self, reason: &str, limits: &Limits, now: DateTime<Utc>) -> LoopSummary {
        let summary = LoopSummary {
            dartboard: self.dartboard.clone(),
            started_at: self.started_at,
            stopped_at: now,
            tasks_completed: self.tasks_completed,
            tasks_failed: self.tasks_failed,
            stop_reason: reason.to_string(),
        };
        push_capped(&mut self.history, summary.clone(), limits.history_cap);

        self.running = false;
        self.current_task = None;
        self.last_activity = Some(now);
        summary
    }
}

/// `H:MM:SS`, hours unbounded.
fn format_duration(total_seconds: i64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{hours}:{minutes:02}:{seconds:02}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounded::HISTORY_CAP;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 9, 0, 0).unwrap()
    }

    fn running(mode: FailureMode) -> LoopState {
        let mut state = LoopState::default();
        state.start("queue-A", mode, t0()).unwrap();
        state
    }

    #[test]
    fn start_twice_is_rejected_and_state_unchanged() {
        let mut state = running(FailureMode::Stop);
        let before = state.clone();
        let err = state.start("queue-B", FailureMode::Stop, t0()).unwrap_err();
        assert!(matches!(err, LoopError::AlreadyRunning { dartboard: Some(ref d) } if d == "queue-A"));
        assert_eq!(state, before);
    }

    #[test]
    fn stop_and_set_task_require_running() {
        let mut state = LoopState::default();
        assert!(matches!(
            state.stop("x", &Limits::default(), t0()),
            Err(LoopError::NotRunning)
        ));
        assert!(matches!(
            state.set_current_task("T1", "title", t0()),
            Err(LoopError::NotRunning)
        ));
        assert_eq!(state, LoopState::default());
    }

    #[test]
    fn successes_accumulate_while_running() {
        let mut state = running(FailureMode::Stop);
        for i in 0..7 {
            let done = state.complete_task(&format!("T{i}"), true, None, &Limits::default(), t0());
            assert!(done.loop_running);
        }
        assert_eq!(state.tasks_completed, 7);
        assert_eq!(state.tasks_failed, 0);
        assert!(state.running);
        assert_eq!(state.last_result().unwrap().status, ResultStatus::Completed);
    }

    #[test]
    fn failure_in_stop_mode_halts_once() {
        let mut state = running(FailureMode::Stop);
        state.set_current_task("T1", "Fix bug", t0()).unwrap();
        let done = state.complete_task("T1", false, Some("build broke"), &Limits::default(), t0());

        assert!(!done.loop_running);
        assert_eq!(done.halted.as_deref(), Some("task_failure:T1"));
        assert!(!state.running);
        assert!(state.current_task.is_none());
        assert_eq!(state.tasks_failed, 1);
        assert_eq!(state.history.len(), 1);
        assert!(state.history[0].stop_reason.starts_with(TASK_FAILURE_PREFIX));
    }

    #[test]
    fn failure_in_continue_mode_keeps_running() {
        let mut state = running(FailureMode::ContinueOnFailure);
        let done = state.complete_task(
            "T2",
            false,
            Some("test phase failed, created subtask"),
            &Limits::default(),
            t0(),
        );
        assert!(done.loop_running);
        assert!(done.halted.is_none());
        assert_eq!(state.tasks_failed, 1);
        assert!(state.history.is_empty());

        let last = state.last_result().unwrap();
        assert_eq!(last.failed_phase.as_deref(), Some("test"));
        assert!(last.fix_task_created);
    }

    #[test]
    fn failure_while_idle_does_not_archive() {
        let mut state = LoopState::default();
        let done = state.complete_task("T3", false, None, &Limits::default(), t0());
        assert!(!done.loop_running);
        assert!(done.halted.is_none());
        assert_eq!(state.tasks_failed, 1);
        assert!(state.history.is_empty());
    }

    #[test]
    fn restart_resets_counters_but_keeps_history() {
        let mut state = running(FailureMode::Stop);
        state.complete_task("T1", true, None, &Limits::default(), t0());
        state.stop(DEFAULT_STOP_REASON, &Limits::default(), t0()).unwrap();

        state.start("queue-B", FailureMode::ContinueOnFailure, t0()).unwrap();
        assert_eq!(state.tasks_completed, 0);
        assert!(state.tasks.is_empty());
        assert_eq!(state.history.len(), 1);
        assert_eq!(state.history[0].tasks_completed, 1);
        assert_eq!(state.failure_mode, FailureMode::ContinueOnFailure);
    }

    #[test]
    fn history_is_capped() {
        let mut state = LoopState::default();
        for i in 0..25 {
            state.start(&format!("queue-{i}"), FailureMode::Stop, t0()).unwrap();
            state.stop("cycle", &Limits::default(), t0()).unwrap();
        }
        assert_eq!(state.history.len(), HISTORY_CAP);
        assert_eq!(state.history[0].dartboard.as_deref(), Some("queue-15"));
    }

    #[test]
    fn snapshot_reports_duration_only_while_running() {
        let state = running(FailureMode::Stop);
        let snap = state.snapshot(t0() + Duration::seconds(3725));
        assert_eq!(snap.duration_seconds, Some(3725));
        assert_eq!(snap.duration_human.as_deref(), Some("1:02:05"));

        let idle = LoopState::default().snapshot(t0());
        assert!(idle.duration_seconds.is_none());
    }
}

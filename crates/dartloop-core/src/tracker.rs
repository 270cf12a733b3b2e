//! Iteration tracking.
//!
//! Each tracker bumps one counter on `LoopState` and stamps its timestamp.
//! None of them check `running`; recording an iteration on an idle loop is
//! allowed and the gate decides what that means.

use crate::bounded::{push_capped, Limits};
use crate::classify::UNKNOWN_PHASE;
use crate::types::{IterationResult, LoopState, ResultStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

/// Outcome of `record_iteration`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IterationSummary {
    pub iteration: u64,
    pub result_status: ResultStatus,
    pub message: String,
}

impl LoopState {
    /// Record one finished iteration and its classified result.
    pub fn record_iteration(
        &mut self,
        mut result: IterationResult,
        agent: Option<&str>,
        limits: &Limits,
        now: DateTime<Utc>,
    ) -> IterationSummary {
        self.iterations += 1;
        self.last_iteration_at = Some(now);
        self.last_activity = Some(now);
        if let Some(agent) = agent.filter(|a| !a.is_empty()) {
            self.last_agent = Some(agent.to_string());
        }

        result.recorded_at = Some(now);
        let message = match result.status {
            ResultStatus::Completed => "Task completed. Continue to next task.".to_string(),
            ResultStatus::Failed => format!(
                "Task failed at {}. Replan and continue.",
                result.failed_phase.as_deref().unwrap_or(UNKNOWN_PHASE)
            ),
            _ => "Iteration recorded. Check the dartboard for task status.".to_string(),
        };
        let status = result.status;
        push_capped(&mut self.tasks, result, limits.results_cap);

        debug!(iteration = self.iterations, status = status.as_str(), "iteration recorded");
        IterationSummary {
            iteration: self.iterations,
            result_status: status,
            message,
        }
    }

    /// Count a spawned executor. Returns the new spawn count.
    pub fn record_spawn(&mut self, now: DateTime<Utc>) -> u64 {
        self.spawns += 1;
        self.last_spawn_at = Some(now);
        self.last_activity = Some(now);
        self.spawns
    }

    /// Count a verification pass. Returns the new count.
    pub fn record_verification(&mut self, now: DateTime<Utc>) -> u64 {
        self.verifications += 1;
        self.last_verification_at = Some(now);
        self.last_activity = Some(now);
        self.verifications
    }

    /// Count a documentation update. Returns the new count.
    pub fn record_doc_update(&mut self, now: DateTime<Utc>) -> u64 {
        self.doc_updates += 1;
        self.last_doc_update_at = Some(now);
        self.last_activity = Some(now);
        self.doc_updates
    }
}

//! Decision engine: what to do after the last recorded iteration.
//!
//! `decide` is pure. The only loop-lifecycle side of failure policy that
//! lives here is `failure_halts_loop`, which `LoopState::complete_task`
//! consults to force a stop.

use crate::classify::UNKNOWN_PHASE;
use crate::types::{FailureMode, IterationResult, ResultStatus};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Action advised to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopAction {
    /// Pick up the next incomplete task.
    Continue,
    /// Inspect failed/blocked state and file a remedial task first.
    Replan,
    /// Halt the loop.
    Stop,
}

impl LoopAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Continue => "continue",
            Self::Replan => "replan",
            Self::Stop => "stop",
        }
    }
}

/// Action plus a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub action: LoopAction,
    pub reason: String,
}

impl Decision {
    fn new(action: LoopAction, reason: impl Into<String>) -> Self {
        Self {
            action,
            reason: reason.into(),
        }
    }
}

/// Decide the next action from the most recent result.
///
/// The per-result advice does not depend on `failure_mode`; whether a failure
/// halts the loop is decided separately when the task is completed.
pub fn decide(last_result: Option<&IterationResult>, failure_mode: FailureMode) -> Decision {
    let Some(result) = last_result else {
        return Decision::new(LoopAction::Continue, "no tasks processed yet");
    };

    let decision = match result.status {
        ResultStatus::Completed => {
            Decision::new(LoopAction::Continue, "last task completed successfully")
        }
        ResultStatus::Failed if result.fix_task_created => {
            Decision::new(LoopAction::Continue, "fix task created, processing it next")
        }
        ResultStatus::Failed => Decision::new(
            LoopAction::Replan,
            format!(
                "task failed at {}",
                result.failed_phase.as_deref().unwrap_or(UNKNOWN_PHASE)
            ),
        ),
        ResultStatus::Blocked => Decision::new(
            LoopAction::Replan,
            format!("blocked: {}", result.blocker.as_deref().unwrap_or("unknown")),
        ),
        ResultStatus::Uncertain => Decision::new(
            LoopAction::Replan,
            format!(
                "uncertain: {}",
                result.uncertainty.as_deref().unwrap_or("unknown")
            ),
        ),
        ResultStatus::Unknown => Decision::new(LoopAction::Continue, "checking for remaining tasks"),
    };

    debug!(
        status = result.status.as_str(),
        failure_mode = failure_mode.as_str(),
        action = decision.action.as_str(),
        "decision"
    );
    decision
}

/// Whether an explicitly failed task ends the loop under this policy.
pub fn failure_halts_loop(failure_mode: FailureMode) -> bool {
    matches!(failure_mode, FailureMode::Stop)
}

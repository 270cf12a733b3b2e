//! Loop gate: decides whether the caller may stop.
//!
//! Invoked at a natural stopping point. Returns a decision payload only; it
//! never dispatches work itself.

use crate::dartboard::DartboardResolver;
use crate::decision::{decide, LoopAction};
use crate::store::StateStore;
use crate::types::LoopState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

/// Halt reason when no loop is running.
pub const NO_ACTIVE_LOOP: &str = "no_active_loop";
/// Halt reason when no dartboard can be resolved.
pub const NO_DARTBOARD: &str = "no_dartboard";

/// Payload returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateOutcome {
    pub continue_loop: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<LoopAction>,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dartboard: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iterations_completed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_iteration_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directive: Option<String>,
    /// Directive phrased as an instruction not to stop.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl GateOutcome {
    fn halt(reason: &str) -> Self {
        Self {
            continue_loop: false,
            action: None,
            reason: reason.to_string(),
            dartboard: None,
            iterations_completed: None,
            last_iteration_at: None,
            directive: None,
            command: None,
        }
    }
}

/// Load the state and evaluate the gate.
pub fn check<S, R>(store: &S, resolver: &R) -> GateOutcome
where
    S: StateStore + ?Sized,
    R: DartboardResolver + ?Sized,
{
    evaluate(&store.load(), resolver)
}

/// Evaluate the gate against an already-loaded state.
pub fn evaluate<R>(state: &LoopState, resolver: &R) -> GateOutcome
where
    R: DartboardResolver + ?Sized,
{
    if !state.running {
        return GateOutcome::halt(NO_ACTIVE_LOOP);
    }

    let Some(dartboard) = resolver.get_active_dartboard() else {
        return GateOutcome::halt(NO_DARTBOARD);
    };

    let decision = decide(state.last_result(), state.failure_mode);
    let directive = directive(decision.action, &decision.reason, &dartboard);
    info!(
        action = decision.action.as_str(),
        reason = %decision.reason,
        dartboard = %dartboard,
        "gate keeps loop alive"
    );

    GateOutcome {
        continue_loop: true,
        action: Some(decision.action),
        command: Some(format!("DO NOT STOP. {directive}")),
        reason: decision.reason,
        dartboard: Some(dartboard),
        iterations_completed: Some(state.iterations),
        last_iteration_at: state.last_iteration_at,
        directive: Some(directive),
    }
}

/// Fill the instruction template for an action.
pub fn directive(action: LoopAction, reason: &str, dartboard: &str) -> String {
    match action {
        LoopAction::Continue => format!(
            "CONTINUE LOOP: Query the dartboard '{dartboard}' for remaining tasks \
             (is_completed=false, status 'To-do' or 'In Progress'). \
             Dispatch the task executor for the next task."
        ),
        LoopAction::Replan => format!(
            "REPLAN REQUIRED: {reason}. Query the dartboard '{dartboard}' for task state, \
             check for fix tasks or blocked tasks. \
             Create a fix task if needed, then continue with the next actionable task."
        ),
        LoopAction::Stop => format!("CHECK LOOP STATE: {reason}"),
    }
}

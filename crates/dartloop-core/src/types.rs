//! Core types for the work loop controller.
//!
//! `LoopState` is the single persisted record per workspace; everything else
//! hangs off it or is derived from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Unique identifier for sessions.
/// Uses `UUIDv7` for time-ordered lexicographic sorting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(pub String);

impl Id {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Id {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// --- Enumerations ---

/// Policy applied when a task fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureMode {
    /// A single failed task halts the loop.
    #[default]
    Stop,
    /// Failures only bump `tasks_failed`; the loop keeps running.
    #[serde(alias = "continue")]
    ContinueOnFailure,
}

impl FailureMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::ContinueOnFailure => "continue-on-failure",
        }
    }

    /// Parse a user-supplied mode. Accepts `continue` as shorthand.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "stop" => Some(Self::Stop),
            "continue-on-failure" | "continue_on_failure" | "continue" => {
                Some(Self::ContinueOnFailure)
            }
            _ => None,
        }
    }
}

/// Normalized outcome of one work attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    #[default]
    Unknown,
    #[serde(alias = "success")]
    Completed,
    Failed,
    Blocked,
    Uncertain,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Blocked => "blocked",
            Self::Uncertain => "uncertain",
        }
    }
}

// --- Core Types ---

/// The task currently being worked on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentTask {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub started_at: DateTime<Utc>,
}

/// Classified outcome of a single iteration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IterationResult {
    pub status: ResultStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// Pipeline stage that failed; only meaningful when `status` is `Failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_phase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocker: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uncertainty: Option<String>,
    pub fix_task_created: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<DateTime<Utc>>,
}

impl IterationResult {
    pub fn with_status(status: ResultStatus) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }
}

/// Archived summary of one finished loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopSummary {
    pub dartboard: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: DateTime<Utc>,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub stop_reason: String,
}

/// Durable record of one workspace's control loop.
///
/// Missing keys default on load and unknown keys are kept in `extra`, so a
/// hand-edited record still round-trips.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopState {
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

    /// Recorded iteration results, oldest first.
    pub tasks: Vec<IterationResult>,
    /// Archived loop summaries, oldest first.
    pub history: Vec<LoopSummary>,

    pub started_at: Option<DateTime<Utc>>,
    pub last_activity: Option<DateTime<Utc>>,
    pub last_iteration_at: Option<DateTime<Utc>>,
    pub last_spawn_at: Option<DateTime<Utc>>,
    pub last_verification_at: Option<DateTime<Utc>>,
    pub last_doc_update_at: Option<DateTime<Utc>>,
    /// Agent that reported the most recent iteration.
    pub last_agent: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl LoopState {
    /// Most recently recorded iteration result, if any.
    pub fn last_result(&self) -> Option<&IterationResult> {
        self.tasks.last()
    }
}

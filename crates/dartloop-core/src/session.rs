//! Work session lifecycle.
//!
//! A session is opened when the caller's work session starts and archived
//! when it ends. The open session may carry the active dartboard, which the
//! resolver prefers over static configuration.

use crate::bounded::push_capped;
use crate::store::{read_json_or_default, write_json_atomic, StoreError};
use crate::types::Id;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One work session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: Id,
    pub started_at: DateTime<Utc>,
    pub working_dir: String,
    pub pid: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_dartboard: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

/// Archive of ended sessions, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionHistory {
    pub sessions: Vec<SessionRecord>,
}

/// Result of `cleanup`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionCleanup {
    pub session_ended: DateTime<Utc>,
    pub archived: bool,
    pub archived_sessions: usize,
}

/// File-backed session store.
#[derive(Debug, Clone)]
pub struct SessionStore {
    current_path: PathBuf,
    history_path: PathBuf,
    history_cap: usize,
}

impl SessionStore {
    pub fn new(
        current_path: impl Into<PathBuf>,
        history_path: impl Into<PathBuf>,
        history_cap: usize,
    ) -> Self {
        Self {
            current_path: current_path.into(),
            history_path: history_path.into(),
            history_cap,
        }
    }

    /// Open a new session, replacing any session left open.
    pub fn init(&self, working_dir: &Path, now: DateTime<Utc>) -> Result<SessionRecord, StoreError> {
        let record = SessionRecord {
            id: Id::new(),
            started_at: now,
            working_dir: working_dir.display().to_string(),
            pid: std::process::id(),
            active_dartboard: None,
            ended_at: None,
        };
        write_json_atomic(&self.current_path, &record)?;
        debug!(session = %record.id, "session opened");
        Ok(record)
    }

    /// The open session, if any. A corrupt session file counts as none.
    pub fn current(&self) -> Option<SessionRecord> {
        let raw = std::fs::read_to_string(&self.current_path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(path = %self.current_path.display(), error = %e, "corrupt session file");
                None
            }
        }
    }

    /// Set the active dartboard on the open session. No-op without one.
    pub fn set_active_dartboard(&self, dartboard: &str) -> Result<bool, StoreError> {
        let Some(mut record) = self.current() else {
            return Ok(false);
        };
        record.active_dartboard = Some(dartboard.to_string());
        write_json_atomic(&self.current_path, &record)?;
        Ok(true)
    }

    /// Close the open session and archive it.
    pub fn cleanup(&self, now: DateTime<Utc>) -> Result<SessionCleanup, StoreError> {
        let current = self.current();
        if self.current_path.exists() {
            std::fs::remove_file(&self.current_path)?;
        }

        let mut history = self.history();
        let archived = if let Some(mut record) = current {
            record.ended_at = Some(now);
            push_capped(&mut history.sessions, record, self.history_cap);
            write_json_atomic(&self.history_path, &history)?;
            true
        } else {
            false
        };

        Ok(SessionCleanup {
            session_ended: now,
            archived,
            archived_sessions: history.sessions.len(),
        })
    }

    /// Archived sessions, oldest first.
    pub fn history(&self) -> SessionHistory {
        read_json_or_default(&self.history_path)
    }
}

//! Tracked file-change and task-update logs.
//!
//! Both append whatever the caller's hook reports. Payloads are opaque.

use crate::bounded::push_capped;
use crate::store::{read_json_or_default, write_json_atomic, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEntry {
    pub timestamp: DateTime<Utc>,
    pub working_dir: String,
    #[serde(default)]
    pub info: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackedChanges {
    pub changes: Vec<ChangeEntry>,
}

/// File-backed change log capped at `cap` entries.
#[derive(Debug, Clone)]
pub struct ChangeLog {
    path: PathBuf,
    cap: usize,
}

impl ChangeLog {
    pub fn new(path: impl Into<PathBuf>, cap: usize) -> Self {
        Self {
            path: path.into(),
            cap,
        }
    }

    /// Append one change and return the number of retained entries.
    pub fn track(
        &self,
        working_dir: &Path,
        info: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let mut log = self.load();
        push_capped(
            &mut log.changes,
            ChangeEntry {
                timestamp: now,
                working_dir: working_dir.display().to_string(),
                info,
            },
            self.cap,
        );
        write_json_atomic(&self.path, &log)?;
        Ok(log.changes.len())
    }

    /// Current log. Missing or corrupt files read as empty.
    pub fn load(&self) -> TrackedChanges {
        read_json_or_default(&self.path)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskUpdateEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub task_info: serde_json::Value,
    pub working_dir: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskUpdates {
    pub updates: Vec<TaskUpdateEntry>,
}

/// File-backed task update log capped at `cap` entries.
#[derive(Debug, Clone)]
pub struct TaskUpdateLog {
    path: PathBuf,
    cap: usize,
}

impl TaskUpdateLog {
    pub fn new(path: impl Into<PathBuf>, cap: usize) -> Self {
        Self {
            path: path.into(),
            cap,
        }
    }

    /// Append one update and return the number of retained entries.
    pub fn track(
        &self,
        working_dir: &Path,
        task_info: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let mut log = self.load();
        push_capped(
            &mut log.updates,
            TaskUpdateEntry {
                timestamp: now,
                task_info,
                working_dir: working_dir.display().to_string(),
            },
            self.cap,
        );
        write_json_atomic(&self.path, &log)?;
        Ok(log.updates.len())
    }

    pub fn load(&self) -> TaskUpdates {
        read_json_or_default(&self.path)
    }
}

//! Workspace resolution and the stores rooted in it.

use chrono::{DateTime, Utc};
use dartloop_core::changes::{ChangeLog, TaskUpdateLog};
use dartloop_core::session::SessionStore;
use dartloop_core::{
    append_activity, ActivityKind, ActivityRow, Config, DartboardMemory, FileStateStore,
    WorkspaceDartboards,
};
use eyre::WrapErr;
use std::path::{Path, PathBuf};
use tracing::warn;

/// A resolved workspace and its configuration.
#[derive(Debug)]
pub struct Workspace {
    pub root: PathBuf,
    pub config: Config,
}

impl Workspace {
    pub fn open(root: Option<PathBuf>, config_override: Option<&Path>) -> eyre::Result<Self> {
        let root = match root {
            Some(root) => root,
            None => find_workspace_root()?,
        };
        let config = Config::for_workspace(&root, config_override)
            .wrap_err_with(|| format!("failed to load config for {}", root.display()))?;
        Ok(Self { root, config })
    }

    pub fn store(&self) -> FileStateStore {
        FileStateStore::new(self.config.loop_state_path())
    }

    pub fn sessions(&self) -> SessionStore {
        SessionStore::new(
            self.config.session_path(),
            self.config.session_history_path(),
            self.config.session_history_cap,
        )
    }

    pub fn memory(&self) -> DartboardMemory {
        DartboardMemory::new(&self.config.dartboard_file)
    }

    pub fn changes(&self) -> ChangeLog {
        ChangeLog::new(
            self.config.tracked_changes_path(),
            self.config.tracked_changes_cap,
        )
    }

    pub fn task_updates(&self) -> TaskUpdateLog {
        TaskUpdateLog::new(self.config.task_updates_path(), self.config.task_updates_cap)
    }

    /// Remember the dartboard a loop was started on. The loop record is
    /// already saved, so failures here are logged and not returned.
    pub fn remember_dartboard(&self, dartboard: &str, now: DateTime<Utc>) {
        if let Err(e) = self.memory().set_last(dartboard, now) {
            warn!(dartboard, error = %e, "failed to remember dartboard");
        }
        self.update_session_dartboard(dartboard);
    }

    /// Point the open session at `dartboard`. Returns whether a session was
    /// updated; write failures are logged.
    pub fn update_session_dartboard(&self, dartboard: &str) -> bool {
        match self.sessions().set_active_dartboard(dartboard) {
            Ok(updated) => updated,
            Err(e) => {
                warn!(dartboard, error = %e, "failed to update session dartboard");
                false
            }
        }
    }

    pub fn resolver(&self) -> WorkspaceDartboards {
        WorkspaceDartboards::new(self.sessions(), self.memory())
    }

    /// Append to the activity log. Failures are logged, never fatal.
    pub fn log(&self, kind: ActivityKind, detail: String) {
        let row = ActivityRow::new(Utc::now().timestamp_millis(), kind).with_detail(detail);
        let path = self.config.activity_log_path();
        if let Err(e) = append_activity(&path, &row) {
            warn!(path = %path.display(), error = %e, "failed to append activity");
        }
    }
}

/// Find the workspace root (git root or cwd).
fn find_workspace_root() -> eyre::Result<PathBuf> {
    let output = std::process::Command::new("git")
        .args(["rev-parse", "--show-toplevel"])
        .output();

    match output {
        Ok(out) if out.status.success() => {
            let path = String::from_utf8_lossy(&out.stdout).trim().to_string();
            Ok(PathBuf::from(path))
        }
        _ => std::env::current_dir().wrap_err("failed to read current directory"),
    }
}

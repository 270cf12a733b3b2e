//! Configuration parsing for the loop controller.
//!
//! `key=value` format, read from `<workspace>/.dartloop/config`.
//! Precedence: CLI flags > `--config` file > `.dartloop/config` > defaults.

use crate::bounded::{
    Limits, HISTORY_CAP, RESULTS_CAP, SESSION_HISTORY_CAP, TASK_UPDATES_CAP, TRACKED_CHANGES_CAP,
};
use crate::classify::{ClassifyOptions, DEFAULT_EXCERPT_CHARS};
use crate::types::FailureMode;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Workspace-relative location of the project config file.
pub const PROJECT_CONFIG: &str = ".dartloop/config";

const LOOP_STATE_FILE: &str = "loop-state.json";
const SESSION_FILE: &str = "session.json";
const SESSION_HISTORY_FILE: &str = "session-history.json";
const TRACKED_CHANGES_FILE: &str = "tracked-changes.json";
const TASK_UPDATES_FILE: &str = "task-updates.json";
const ACTIVITY_FILE: &str = "activity.tsv";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("invalid config line: {0}")]
    InvalidLine(String),
    #[error("invalid boolean value for {key}: {value}")]
    InvalidBool { key: String, value: String },
    #[error("invalid integer value for {key}: {value}")]
    InvalidInt { key: String, value: String },
    #[error("config file not found: {0}")]
    NotFound(PathBuf),
}

/// Loop controller configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding all persisted documents.
    pub state_dir: PathBuf,
    /// Dartboard memory file (YAML frontmatter + notes).
    pub dartboard_file: PathBuf,

    /// Failure mode used by `start` when none is given.
    pub failure_mode: FailureMode,

    pub results_cap: usize,
    pub history_cap: usize,
    pub session_history_cap: usize,
    pub tracked_changes_cap: usize,
    pub task_updates_cap: usize,

    /// Max characters captured for blocker/uncertainty excerpts.
    pub excerpt_chars: usize,
    /// Classify free-text reports when no structured status is given.
    pub heuristic_fallback: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(".dartloop"),
            dartboard_file: PathBuf::from(".dartloop/dartboards.md"),
            failure_mode: FailureMode::Stop,
            results_cap: RESULTS_CAP,
            history_cap: HISTORY_CAP,
            session_history_cap: SESSION_HISTORY_CAP,
            tracked_changes_cap: TRACKED_CHANGES_CAP,
            task_updates_cap: TASK_UPDATES_CAP,
            excerpt_chars: DEFAULT_EXCERPT_CHARS,
            heuristic_fallback: true,
        }
    }
}

impl Config {
    /// Load config from a file, merging with defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.load_file(path)?;
        Ok(config)
    }

    /// Build the config for a workspace: project file, then override, then
    /// resolve relative paths against the workspace root.
    pub fn for_workspace(
        workspace_root: &Path,
        config_override: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let project_config = workspace_root.join(PROJECT_CONFIG);
        if project_config.exists() {
            config.load_file(&project_config)?;
        }

        if let Some(override_path) = config_override {
            if !override_path.exists() {
                return Err(ConfigError::NotFound(override_path.to_path_buf()));
            }
            config.load_file(override_path)?;
        }

        config.resolve_paths(workspace_root);
        Ok(config)
    }

    /// Load and merge values from a config file.
    pub fn load_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let content = std::fs::read_to_string(path)?;
        self.parse_content(&content)
    }

    /// Parse config content (key=value format).
    fn parse_content(&mut self, content: &str) -> Result<(), ConfigError> {
        for line in content.lines() {
            let trimmed = line.trim();

            // Skip empty lines and comments
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let Some((key, value)) = trimmed.split_once('=') else {
                return Err(ConfigError::InvalidLine(line.to_string()));
            };

            let key = key.trim();
            let value = Self::unquote(value.trim());

            self.apply_value(key, &value)?;
        }
        Ok(())
    }

    /// Remove surrounding quotes from a value.
    fn unquote(value: &str) -> String {
        if value.len() >= 2
            && ((value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\'')))
        {
            return value[1..value.len() - 1].to_string();
        }
        value.to_string()
    }

    /// Apply a single config value.
    fn apply_value(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "state_dir" => {
                // Keep the dartboard file alongside unless it was set explicitly.
                if self.dartboard_file == Self::default().dartboard_file {
                    self.dartboard_file = PathBuf::from(value).join("dartboards.md");
                }
                self.state_dir = PathBuf::from(value);
            }
            "dartboard_file" => self.dartboard_file = PathBuf::from(value),
            "failure_mode" => {
                self.failure_mode = FailureMode::parse(value).ok_or_else(|| {
                    ConfigError::InvalidLine(format!(
                        "failure_mode must be 'stop' or 'continue-on-failure', got '{value}'"
                    ))
                })?;
            }
            "results_cap" => self.results_cap = Self::parse_int(key, value)?,
            "history_cap" => self.history_cap = Self::parse_int(key, value)?,
            "session_history_cap" => self.session_history_cap = Self::parse_int(key, value)?,
            "tracked_changes_cap" => self.tracked_changes_cap = Self::parse_int(key, value)?,
            "task_updates_cap" => self.task_updates_cap = Self::parse_int(key, value)?,
            "excerpt_chars" => self.excerpt_chars = Self::parse_int(key, value)?,
            "heuristic_fallback" => self.heuristic_fallback = Self::parse_bool(key, value)?,
            _ => {
                // Warn but don't fail for unknown keys
                warn!(key, "unknown config key");
            }
        }
        Ok(())
    }

    fn parse_int(key: &str, value: &str) -> Result<usize, ConfigError> {
        value.parse().map_err(|_| ConfigError::InvalidInt {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    /// Parse a boolean value.
    fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
        match value.to_lowercase().as_str() {
            "true" | "1" | "yes" | "y" | "on" => Ok(true),
            "false" | "0" | "no" | "n" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidBool {
                key: key.to_string(),
                value: value.to_string(),
            }),
        }
    }

    /// Resolve relative paths against a workspace root.
    pub fn resolve_paths(&mut self, workspace_root: &Path) {
        if self.state_dir.is_relative() {
            self.state_dir = workspace_root.join(&self.state_dir);
        }
        if self.dartboard_file.is_relative() {
            self.dartboard_file = workspace_root.join(&self.dartboard_file);
        }
    }

    /// Persisted `LoopState` record.
    pub fn loop_state_path(&self) -> PathBuf {
        self.state_dir.join(LOOP_STATE_FILE)
    }

    /// The open session, if any.
    pub fn session_path(&self) -> PathBuf {
        self.state_dir.join(SESSION_FILE)
    }

    /// Archive of ended sessions.
    pub fn session_history_path(&self) -> PathBuf {
        self.state_dir.join(SESSION_HISTORY_FILE)
    }

    /// Capped log of edit-hook payloads.
    pub fn tracked_changes_path(&self) -> PathBuf {
        self.state_dir.join(TRACKED_CHANGES_FILE)
    }

    /// Capped log of task update payloads.
    pub fn task_updates_path(&self) -> PathBuf {
        self.state_dir.join(TASK_UPDATES_FILE)
    }

    /// Append-only `activity.tsv`.
    pub fn activity_log_path(&self) -> PathBuf {
        self.state_dir.join(ACTIVITY_FILE)
    }

    pub fn limits(&self) -> Limits {
        Limits {
            history_cap: self.history_cap,
            results_cap: self.results_cap,
            session_history_cap: self.session_history_cap,
            tracked_changes_cap: self.tracked_changes_cap,
            task_updates_cap: self.task_updates_cap,
        }
    }

    pub fn classify_options(&self) -> ClassifyOptions {
        ClassifyOptions {
            excerpt_chars: self.excerpt_chars,
            heuristic_fallback: self.heuristic_fallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_has_expected_values() {
        let config = Config::default();
        assert_eq!(config.state_dir, PathBuf::from(".dartloop"));
        assert_eq!(config.failure_mode, FailureMode::Stop);
        assert_eq!(config.limits(), Limits::default());
        assert_eq!(config.excerpt_chars, 200);
        assert!(config.heuristic_fallback);
    }

    #[test]
    fn parse_simple_config() {
        let mut config = Config::default();
        let content = r#"
# loop settings
failure_mode="continue-on-failure"
history_cap=5
task_updates_cap=12
excerpt_chars = 80
heuristic_fallback=off
"#;
        config.parse_content(content).unwrap();
        assert_eq!(config.failure_mode, FailureMode::ContinueOnFailure);
        assert_eq!(config.history_cap, 5);
        assert_eq!(config.limits().task_updates_cap, 12);
        assert_eq!(config.excerpt_chars, 80);
        assert!(!config.heuristic_fallback);
    }

    #[test]
    fn state_dir_moves_default_dartboard_file() {
        let mut config = Config::default();
        config.parse_content("state_dir=/var/lib/dartloop").unwrap();
        assert_eq!(config.loop_state_path(), PathBuf::from("/var/lib/dartloop/loop-state.json"));
        assert_eq!(config.dartboard_file, PathBuf::from("/var/lib/dartloop/dartboards.md"));
    }

    #[test]
    fn explicit_dartboard_file_is_kept() {
        let mut config = Config::default();
        config
            .parse_content("dartboard_file=.claude/dartai.local.md\nstate_dir=/tmp/s")
            .unwrap();
        assert_eq!(config.dartboard_file, PathBuf::from(".claude/dartai.local.md"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut config = Config::default();
        assert!(matches!(
            config.parse_content("history_cap=lots"),
            Err(ConfigError::InvalidInt { .. })
        ));
        assert!(matches!(
            config.parse_content("heuristic_fallback=maybe"),
            Err(ConfigError::InvalidBool { .. })
        ));
        assert!(matches!(
            config.parse_content("failure_mode=panic"),
            Err(ConfigError::InvalidLine(_))
        ));
        assert!(matches!(
            config.parse_content("no equals sign"),
            Err(ConfigError::InvalidLine(_))
        ));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let mut config = Config::default();
        config.parse_content("mystery_knob=11").unwrap();
        assert_eq!(config.history_cap, HISTORY_CAP);
    }

    #[test]
    fn unquote_removes_quotes() {
        assert_eq!(Config::unquote("\"hello\""), "hello");
        assert_eq!(Config::unquote("'world'"), "world");
        assert_eq!(Config::unquote("noquotes"), "noquotes");
    }

    #[test]
    fn for_workspace_resolves_relative_paths() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".dartloop")).unwrap();
        std::fs::write(dir.path().join(PROJECT_CONFIG), "results_cap=7\n").unwrap();

        let config = Config::for_workspace(dir.path(), None).unwrap();
        assert_eq!(config.results_cap, 7);
        assert_eq!(config.state_dir, dir.path().join(".dartloop"));
        assert_eq!(config.activity_log_path(), dir.path().join(".dartloop/activity.tsv"));
    }

    #[test]
    fn for_workspace_rejects_missing_override() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.conf");
        assert!(matches!(
            Config::for_workspace(dir.path(), Some(&missing)),
            Err(ConfigError::NotFound(_))
        ));
    }
}

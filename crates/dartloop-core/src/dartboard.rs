//! Dartboard memory and resolution.
//!
//! The memory file is markdown with a YAML frontmatter block holding
//! `last_dartboard`, `default_dartboard` and any other settings the user
//! adds. The body below the frontmatter is free-form notes and is preserved
//! on every write.

use crate::session::SessionStore;
use chrono::{DateTime, Utc};
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, warn};

const LAST_KEY: &str = "last_dartboard";
const LAST_USED_KEY: &str = "last_dartboard_used_at";
const DEFAULT_KEY: &str = "default_dartboard";
const FENCE: &str = "---";

#[derive(Debug, Error)]
pub enum DartboardError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Supplies the active work queue, if one can be determined.
pub trait DartboardResolver {
    fn get_active_dartboard(&self) -> Option<String>;
}

impl<F> DartboardResolver for F
where
    F: Fn() -> Option<String>,
{
    fn get_active_dartboard(&self) -> Option<String> {
        self()
    }
}

/// Parsed memory file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryDocument {
    pub frontmatter: Mapping,
    pub content: String,
}

impl MemoryDocument {
    /// Parse frontmatter + body. Bad YAML yields empty frontmatter.
    pub fn parse(text: &str) -> Self {
        let Some((yaml, body)) = split_frontmatter(text) else {
            return Self {
                frontmatter: Mapping::new(),
                content: text.to_string(),
            };
        };

        let frontmatter = if yaml.trim().is_empty() {
            Mapping::new()
        } else {
            serde_yaml::from_str(yaml).unwrap_or_else(|e| {
                warn!(error = %e, "invalid dartboard frontmatter, ignoring");
                Mapping::new()
            })
        };
        Self {
            frontmatter,
            content: body.trim().to_string(),
        }
    }

    /// Serialize back to `---` fenced YAML followed by the notes body.
    pub fn render(&self) -> Result<String, DartboardError> {
        let yaml = if self.frontmatter.is_empty() {
            String::new()
        } else {
            serde_yaml::to_string(&self.frontmatter)?
        };
        Ok(format!("{FENCE}\n{yaml}{FENCE}\n\n{}", self.content))
    }

    /// Non-empty string value for `key`.
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.frontmatter
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    fn set_str(&mut self, key: &str, value: impl Into<String>) {
        self.frontmatter
            .insert(Value::String(key.to_string()), Value::String(value.into()));
    }
}

/// Split `---` fenced frontmatter from the body.
///
/// Both fences must sit on their own line; a `---` inside a value does not
/// close the block.
fn split_frontmatter(text: &str) -> Option<(&str, &str)> {
    let rest = text.strip_prefix(FENCE)?;
    let rest = rest
        .strip_prefix('\n')
        .or_else(|| rest.strip_prefix("\r\n"))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end_matches(['\r', '\n']) == FENCE {
            return Some((&rest[..offset], &rest[offset + line.len()..]));
        }
        offset += line.len();
    }
    None
}

/// Dartboard memory stored at an explicit path.
#[derive(Debug, Clone)]
pub struct DartboardMemory {
    path: PathBuf,
}

impl DartboardMemory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> MemoryDocument {
        match fs::read_to_string(&self.path) {
            Ok(text) => MemoryDocument::parse(&text),
            Err(_) => MemoryDocument::default(),
        }
    }

    fn write(&self, doc: &MemoryDocument) -> Result<(), DartboardError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, doc.render()?)?;
        debug!(path = %self.path.display(), "dartboard memory written");
        Ok(())
    }

    /// `last_dartboard` if set, else `default_dartboard`.
    pub fn get(&self) -> Option<String> {
        let doc = self.load();
        doc.get_str(LAST_KEY).or_else(|| doc.get_str(DEFAULT_KEY))
    }

    /// Dartboard used most recently.
    pub fn last(&self) -> Option<String> {
        self.load().get_str(LAST_KEY)
    }

    /// Fallback dartboard when none was used recently.
    pub fn default_dartboard(&self) -> Option<String> {
        self.load().get_str(DEFAULT_KEY)
    }

    /// Remember `dartboard` as last used, stamped with `now`.
    pub fn set_last(&self, dartboard: &str, now: DateTime<Utc>) -> Result<(), DartboardError> {
        let mut doc = self.load();
        doc.set_str(LAST_KEY, dartboard);
        doc.set_str(LAST_USED_KEY, now.to_rfc3339());
        self.write(&doc)
    }

    /// Set the fallback dartboard.
    pub fn set_default(&self, dartboard: &str) -> Result<(), DartboardError> {
        let mut doc = self.load();
        doc.set_str(DEFAULT_KEY, dartboard);
        self.write(&doc)
    }

    /// Forget the last dartboard; the default is kept.
    pub fn clear_last(&self) -> Result<(), DartboardError> {
        let mut doc = self.load();
        doc.frontmatter.remove(LAST_KEY);
        doc.frontmatter.remove(LAST_USED_KEY);
        self.write(&doc)
    }

    /// `{key: value}` for one frontmatter key, or the whole frontmatter
    /// when `key` is `None`.
    pub fn config_value(&self, key: Option<&str>) -> serde_json::Value {
        let mut doc = self.load();
        let value = match key {
            Some(key) => {
                let mut single = Mapping::new();
                let value = doc.frontmatter.remove(key).unwrap_or(Value::Null);
                single.insert(Value::String(key.to_string()), value);
                single
            }
            None => doc.frontmatter,
        };
        serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
    }
}

/// Resolver used by the gate: open session first, then the memory file.
#[derive(Debug, Clone)]
pub struct WorkspaceDartboards {
    sessions: SessionStore,
    memory: DartboardMemory,
}

impl WorkspaceDartboards {
    pub fn new(sessions: SessionStore, memory: DartboardMemory) -> Self {
        Self { sessions, memory }
    }
}

impl DartboardResolver for WorkspaceDartboards {
    fn get_active_dartboard(&self) -> Option<String> {
        self.sessions
            .current()
            .and_then(|s| s.active_dartboard)
            .filter(|d| !d.is_empty())
            .or_else(|| self.memory.get())
    }
}

/// Extract the dartboard from a tool hook payload.
///
/// Accepts `tool_input.parameters.dartboard` (proxied tool calls) or
/// `tool_input.dartboard` (direct calls).
pub fn dartboard_from_hook(payload: &serde_json::Value) -> Option<String> {
    let tool_input = payload.get("tool_input")?;
    let dartboard = match tool_input.get("parameters") {
        Some(params) => params.get("dartboard"),
        None => tool_input.get("dartboard"),
    }?;
    dartboard
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounded::SESSION_HISTORY_CAP;
    use serde_json::json;
    use tempfile::TempDir;

    fn memory(dir: &TempDir) -> DartboardMemory {
        DartboardMemory::new(dir.path().join("dartboards.md"))
    }

    #[test]
    fn missing_file_has_no_dartboard() {
        let dir = TempDir::new().unwrap();
        assert!(memory(&dir).get().is_none());
    }

    #[test]
    fn last_wins_over_default() {
        let dir = TempDir::new().unwrap();
        let mem = memory(&dir);
        mem.set_default("General/Tasks").unwrap();
        assert_eq!(mem.get().as_deref(), Some("General/Tasks"));

        mem.set_last("Eng/Sprint", Utc::now()).unwrap();
        assert_eq!(mem.get().as_deref(), Some("Eng/Sprint"));

        mem.clear_last().unwrap();
        assert_eq!(mem.get().as_deref(), Some("General/Tasks"));
        assert!(mem.last().is_none());
    }

    #[test]
    fn notes_body_survives_writes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dartboards.md");
        fs::write(&path, "---\ndefault_dartboard: Ops\nteam: infra\n---\n\n# Notes\nkeep me\n").unwrap();

        let mem = DartboardMemory::new(&path);
        mem.set_last("Ops/Oncall", Utc::now()).unwrap();

        let doc = mem.load();
        assert_eq!(doc.content, "# Notes\nkeep me");
        assert_eq!(doc.get_str("team").as_deref(), Some("infra"));
        assert_eq!(mem.default_dartboard().as_deref(), Some("Ops"));
        assert_eq!(mem.config_value(Some("team")), json!({"team": "infra"}));
        assert_eq!(mem.config_value(Some("missing")), json!({"missing": null}));
    }

    #[test]
    fn fence_inside_value_round_trips() {
        let dir = TempDir::new().unwrap();
        let mem = memory(&dir);
        mem.set_default("Ops").unwrap();
        mem.set_last("Eng---Sprint", Utc::now()).unwrap();

        assert_eq!(mem.get().as_deref(), Some("Eng---Sprint"));
        mem.set_default("Ops---Oncall").unwrap();
        assert_eq!(mem.last().as_deref(), Some("Eng---Sprint"));
        assert_eq!(mem.default_dartboard().as_deref(), Some("Ops---Oncall"));
        assert!(mem.load().content.is_empty());
    }

    #[test]
    fn closing_fence_must_be_its_own_line() {
        let doc = MemoryDocument::parse("---\ntitle: a---b\n---\nnotes");
        assert_eq!(doc.get_str("title").as_deref(), Some("a---b"));
        assert_eq!(doc.content, "notes");

        let doc = MemoryDocument::parse("---\r\nlast_dartboard: Q\r\n---\r\n\r\nnotes");
        assert_eq!(doc.get_str("last_dartboard").as_deref(), Some("Q"));
        assert_eq!(doc.content, "notes");

        let unclosed = MemoryDocument::parse("---\nlast_dartboard: a");
        assert!(unclosed.frontmatter.is_empty());
    }

    #[test]
    fn plain_markdown_has_no_frontmatter() {
        let doc = MemoryDocument::parse("just notes");
        assert!(doc.frontmatter.is_empty());
        assert_eq!(doc.content, "just notes");
    }

    #[test]
    fn bad_yaml_is_ignored() {
        let doc = MemoryDocument::parse("---\n: : [\n---\nbody");
        assert!(doc.frontmatter.is_empty());
        assert_eq!(doc.content, "body");
    }

    #[test]
    fn resolver_prefers_session() {
        let dir = TempDir::new().unwrap();
        let sessions = SessionStore::new(
            dir.path().join("session.json"),
            dir.path().join("session-history.json"),
            SESSION_HISTORY_CAP,
        );
        let mem = memory(&dir);
        mem.set_default("Fallback").unwrap();
        let resolver = WorkspaceDartboards::new(sessions.clone(), mem);

        assert_eq!(resolver.get_active_dartboard().as_deref(), Some("Fallback"));

        sessions.init(dir.path(), Utc::now()).unwrap();
        sessions.set_active_dartboard("Session/Board").unwrap();
        assert_eq!(resolver.get_active_dartboard().as_deref(), Some("Session/Board"));
    }

    #[test]
    fn closures_are_resolvers() {
        let none = || -> Option<String> { None };
        assert!(none.get_active_dartboard().is_none());
        let fixed = || -> Option<String> { Some("queue-A".to_string()) };
        assert_eq!(fixed.get_active_dartboard().as_deref(), Some("queue-A"));
    }

    #[test]
    fn hook_payload_extraction() {
        let proxied = json!({"tool_input": {"parameters": {"dartboard": "A/B"}}});
        assert_eq!(dartboard_from_hook(&proxied).as_deref(), Some("A/B"));

        let direct = json!({"tool_input": {"dartboard": "C"}});
        assert_eq!(dartboard_from_hook(&direct).as_deref(), Some("C"));

        let missing = json!({"tool_input": {"title": "x"}});
        assert!(dartboard_from_hook(&missing).is_none());
        assert!(dartboard_from_hook(&json!({})).is_none());
    }
}

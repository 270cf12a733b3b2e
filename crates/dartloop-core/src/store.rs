//! Persistence for the loop state record and the other JSON documents.
//!
//! Reads never fail: a missing, unreadable or corrupt document degrades to
//! its default and a warning is logged. Writes replace the whole document
//! via a temp file and rename, so readers never observe a partial record.
//!
//! There is no locking. Two invocations racing on the same workspace both
//! write full records and the later rename wins.

use crate::types::LoopState;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Suffix for the sibling file used during atomic writes.
const TMP_SUFFIX: &str = ".tmp";

/// Load/save access to one workspace's `LoopState`.
pub trait StateStore {
    /// Current state, or the default when nothing usable is stored.
    fn load(&self) -> LoopState;

    /// Replace the stored state in full.
    fn save(&self, state: &LoopState) -> Result<()>;
}

/// `LoopState` persisted as pretty JSON at an explicit path.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> LoopState {
        read_json_or_default(&self.path)
    }

    fn save(&self, state: &LoopState) -> Result<()> {
        write_json_atomic(&self.path, state)
    }
}

/// In-memory store holding the serialized record.
///
/// Keeps the serialized form rather than the struct so tests exercise the
/// same encode/decode path as the file store.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    raw: Mutex<Option<String>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with raw document text, valid or not.
    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self {
            raw: Mutex::new(Some(raw.into())),
        }
    }

    /// Raw document text as last saved.
    pub fn raw(&self) -> Option<String> {
        self.raw.lock().map_or(None, |guard| guard.clone())
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> LoopState {
        match self.raw() {
            Some(raw) => decode_or_default(&raw, "memory"),
            None => LoopState::default(),
        }
    }

    fn save(&self, state: &LoopState) -> Result<()> {
        let encoded = serde_json::to_string_pretty(state)?;
        if let Ok(mut guard) = self.raw.lock() {
            *guard = Some(encoded);
        }
        Ok(())
    }
}

/// Read a JSON document, falling back to `T::default()` on any failure.
pub fn read_json_or_default<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    match fs::read_to_string(path) {
        Ok(raw) => decode_or_default(&raw, &path.display().to_string()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no stored document, using defaults");
            T::default()
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "unreadable document, using defaults");
            T::default()
        }
    }
}

fn decode_or_default<T>(raw: &str, source: &str) -> T
where
    T: DeserializeOwned + Default,
{
    match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            warn!(source, error = %e, "corrupt document, using defaults");
            T::default()
        }
    }
}

/// Write a JSON document via temp file + rename.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut json = serde_json::to_string_pretty(value)?;
    json.push('\n');

    let tmp_path = tmp_path_for(path);
    {
        let mut tmp = fs::File::create(&tmp_path)?;
        tmp.write_all(json.as_bytes())?;
        tmp.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;

    debug!(path = %path.display(), bytes = json.len(), "document saved");
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(TMP_SUFFIX);
    path.with_file_name(name)
}

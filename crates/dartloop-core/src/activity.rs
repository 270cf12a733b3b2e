//! Append-only activity log (`activity.tsv`).
//!
//! One row per state-changing operation, for auditing a loop after the fact.
//!
//! Columns: `timestamp_ms`, kind, detail

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Kind of logged activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    LoopStart,
    LoopStop,
    TaskSet,
    TaskComplete,
    Iteration,
    Spawn,
    Verification,
    DocUpdate,
    Change,
    TaskUpdate,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LoopStart => "LOOP_START",
            Self::LoopStop => "LOOP_STOP",
            Self::TaskSet => "TASK_SET",
            Self::TaskComplete => "TASK_COMPLETE",
            Self::Iteration => "ITERATION",
            Self::Spawn => "SPAWN",
            Self::Verification => "VERIFICATION",
            Self::DocUpdate => "DOC_UPDATE",
            Self::Change => "CHANGE",
            Self::TaskUpdate => "TASK_UPDATE",
        }
    }
}

/// A single row in the activity log.
#[derive(Debug, Clone)]
pub struct ActivityRow {
    /// Unix timestamp in milliseconds.
    pub timestamp_ms: i64,
    pub kind: ActivityKind,
    /// Free-form detail, e.g. `dartboard=queue-A mode=stop`.
    pub detail: String,
}

impl ActivityRow {
    pub fn new(timestamp_ms: i64, kind: ActivityKind) -> Self {
        Self {
            timestamp_ms,
            kind,
            detail: String::new(),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }

    fn to_tsv_line(&self) -> String {
        format!(
            "{}\t{}\t{}",
            self.timestamp_ms,
            self.kind.as_str(),
            sanitize_field(&self.detail)
        )
    }
}

/// Sanitize a field value to prevent TSV breakage.
fn sanitize_field(value: &str) -> String {
    value.replace(['\t', '\n', '\r'], " ")
}

/// TSV header row.
const HEADER: &str = "timestamp_ms\tkind\tdetail";

/// Writer for activity.tsv files.
pub struct ActivityWriter {
    writer: BufWriter<File>,
}

impl std::fmt::Debug for ActivityWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityWriter")
            .field("writer", &"BufWriter<File>")
            .finish()
    }
}

impl ActivityWriter {
    /// Open for append, writing the header if the file is new.
    pub fn new(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let exists = path.exists();
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        let mut writer = BufWriter::new(file);

        if !exists {
            writeln!(writer, "{HEADER}")?;
        }

        Ok(Self { writer })
    }

    pub fn write_row(&mut self, row: &ActivityRow) -> std::io::Result<()> {
        writeln!(self.writer, "{}", row.to_tsv_line())
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

/// Append one row and flush.
pub fn append_activity(path: &Path, row: &ActivityRow) -> std::io::Result<()> {
    let mut writer = ActivityWriter::new(path)?;
    writer.write_row(row)?;
    writer.flush()
}

//! Result classification for executor reports.
//!
//! Two paths are supported:
//! - Structured: the report is a JSON object carrying an explicit `status`.
//!   Its fields are taken as-is.
//! - Heuristic: free text is scanned for status keywords. This is a fallback
//!   for executors that cannot emit the structured form and can be turned off
//!   with `heuristic_fallback=false`.
//!
//! An absent or blank report is never an error; it classifies as `unknown`.

use crate::types::{IterationResult, ResultStatus};
use serde::Deserialize;

/// Default bound on captured `blocker` / `uncertainty` excerpts, in characters.
pub const DEFAULT_EXCERPT_CHARS: usize = 200;

const SUCCESS_TOKENS: &[&str] = &["completed", "success", "done"];
const FAILURE_TOKENS: &[&str] = &["failed", "error"];
const BLOCKED_TOKENS: &[&str] = &["blocked"];
const DOUBT_TOKENS: &[&str] = &["uncertain", "unsure", "unclear"];
const FIX_TASK_TOKENS: &[&str] = &["fix task", "created subtask"];

/// Words that can sit between a verb and "phase" without naming it.
const PHASE_FILLERS: &[&str] = &["a", "an", "the", "in", "at", "during", "of", "on"];

/// Phase name used when a failure cannot be attributed.
pub const UNKNOWN_PHASE: &str = "unknown";

/// Options controlling classification.
#[derive(Debug, Clone, Copy)]
pub struct ClassifyOptions {
    /// Maximum characters captured into `blocker` / `uncertainty`.
    pub excerpt_chars: usize,
    /// Scan free text when the report is not structured.
    pub heuristic_fallback: bool,
}

impl Default for ClassifyOptions {
    fn default() -> Self {
        Self {
            excerpt_chars: DEFAULT_EXCERPT_CHARS,
            heuristic_fallback: true,
        }
    }
}

/// Which path produced a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifySource {
    Structured,
    Heuristic,
    Empty,
}

/// Wire form of a structured executor report.
#[derive(Debug, Deserialize)]
struct StructuredReport {
    status: ResultStatus,
    #[serde(default)]
    task_id: Option<String>,
    #[serde(default)]
    failed_phase: Option<String>,
    #[serde(default)]
    blocker: Option<String>,
    #[serde(default)]
    uncertainty: Option<String>,
    #[serde(default)]
    fix_task_created: bool,
}

/// Classify a report, returning the result and the path that produced it.
///
/// # Example
/// ```
/// use dartloop_core::classify::{classify_report, ClassifyOptions, ClassifySource};
/// use dartloop_core::ResultStatus;
///
/// let (result, source) = classify_report(
///     Some(r#"{"status": "failed", "failed_phase": "tests"}"#),
///     ClassifyOptions::default(),
/// );
/// assert_eq!(result.status, ResultStatus::Failed);
/// assert_eq!(result.failed_phase.as_deref(), Some("tests"));
/// assert_eq!(source, ClassifySource::Structured);
///
/// let (result, _) = classify_report(Some("Build phase failed"), ClassifyOptions::default());
/// assert_eq!(result.failed_phase.as_deref(), Some("build"));
///
/// let (result, source) = classify_report(None, ClassifyOptions::default());
/// assert_eq!(result.status, ResultStatus::Unknown);
/// assert_eq!(source, ClassifySource::Empty);
/// ```
pub fn classify_report(
    report: Option<&str>,
    options: ClassifyOptions,
) -> (IterationResult, ClassifySource) {
    let Some(text) = report.map(str::trim).filter(|t| !t.is_empty()) else {
        return (IterationResult::default(), ClassifySource::Empty);
    };

    if let Some(result) = parse_structured(text, options.excerpt_chars) {
        return (result, ClassifySource::Structured);
    }

    if options.heuristic_fallback {
        (classify_text(text, options.excerpt_chars), ClassifySource::Heuristic)
    } else {
        (IterationResult::default(), ClassifySource::Heuristic)
    }
}

fn parse_structured(text: &str, excerpt_chars: usize) -> Option<IterationResult> {
    if !text.starts_with('{') {
        return None;
    }
    let report: StructuredReport = serde_json::from_str(text).ok()?;
    let failed_phase = match report.status {
        ResultStatus::Failed => report.failed_phase.or_else(|| Some(UNKNOWN_PHASE.to_string())),
        _ => None,
    };
    Some(IterationResult {
        status: report.status,
        task_id: report.task_id,
        failed_phase,
        blocker: report.blocker.map(|b| excerpt(&b, excerpt_chars)),
        uncertainty: report.uncertainty.map(|u| excerpt(&u, excerpt_chars)),
        fix_task_created: report.fix_task_created,
        recorded_at: None,
    })
}

/// Heuristic keyword classification. First matching rule wins.
pub fn classify_text(text: &str, excerpt_chars: usize) -> IterationResult {
    let lower = text.to_lowercase();
    let mut result = IterationResult {
        fix_task_created: mentions_fix_task(&lower),
        ..IterationResult::default()
    };

    if contains_any(&lower, SUCCESS_TOKENS) {
        result.status = ResultStatus::Completed;
    } else if contains_any(&lower, FAILURE_TOKENS) {
        result.status = ResultStatus::Failed;
        result.failed_phase = Some(extract_phase(&lower).unwrap_or_else(|| UNKNOWN_PHASE.to_string()));
    } else if contains_any(&lower, BLOCKED_TOKENS) {
        result.status = ResultStatus::Blocked;
        result.blocker = Some(excerpt(text, excerpt_chars));
    } else if contains_any(&lower, DOUBT_TOKENS) {
        result.status = ResultStatus::Uncertain;
        result.uncertainty = Some(excerpt(text, excerpt_chars));
    }

    result
}

/// Whether the text says a remedial task was filed.
pub fn mentions_fix_task(text: &str) -> bool {
    contains_any(&text.to_lowercase(), FIX_TASK_TOKENS)
}

/// Pull a phase name out of text mentioning "phase".
///
/// Prefers the word before "phase" ("build phase failed"), falling back to
/// the word after it ("failed in phase: verification").
pub fn extract_phase(text: &str) -> Option<String> {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !(c.is_alphanumeric() || c == '-' || c == '_'))
        .filter(|w| !w.is_empty())
        .collect();

    let idx = words.iter().position(|w| *w == "phase")?;

    let before = idx
        .checked_sub(1)
        .map(|i| words[i])
        .filter(|w| names_phase(w));
    let after = words.get(idx + 1).copied().filter(|w| names_phase(w));

    before.or(after).map(str::to_string)
}

/// Fillers and status words never name a phase.
fn names_phase(word: &str) -> bool {
    !PHASE_FILLERS.contains(&word)
        && ![SUCCESS_TOKENS, FAILURE_TOKENS, BLOCKED_TOKENS, DOUBT_TOKENS]
            .iter()
            .any(|tokens| tokens.contains(&word))
}

/// First `max_chars` characters of `text`, trimmed.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    text.trim().chars().take(max_chars).collect()
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

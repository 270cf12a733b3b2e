//! dartctl - work loop controller CLI
//!
//! Drives the per-workspace loop record and answers the stop gate. Every
//! command prints one JSON record to stdout and exits 1 on failure.

mod render;
mod workspace;

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use dartloop_core::classify::classify_report;
use dartloop_core::dartboard::dartboard_from_hook;
use dartloop_core::gate;
use dartloop_core::lifecycle::DEFAULT_STOP_REASON;
use dartloop_core::{ActivityKind, FailureMode, StateStore};
use eyre::WrapErr;
use serde_json::Value;
use std::io::{IsTerminal, Read};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};
use workspace::Workspace;

/// Work loop controller for dartboard-driven agents.
#[derive(Parser)]
#[command(name = "dartctl")]
#[command(about = "Keep an autonomous work loop running until its queue is done")]
#[command(version)]
struct Cli {
    /// Workspace root (default: git top-level, else current directory)
    #[arg(long, global = true, env = "DARTLOOP_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Config file path (overrides .dartloop/config)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a loop on a dartboard
    Start {
        /// Dartboard (work queue) name
        dartboard: String,

        /// Failure mode: stop or continue-on-failure
        #[arg(long, value_parser = parse_failure_mode)]
        failure_mode: Option<FailureMode>,
    },
    /// Stop the running loop
    Stop {
        /// Reason recorded in history
        reason: Option<String>,
    },
    /// Show loop status
    Status,
    /// Show archived loop summaries
    History,
    /// Mark the task being worked on
    SetTask {
        id: String,
        title: Option<String>,
    },
    /// Record a task outcome
    CompleteTask {
        id: String,

        /// Task failed
        #[arg(long)]
        failed: bool,

        /// Free-text failure details
        #[arg(long)]
        details: Option<String>,
    },
    /// Classify an executor report and count the iteration
    RecordIteration {
        /// Report text or JSON (falls back to piped stdin)
        #[arg(long, env = "DARTLOOP_RESULT")]
        report: Option<String>,

        /// Task the report belongs to (default: current task)
        #[arg(long)]
        task_id: Option<String>,

        /// Reporting agent
        #[arg(long, env = "CLAUDE_SUBAGENT_ID")]
        agent: Option<String>,
    },
    /// Count a spawned executor
    TrackSpawn {
        #[arg(long, env = "CLAUDE_SUBAGENT_TYPE")]
        agent_type: Option<String>,
    },
    /// Count a verification pass
    TrackVerification,
    /// Count a documentation update
    TrackDocs,
    /// Decide whether the caller may stop
    Gate,
    /// Dartboard memory
    Dartboard {
        #[command(subcommand)]
        command: DartboardCommand,
    },
    /// Save the dartboard named in a tool hook payload (stdin)
    TrackDartboard,
    /// Work session lifecycle
    Session {
        #[command(subcommand)]
        command: SessionCommand,
    },
    /// Append a file change reported on stdin
    TrackChange,
    /// Append a task update payload reported on stdin
    TrackTaskUpdate,
}

#[derive(Subcommand)]
enum DartboardCommand {
    /// Last dartboard, else default
    Get,
    GetDefault,
    GetLast,
    SetDefault { dartboard: String },
    SetLast { dartboard: String },
    ClearLast,
    /// One frontmatter value, or all of it
    GetConfig { key: Option<String> },
}

#[derive(Subcommand)]
enum SessionCommand {
    /// Open a session
    Init,
    /// Close and archive the open session
    Cleanup,
}

fn parse_failure_mode(s: &str) -> Result<FailureMode, String> {
    FailureMode::parse(s).ok_or_else(|| {
        format!("invalid failure mode '{s}', expected: stop, continue-on-failure")
    })
}

fn main() {
    let cli = Cli::parse();

    // stdout carries the JSON record; logs go to stderr.
    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    match run(cli) {
        Ok(record) => render::print_record(&record),
        Err(e) => {
            render::print_error(&e);
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> eyre::Result<Value> {
    let ws = Workspace::open(cli.workspace, cli.config.as_deref())?;
    debug!(root = %ws.root.display(), "workspace resolved");

    match cli.command {
        Command::Start {
            dartboard,
            failure_mode,
        } => run_start(&ws, &dartboard, failure_mode),
        Command::Stop { reason } => run_stop(&ws, reason.as_deref()),
        Command::Status => {
            let state = ws.store().load();
            Ok(serde_json::to_value(state.snapshot(Utc::now()))?)
        }
        Command::History => Ok(render::history(&ws.store().load())),
        Command::SetTask { id, title } => run_set_task(&ws, &id, title.as_deref()),
        Command::CompleteTask {
            id,
            failed,
            details,
        } => run_complete_task(&ws, &id, !failed, details.as_deref()),
        Command::RecordIteration {
            report,
            task_id,
            agent,
        } => run_record_iteration(&ws, report, task_id, agent.as_deref()),
        Command::TrackSpawn { agent_type } => run_track_spawn(&ws, agent_type.as_deref()),
        Command::TrackVerification => run_track_counter(&ws, Counter::Verifications),
        Command::TrackDocs => run_track_counter(&ws, Counter::DocUpdates),
        Command::Gate => Ok(serde_json::to_value(gate::check(
            &ws.store(),
            &ws.resolver(),
        ))?),
        Command::Dartboard { command } => run_dartboard(&ws, command),
        Command::TrackDartboard => run_track_dartboard(&ws),
        Command::Session { command } => run_session(&ws, command),
        Command::TrackChange => run_track_change(&ws),
        Command::TrackTaskUpdate => run_track_task_update(&ws),
    }
}

fn run_start(
    ws: &Workspace,
    dartboard: &str,
    failure_mode: Option<FailureMode>,
) -> eyre::Result<Value> {
    let store = ws.store();
    let mut state = store.load();
    let mode = failure_mode.unwrap_or(ws.config.failure_mode);
    let now = Utc::now();

    state.start(dartboard, mode, now)?;
    store.save(&state)?;

    ws.remember_dartboard(dartboard, now);
    ws.log(
        ActivityKind::LoopStart,
        format!("dartboard={dartboard} mode={}", mode.as_str()),
    );

    Ok(render::loop_started(dartboard, mode, now))
}

fn run_stop(ws: &Workspace, reason: Option<&str>) -> eyre::Result<Value> {
    let store = ws.store();
    let mut state = store.load();
    let reason = reason.unwrap_or(DEFAULT_STOP_REASON);

    let summary = state.stop(reason, &ws.config.limits(), Utc::now())?;
    store.save(&state)?;
    ws.log(ActivityKind::LoopStop, format!("reason={reason}"));

    Ok(render::loop_stopped(&summary))
}

fn run_set_task(ws: &Workspace, id: &str, title: Option<&str>) -> eyre::Result<Value> {
    let store = ws.store();
    let mut state = store.load();

    state.set_current_task(id, title.unwrap_or_default(), Utc::now())?;
    store.save(&state)?;
    ws.log(ActivityKind::TaskSet, format!("task={id}"));

    Ok(render::task_set(state.current_task.as_ref()))
}

fn run_complete_task(
    ws: &Workspace,
    id: &str,
    success: bool,
    details: Option<&str>,
) -> eyre::Result<Value> {
    let store = ws.store();
    let mut state = store.load();

    let completion = state.complete_task(id, success, details, &ws.config.limits(), Utc::now());
    store.save(&state)?;

    let mut detail = format!("task={id} success={success}");
    if let Some(reason) = &completion.halted {
        detail.push_str(&format!(" halted={reason}"));
    }
    ws.log(ActivityKind::TaskComplete, detail);

    Ok(render::task_completed(&completion, &state))
}

fn run_record_iteration(
    ws: &Workspace,
    report: Option<String>,
    task_id: Option<String>,
    agent: Option<&str>,
) -> eyre::Result<Value> {
    let report = match report {
        Some(report) => Some(report),
        None => read_stdin()?,
    };

    let store = ws.store();
    let mut state = store.load();

    let (mut result, source) = classify_report(report.as_deref(), ws.config.classify_options());
    if result.task_id.is_none() {
        result.task_id = task_id.or_else(|| state.current_task.as_ref().map(|t| t.id.clone()));
    }

    let summary = state.record_iteration(result, agent, &ws.config.limits(), Utc::now());
    store.save(&state)?;
    ws.log(
        ActivityKind::Iteration,
        format!(
            "iteration={} status={}",
            summary.iteration,
            summary.result_status.as_str()
        ),
    );

    Ok(render::iteration_recorded(&summary, source))
}

fn run_track_spawn(ws: &Workspace, agent_type: Option<&str>) -> eyre::Result<Value> {
    let store = ws.store();
    let mut state = store.load();
    let spawns = state.record_spawn(Utc::now());
    store.save(&state)?;

    let agent_type = agent_type.unwrap_or("unknown");
    ws.log(ActivityKind::Spawn, format!("agent_type={agent_type}"));

    let mut record = render::counter("spawns", spawns);
    record["agent_type"] = Value::from(agent_type);
    Ok(record)
}

/// Plain event counters on the loop record.
#[derive(Debug, Clone, Copy)]
enum Counter {
    Verifications,
    DocUpdates,
}

impl Counter {
    fn name(self) -> &'static str {
        match self {
            Self::Verifications => "verifications",
            Self::DocUpdates => "doc_updates",
        }
    }

    fn kind(self) -> ActivityKind {
        match self {
            Self::Verifications => ActivityKind::Verification,
            Self::DocUpdates => ActivityKind::DocUpdate,
        }
    }
}

fn run_track_counter(ws: &Workspace, counter: Counter) -> eyre::Result<Value> {
    let store = ws.store();
    let mut state = store.load();
    let now = Utc::now();

    let value = match counter {
        Counter::Verifications => state.record_verification(now),
        Counter::DocUpdates => state.record_doc_update(now),
    };
    store.save(&state)?;
    ws.log(counter.kind(), format!("{}={value}", counter.name()));

    Ok(render::counter(counter.name(), value))
}

fn run_dartboard(ws: &Workspace, command: DartboardCommand) -> eyre::Result<Value> {
    let memory = ws.memory();
    let record = match command {
        DartboardCommand::Get => render::dartboard("dartboard", memory.get()),
        DartboardCommand::GetDefault => {
            render::dartboard("default_dartboard", memory.default_dartboard())
        }
        DartboardCommand::GetLast => render::dartboard("last_dartboard", memory.last()),
        DartboardCommand::SetDefault { dartboard } => {
            memory.set_default(&dartboard)?;
            render::dartboard_saved("default_dartboard", &dartboard)
        }
        DartboardCommand::SetLast { dartboard } => {
            memory.set_last(&dartboard, Utc::now())?;
            render::dartboard_saved("last_dartboard", &dartboard)
        }
        DartboardCommand::ClearLast => {
            memory.clear_last()?;
            serde_json::json!({ "success": true, "message": "Last dartboard cleared" })
        }
        DartboardCommand::GetConfig { key } => memory.config_value(key.as_deref()),
    };
    Ok(record)
}

fn run_track_dartboard(ws: &Workspace) -> eyre::Result<Value> {
    let payload = read_stdin()?
        .and_then(|raw| serde_json::from_str::<Value>(&raw).ok())
        .unwrap_or(Value::Null);

    let Some(dartboard) = dartboard_from_hook(&payload) else {
        return Ok(render::dartboard_tracked(None, false));
    };

    ws.memory()
        .set_last(&dartboard, Utc::now())
        .wrap_err("failed to remember dartboard")?;
    let session_updated = ws.update_session_dartboard(&dartboard);
    Ok(render::dartboard_tracked(Some(&dartboard), session_updated))
}

fn run_session(ws: &Workspace, command: SessionCommand) -> eyre::Result<Value> {
    let sessions = ws.sessions();
    match command {
        SessionCommand::Init => {
            let record = sessions.init(&ws.root, Utc::now())?;
            let mut value = serde_json::to_value(record)?;
            value["success"] = Value::Bool(true);
            Ok(value)
        }
        SessionCommand::Cleanup => Ok(render::session_cleaned(&sessions.cleanup(Utc::now())?)),
    }
}

fn run_track_change(ws: &Workspace) -> eyre::Result<Value> {
    let info = match read_stdin()? {
        Some(raw) => serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
        None => Value::Null,
    };

    let retained = ws.changes().track(&ws.root, info, Utc::now())?;
    ws.log(ActivityKind::Change, format!("retained={retained}"));
    Ok(render::change_tracked(retained))
}

fn run_track_task_update(ws: &Workspace) -> eyre::Result<Value> {
    // Anything that is not a JSON payload is logged as an empty object.
    let task_info = read_stdin()?
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or_else(|| Value::Object(serde_json::Map::new()));

    let now = Utc::now();
    let retained = ws.task_updates().track(&ws.root, task_info, now)?;
    ws.log(ActivityKind::TaskUpdate, format!("retained={retained}"));
    Ok(render::task_update_logged(now, retained))
}

/// Read piped stdin. A terminal or empty input yields `None`.
fn read_stdin() -> eyre::Result<Option<String>> {
    let mut stdin = std::io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }
    let mut buf = String::new();
    stdin
        .read_to_string(&mut buf)
        .wrap_err("failed to read stdin")?;
    let trimmed = buf.trim();
    Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
}

pub mod activity;
pub mod bounded;
pub mod changes;
pub mod classify;
pub mod config;
pub mod dartboard;
pub mod decision;
pub mod gate;
pub mod lifecycle;
pub mod session;
pub mod store;
pub mod tracker;
pub mod types;

pub use activity::{append_activity, ActivityKind, ActivityRow, ActivityWriter};
pub use bounded::Limits;
pub use config::Config;
pub use dartboard::{DartboardMemory, DartboardResolver, WorkspaceDartboards};
pub use decision::{decide, Decision, LoopAction};
pub use gate::GateOutcome;
pub use lifecycle::{LoopError, StatusSnapshot, TaskCompletion};
pub use store::{FileStateStore, MemoryStateStore, StateStore, StoreError};
pub use types::*;

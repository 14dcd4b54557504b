//! Treasure Hunt Library
//!
//! Fixed-width treasure records per hunt, an audit log per hunt, and a hub
//! that drives a signal-triggered monitor process through a file channel.

pub mod audit;
pub mod channel;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod manager;
pub mod monitor;
pub mod platform;
pub mod score;
pub mod signal;
pub mod storage;
pub mod supervisor;
pub mod treasure;

// Re-export commonly used types for convenience
pub use channel::{CommandChannel, CommandKind, CommandRequest, FileChannel, InProcessChannel};
pub use config::HuntConfig;
pub use error::{
    ChannelError, ErrorCategory, MonitorError, ScoreError, StoreError, SupervisorError,
};
pub use manager::HuntManager;
pub use monitor::Monitor;
pub use score::{compute_score, ScoreLauncher, ScoreSummary};
pub use signal::TriggerQueue;
pub use storage::{list_hunts, HuntLayout, RecordStore};
pub use supervisor::{Hub, OutputStrategy, WorkerExit, WorkerState};
pub use treasure::{HuntId, TreasureRecord};

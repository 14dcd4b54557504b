//! Error types shared across the hunt store, the command channel, the monitor
//! and the hub.
//!
//! Every module keeps its own `thiserror` enum; `ErrorCategory` is the common
//! classification used for reporting. Apart from the explicit shutdown path no
//! error is fatal to the monitor: each one is contained to the request that
//! raised it.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

/// Error categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Missing hunt, record or channel file. Expected and non-fatal.
    NotFound,
    /// Short or misaligned read from a record store.
    CorruptStore,
    /// Open/read/write/rename failure.
    Io,
    /// The score subprocess could not be started.
    SubprocessLaunch,
    /// Channel content missing or malformed for a raised trigger.
    ProtocolMisuse,
    /// Caller-supplied input rejected before touching any file.
    Validation,
    /// Worker lifecycle misuse (already running, not running, ...).
    Process,
}

impl ErrorCategory {
    pub fn display_name(&self) -> &'static str {
        match self {
            ErrorCategory::NotFound => "Not found",
            ErrorCategory::CorruptStore => "Corrupt store",
            ErrorCategory::Io => "I/O",
            ErrorCategory::SubprocessLaunch => "Subprocess launch",
            ErrorCategory::ProtocolMisuse => "Protocol misuse",
            ErrorCategory::Validation => "Validation",
            ErrorCategory::Process => "Process",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Errors raised by the record store, the audit log and hunt management.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("hunt '{hunt}' not found")]
    HuntNotFound { hunt: String },

    #[error("treasure with ID {id} not found in hunt '{hunt}'")]
    RecordNotFound { hunt: String, id: i32 },

    #[error(
        "store for hunt '{hunt}' is corrupt: {complete_records} complete records followed by {trailing_bytes} stray bytes"
    )]
    Corrupt {
        hunt: String,
        complete_records: usize,
        trailing_bytes: usize,
    },

    #[error("invalid hunt id '{0}'")]
    InvalidHuntId(String),

    #[error("{field} is {actual} bytes, at most {max} fit in a record")]
    FieldTooLong {
        field: &'static str,
        max: usize,
        actual: usize,
    },

    #[error("{action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        StoreError::Io {
            action,
            path: path.into(),
            source,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            StoreError::HuntNotFound { .. } | StoreError::RecordNotFound { .. } => {
                ErrorCategory::NotFound
            }
            StoreError::Corrupt { .. } => ErrorCategory::CorruptStore,
            StoreError::InvalidHuntId(_) | StoreError::FieldTooLong { .. } => {
                ErrorCategory::Validation
            }
            StoreError::Io { .. } => ErrorCategory::Io,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.category() == ErrorCategory::NotFound
    }
}

/// Errors raised while passing parameters through the command channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("no pending {kind} request ({path} is missing)")]
    Missing { kind: &'static str, path: PathBuf },

    #[error("malformed {kind} request: {reason}")]
    Malformed { kind: &'static str, reason: String },

    #[error("channel I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ChannelError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ChannelError::Missing { .. } | ChannelError::Malformed { .. } => {
                ErrorCategory::ProtocolMisuse
            }
            ChannelError::Io { .. } => ErrorCategory::Io,
        }
    }
}

/// Errors raised while launching or relaying the score subprocess.
#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("failed to start score calculator {program}: {source}")]
    Launch {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("score calculator I/O: {0}")]
    Io(#[from] io::Error),

    #[error("score calculator exited with {status}: {output}")]
    Failed { status: ExitStatus, output: String },
}

impl ScoreError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ScoreError::Launch { .. } => ErrorCategory::SubprocessLaunch,
            ScoreError::Io(_) | ScoreError::Failed { .. } => ErrorCategory::Io,
        }
    }
}

/// Errors contained to a single monitor request.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Score(#[from] ScoreError),
    #[error("writing monitor output: {0}")]
    Output(#[from] io::Error),
}

impl MonitorError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            MonitorError::Store(err) => err.category(),
            MonitorError::Channel(err) => err.category(),
            MonitorError::Score(err) => err.category(),
            MonitorError::Output(_) => ErrorCategory::Io,
        }
    }
}

/// Errors surfaced by the hub to its operator. None of them change the
/// tracked worker state.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("monitor is already running (PID: {pid})")]
    AlreadyRunning { pid: u32 },

    #[error("no monitor running, start it first")]
    NotRunning,

    #[error("failed to start monitor {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("monitor exited before it was ready")]
    ExitedBeforeReady,

    #[error("failed to send {signal} to monitor (PID {pid}): {errno}")]
    Signal {
        signal: &'static str,
        pid: u32,
        errno: nix::errno::Errno,
    },

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("monitor I/O: {0}")]
    Io(#[from] io::Error),
}

impl SupervisorError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            SupervisorError::AlreadyRunning { .. }
            | SupervisorError::NotRunning
            | SupervisorError::ExitedBeforeReady => ErrorCategory::Process,
            SupervisorError::Spawn { .. } => ErrorCategory::SubprocessLaunch,
            SupervisorError::Signal { .. } | SupervisorError::Io(_) => ErrorCategory::Io,
            SupervisorError::Channel(err) => err.category(),
        }
    }
}

//! Command channel: typed requests passed alongside payload-less triggers.
//!
//! The hub must finish [`CommandChannel::submit`] before it raises the trigger
//! for that kind; the monitor has no way to wait for a write in progress. Each
//! kind holds at most one unconsumed request and a newer submit overwrites an
//! older one (last write wins).

use crate::{
    config::{
        CHANNEL_COMPUTE_SCORE_FILE, CHANNEL_LIST_TREASURES_FILE, CHANNEL_VIEW_TREASURE_FILE,
    },
    error::ChannelError,
    treasure::HuntId,
};
use dashmap::DashMap;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;
use std::sync::Arc;

/// The five request kinds, one per dispatch trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    ListHunts,
    ListTreasures,
    ViewTreasure,
    ComputeScore,
    Shutdown,
}

impl CommandKind {
    pub const ALL: [CommandKind; 5] = [
        CommandKind::ListHunts,
        CommandKind::ListTreasures,
        CommandKind::ViewTreasure,
        CommandKind::ComputeScore,
        CommandKind::Shutdown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::ListHunts => "list-hunts",
            CommandKind::ListTreasures => "list-treasures",
            CommandKind::ViewTreasure => "view-treasure",
            CommandKind::ComputeScore => "compute-score",
            CommandKind::Shutdown => "shutdown",
        }
    }

    /// Channel file carrying this kind's parameters, if it has any.
    pub fn channel_file(&self) -> Option<&'static str> {
        match self {
            CommandKind::ListTreasures => Some(CHANNEL_LIST_TREASURES_FILE),
            CommandKind::ViewTreasure => Some(CHANNEL_VIEW_TREASURE_FILE),
            CommandKind::ComputeScore => Some(CHANNEL_COMPUTE_SCORE_FILE),
            CommandKind::ListHunts | CommandKind::Shutdown => None,
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request with its typed parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandRequest {
    ListHunts,
    ListTreasures { hunt: HuntId },
    ViewTreasure { hunt: HuntId, id: i32 },
    ComputeScore { hunt: HuntId },
    Shutdown,
}

impl CommandRequest {
    pub fn kind(&self) -> CommandKind {
        match self {
            CommandRequest::ListHunts => CommandKind::ListHunts,
            CommandRequest::ListTreasures { .. } => CommandKind::ListTreasures,
            CommandRequest::ViewTreasure { .. } => CommandKind::ViewTreasure,
            CommandRequest::ComputeScore { .. } => CommandKind::ComputeScore,
            CommandRequest::Shutdown => CommandKind::Shutdown,
        }
    }

    /// Plain-text payload: one parameter per line, newline-terminated.
    pub fn to_payload(&self) -> String {
        match self {
            CommandRequest::ListHunts | CommandRequest::Shutdown => String::new(),
            CommandRequest::ListTreasures { hunt } | CommandRequest::ComputeScore { hunt } => {
                format!("{hunt}\n")
            }
            CommandRequest::ViewTreasure { hunt, id } => format!("{hunt}\n{id}\n"),
        }
    }

    pub fn from_payload(kind: CommandKind, payload: &str) -> Result<Self, ChannelError> {
        let malformed = |reason: String| ChannelError::Malformed {
            kind: kind.as_str(),
            reason,
        };
        // Hunt ids may carry spaces; only the line terminator is dropped.
        let mut lines = payload.lines();
        let mut hunt = || -> Result<HuntId, ChannelError> {
            let line = lines
                .next()
                .filter(|line| !line.is_empty())
                .ok_or_else(|| malformed("missing hunt id".to_string()))?;
            HuntId::new(line).map_err(|err| malformed(err.to_string()))
        };

        match kind {
            CommandKind::ListHunts => Ok(CommandRequest::ListHunts),
            CommandKind::Shutdown => Ok(CommandRequest::Shutdown),
            CommandKind::ListTreasures => Ok(CommandRequest::ListTreasures { hunt: hunt()? }),
            CommandKind::ComputeScore => Ok(CommandRequest::ComputeScore { hunt: hunt()? }),
            CommandKind::ViewTreasure => {
                let hunt = hunt()?;
                let raw = lines
                    .next()
                    .filter(|line| !line.is_empty())
                    .ok_or_else(|| malformed("missing treasure id".to_string()))?;
                let id = raw
                    .trim()
                    .parse::<i32>()
                    .map_err(|_| malformed(format!("treasure id '{raw}' is not an integer")))?;
                Ok(CommandRequest::ViewTreasure { hunt, id })
            }
        }
    }
}

/// Parameter hand-off between the hub and the monitor.
pub trait CommandChannel: Send + Sync {
    /// Store `request` as the pending request of its kind. Must be complete
    /// when this returns.
    fn submit(&self, request: &CommandRequest) -> Result<(), ChannelError>;

    /// Read the pending request of `kind`.
    fn take(&self, kind: CommandKind) -> Result<CommandRequest, ChannelError>;
}

/// Cross-process channel: one well-known text file per parameterised kind.
/// Files are read, never deleted.
#[derive(Debug, Clone)]
pub struct FileChannel {
    dir: PathBuf,
}

impl FileChannel {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, kind: CommandKind) -> Option<PathBuf> {
        kind.channel_file().map(|name| self.dir.join(name))
    }
}

impl CommandChannel for FileChannel {
    fn submit(&self, request: &CommandRequest) -> Result<(), ChannelError> {
        let Some(path) = self.path_for(request.kind()) else {
            return Ok(());
        };
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o644)
            .open(&path)
            .map_err(|source| ChannelError::Io {
                path: path.clone(),
                source,
            })?;
        file.write_all(request.to_payload().as_bytes())
            .and_then(|()| file.flush())
            .map_err(|source| ChannelError::Io { path, source })
        // file closes here, before the caller raises the trigger
    }

    fn take(&self, kind: CommandKind) -> Result<CommandRequest, ChannelError> {
        let Some(path) = self.path_for(kind) else {
            return CommandRequest::from_payload(kind, "");
        };
        let payload = match fs::read_to_string(&path) {
            Ok(payload) => payload,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(ChannelError::Missing {
                    kind: kind.as_str(),
                    path,
                })
            }
            Err(err) if err.kind() == ErrorKind::InvalidData => {
                return Err(ChannelError::Malformed {
                    kind: kind.as_str(),
                    reason: "payload is not valid UTF-8".to_string(),
                })
            }
            Err(source) => return Err(ChannelError::Io { path, source }),
        };
        CommandRequest::from_payload(kind, &payload)
    }
}

/// In-process channel with the same contract, for a hub and monitor living in
/// one process.
#[derive(Debug, Clone, Default)]
pub struct InProcessChannel {
    pending: Arc<DashMap<CommandKind, CommandRequest>>,
}

impl InProcessChannel {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CommandChannel for InProcessChannel {
    fn submit(&self, request: &CommandRequest) -> Result<(), ChannelError> {
        self.pending.insert(request.kind(), request.clone());
        Ok(())
    }

    fn take(&self, kind: CommandKind) -> Result<CommandRequest, ChannelError> {
        match kind {
            CommandKind::ListHunts => Ok(CommandRequest::ListHunts),
            CommandKind::Shutdown => Ok(CommandRequest::Shutdown),
            _ => self
                .pending
                .get(&kind)
                .map(|entry| entry.value().clone())
                .ok_or(ChannelError::Missing {
                    kind: kind.as_str(),
                    path: PathBuf::from("<in-process>"),
                }),
        }
    }
}

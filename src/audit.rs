//! Append-only audit log of a hunt plus the top-level alias pointing at it.

use crate::{error::StoreError, storage::HuntLayout};
use chrono::{DateTime, Local};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::os::unix::fs::OpenOptionsExt;

const TIMESTAMP_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

#[derive(Debug, Clone)]
pub struct AuditLog {
    layout: HuntLayout,
}

impl AuditLog {
    pub fn new(layout: HuntLayout) -> Self {
        Self { layout }
    }

    /// Append one event stamped with the current wall-clock time.
    pub fn append(&self, message: &str) -> Result<(), StoreError> {
        self.append_at(Local::now(), message)
    }

    pub fn append_at(&self, at: DateTime<Local>, message: &str) -> Result<(), StoreError> {
        let line = format_entry(at, message);
        let path = self.layout.log_path();
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .mode(0o644)
            .open(&path)
            .map_err(|err| StoreError::io("open audit log", &path, err))?;
        // One write per entry keeps concurrent appenders line-atomic.
        file.write_all(line.as_bytes())
            .map_err(|err| StoreError::io("write audit log", &path, err))
    }

    /// (Re)create `logged_hunt-<hunt>` so it points at this hunt's log. A stale
    /// alias left by a removed hunt is replaced.
    pub fn ensure_alias(&self) -> Result<(), StoreError> {
        let alias = self.layout.alias_path();
        self.remove_alias()?;
        std::os::unix::fs::symlink(self.layout.alias_target(), &alias)
            .map_err(|err| StoreError::io("create audit alias", &alias, err))
    }

    pub fn remove_alias(&self) -> Result<(), StoreError> {
        let alias = self.layout.alias_path();
        match fs::remove_file(&alias) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StoreError::io("remove audit alias", &alias, err)),
        }
    }
}

fn format_entry(at: DateTime<Local>, message: &str) -> String {
    let message = message.replace(['\n', '\r'], " ");
    format!("{}: {}\n", at.format(TIMESTAMP_FORMAT), message)
}

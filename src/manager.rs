//! Hunt management: the write side of the record store, with every change
//! recorded in the hunt's audit log.

use crate::{
    audit::AuditLog,
    error::StoreError,
    storage::{HuntLayout, RecordStore, ScanOutcome, StoreSize},
    treasure::{HuntId, TreasureRecord},
};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Everything `list` shows for one hunt.
#[derive(Debug, Clone)]
pub struct TreasureListing {
    pub hunt: HuntId,
    pub size: StoreSize,
    pub scan: ScanOutcome,
}

#[derive(Debug, Clone)]
pub struct HuntManager {
    root: PathBuf,
}

impl HuntManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn layout(&self, hunt: &HuntId) -> HuntLayout {
        HuntLayout::new(&self.root, hunt.clone())
    }

    /// Create the hunt on first use, append `record` and audit the addition.
    /// A failure to (re)create the alias is only a warning.
    pub fn add_treasure(&self, hunt: &HuntId, record: &TreasureRecord) -> Result<(), StoreError> {
        record.validate()?;
        let layout = self.layout(hunt);
        layout.materialize()?;

        let audit = AuditLog::new(layout.clone());
        if let Err(err) = audit.ensure_alias() {
            warn!(%hunt, error = %err, "failed to create audit alias");
        }

        RecordStore::new(layout).append(record)?;
        audit.append(&format!(
            "Added treasure ID {} by user {}",
            record.id, record.owner
        ))?;
        info!(%hunt, id = record.id, "treasure added");
        Ok(())
    }

    pub fn list_treasures(&self, hunt: &HuntId) -> Result<TreasureListing, StoreError> {
        let store = RecordStore::new(self.layout(hunt));
        let size = store.size()?;
        let scan = store.scan_outcome()?;
        Ok(TreasureListing {
            hunt: hunt.clone(),
            size,
            scan,
        })
    }

    pub fn view_treasure(&self, hunt: &HuntId, id: i32) -> Result<TreasureRecord, StoreError> {
        RecordStore::new(self.layout(hunt)).find_by_id(id)
    }

    /// Atomically drop every record with `id`. Returns how many went away.
    pub fn remove_treasure(&self, hunt: &HuntId, id: i32) -> Result<usize, StoreError> {
        let layout = self.layout(hunt);
        let removed = RecordStore::new(layout.clone()).delete_by_id(id)?;
        AuditLog::new(layout).append(&format!("Removed treasure ID {id}"))?;
        info!(%hunt, id, removed, "treasure removed");
        Ok(removed)
    }

    /// Delete the store and the log, the directory, then the alias.
    pub fn remove_hunt(&self, hunt: &HuntId) -> Result<(), StoreError> {
        let layout = self.layout(hunt);
        if !layout.exists() {
            return Err(StoreError::HuntNotFound {
                hunt: hunt.to_string(),
            });
        }

        remove_if_present(&layout.store_path(), "delete store")?;
        remove_if_present(&layout.log_path(), "delete audit log")?;
        let dir = layout.hunt_dir();
        fs::remove_dir(&dir).map_err(|err| StoreError::io("remove hunt directory", &dir, err))?;
        AuditLog::new(layout).remove_alias()?;
        info!(%hunt, "hunt removed");
        Ok(())
    }
}

fn remove_if_present(path: &Path, action: &'static str) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(StoreError::io(action, path, err)),
    }
}

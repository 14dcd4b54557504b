use crate::{
    config::{AUDIT_ALIAS_PREFIX, AUDIT_LOG_FILE_NAME, STORE_FILE_NAME},
    error::StoreError,
    treasure::{HuntId, TreasureRecord, RECORD_WIDTH},
};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, ErrorKind, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Every path of a hunt is derived from the root and the hunt id alone, so
/// removing and recreating a hunt lands on exactly the same names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HuntLayout {
    root: PathBuf,
    hunt: HuntId,
}

impl HuntLayout {
    pub fn new(root: impl Into<PathBuf>, hunt: HuntId) -> Self {
        Self {
            root: root.into(),
            hunt,
        }
    }

    pub fn hunt_dir(&self) -> PathBuf {
        self.root.join(self.hunt.as_str())
    }

    pub fn store_path(&self) -> PathBuf {
        self.hunt_dir().join(STORE_FILE_NAME)
    }

    pub fn log_path(&self) -> PathBuf {
        self.hunt_dir().join(AUDIT_LOG_FILE_NAME)
    }

    pub fn alias_path(&self) -> PathBuf {
        self.root
            .join(format!("{AUDIT_ALIAS_PREFIX}{}", self.hunt.as_str()))
    }

    /// Alias target, relative to the root so the alias survives moving it.
    pub fn alias_target(&self) -> PathBuf {
        PathBuf::from(self.hunt.as_str()).join(AUDIT_LOG_FILE_NAME)
    }

    pub fn exists(&self) -> bool {
        self.hunt_dir().is_dir()
    }

    /// Create the hunt directory if needed.
    pub fn materialize(&self) -> Result<(), StoreError> {
        let dir = self.hunt_dir();
        match fs::create_dir(&dir) {
            Ok(()) => {
                debug!(hunt = %self.hunt, "created hunt directory");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists && dir.is_dir() => Ok(()),
            Err(err) => Err(StoreError::io("create hunt directory", dir, err)),
        }
    }
}

/// Trailing-bytes report for a store whose length is not a record multiple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Corruption {
    pub complete_records: usize,
    pub trailing_bytes: usize,
}

/// A scan collected to the end: every complete record plus the corruption
/// flag, if the scan stopped on a short tail.
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    pub records: Vec<TreasureRecord>,
    pub corruption: Option<Corruption>,
}

/// Record count derived from the store length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreSize {
    pub bytes: u64,
    pub records: usize,
    pub trailing_bytes: usize,
}

impl StoreSize {
    fn from_len(bytes: u64) -> Self {
        let width = RECORD_WIDTH as u64;
        Self {
            bytes,
            records: (bytes / width) as usize,
            trailing_bytes: (bytes % width) as usize,
        }
    }
}

/// Summary line for one hunt directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HuntSummary {
    pub hunt: HuntId,
    pub size: StoreSize,
}

/// Binary record store of one hunt.
#[derive(Debug, Clone)]
pub struct RecordStore {
    layout: HuntLayout,
}

impl RecordStore {
    pub fn new(layout: HuntLayout) -> Self {
        Self { layout }
    }

    pub fn open(root: impl Into<PathBuf>, hunt: HuntId) -> Self {
        Self::new(HuntLayout::new(root, hunt))
    }

    pub fn layout(&self) -> &HuntLayout {
        &self.layout
    }

    fn hunt_name(&self) -> String {
        self.layout.hunt.to_string()
    }

    /// Append one record. The hunt directory must already exist.
    pub fn append(&self, record: &TreasureRecord) -> Result<(), StoreError> {
        let encoded = record.encode()?;
        let path = self.layout.store_path();
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .mode(0o644)
            .open(&path)
            .map_err(|err| self.missing_hunt_or(err, "open store", &path))?;

        let written = file
            .write(&encoded)
            .map_err(|err| StoreError::io("append record to", &path, err))?;
        if written != RECORD_WIDTH {
            return Err(StoreError::io(
                "append record to",
                &path,
                io::Error::new(
                    ErrorKind::WriteZero,
                    format!("short write: {written} of {RECORD_WIDTH} bytes"),
                ),
            ));
        }
        debug!(hunt = %self.layout.hunt, id = record.id, "appended record");
        Ok(())
    }

    /// Lazy scan over every record. Each call opens a fresh reader.
    pub fn scan_all(&self) -> StoreScan {
        match self.open_reader() {
            Ok(reader) => StoreScan {
                hunt: self.hunt_name(),
                reader,
                index: 0,
                pending_error: None,
            },
            Err(err) => StoreScan {
                hunt: self.hunt_name(),
                reader: None,
                index: 0,
                pending_error: Some(err),
            },
        }
    }

    /// Collect a scan, keeping complete records ahead of a short tail.
    pub fn scan_outcome(&self) -> Result<ScanOutcome, StoreError> {
        let mut outcome = ScanOutcome::default();
        for item in self.scan_all() {
            match item {
                Ok((_, record)) => outcome.records.push(record),
                Err(StoreError::Corrupt {
                    complete_records,
                    trailing_bytes,
                    ..
                }) => {
                    outcome.corruption = Some(Corruption {
                        complete_records,
                        trailing_bytes,
                    });
                }
                Err(err) => return Err(err),
            }
        }
        Ok(outcome)
    }

    /// First record carrying `id`.
    pub fn find_by_id(&self, id: i32) -> Result<TreasureRecord, StoreError> {
        for item in self.scan_all() {
            let (_, record) = item?;
            if record.id == id {
                return Ok(record);
            }
        }
        Err(StoreError::RecordNotFound {
            hunt: self.hunt_name(),
            id,
        })
    }

    /// Remove every record carrying `id` and publish the rewritten store in a
    /// single rename. Returns how many records were removed.
    pub fn delete_by_id(&self, id: i32) -> Result<usize, StoreError> {
        self.stage_delete(id)?.publish()
    }

    /// Write the surviving records to a temp file next to the store without
    /// touching the store itself.
    pub fn stage_delete(&self, id: i32) -> Result<StagedRewrite, StoreError> {
        let dir = self.layout.hunt_dir();
        let target = self.layout.store_path();
        let temp = tempfile::Builder::new()
            .prefix(".treasures.")
            .suffix(".tmp")
            .tempfile_in(&dir)
            .map_err(|err| self.missing_hunt_or(err, "create temp store in", &dir))?;

        let temp_path = temp.path().to_path_buf();
        let mut writer = BufWriter::new(temp);
        let mut removed = 0usize;
        let mut kept = 0usize;
        // Survivors are copied as stored; decoding their text is lossy.
        let mut scan = self.scan_all();
        while let Some(item) = scan.next_raw() {
            let (_, raw) = item?;
            if TreasureRecord::raw_id(&raw) == id {
                removed += 1;
                continue;
            }
            writer
                .write_all(&raw)
                .map_err(|err| StoreError::io("write temp store", &temp_path, err))?;
            kept += 1;
        }

        if removed == 0 {
            return Err(StoreError::RecordNotFound {
                hunt: self.hunt_name(),
                id,
            });
        }

        let temp = writer
            .into_inner()
            .map_err(|err| StoreError::io("flush temp store", &temp_path, err.into_error()))?;
        temp.as_file()
            .sync_all()
            .map_err(|err| StoreError::io("sync temp store", &temp_path, err))?;
        if let Ok(meta) = fs::metadata(&target) {
            fs::set_permissions(&temp_path, meta.permissions())
                .map_err(|err| StoreError::io("copy permissions to", &temp_path, err))?;
        }

        debug!(hunt = %self.layout.hunt, id, removed, kept, "staged store rewrite");
        Ok(StagedRewrite {
            temp,
            target,
            dir,
            removed,
        })
    }

    /// Size of the store file, without reading any record.
    pub fn size(&self) -> Result<StoreSize, StoreError> {
        let path = self.layout.store_path();
        match fs::metadata(&path) {
            Ok(meta) => Ok(StoreSize::from_len(meta.len())),
            Err(err) if err.kind() == ErrorKind::NotFound && self.layout.exists() => {
                Ok(StoreSize::default())
            }
            Err(err) => Err(self.missing_hunt_or(err, "stat store", &path)),
        }
    }

    fn open_reader(&self) -> Result<Option<BufReader<File>>, StoreError> {
        let path = self.layout.store_path();
        match File::open(&path) {
            Ok(file) => Ok(Some(BufReader::new(file))),
            // A hunt that exists but never received a record is simply empty.
            Err(err) if err.kind() == ErrorKind::NotFound && self.layout.exists() => Ok(None),
            Err(err) => Err(self.missing_hunt_or(err, "open store", &path)),
        }
    }

    fn missing_hunt_or(&self, err: io::Error, action: &'static str, path: &Path) -> StoreError {
        if err.kind() == ErrorKind::NotFound && !self.layout.exists() {
            StoreError::HuntNotFound {
                hunt: self.hunt_name(),
            }
        } else {
            StoreError::io(action, path, err)
        }
    }
}

/// A fully written, fsynced replacement store waiting to be published.
/// Dropping it without publishing removes the temp file and leaves the store
/// untouched.
#[derive(Debug)]
pub struct StagedRewrite {
    temp: NamedTempFile,
    target: PathBuf,
    dir: PathBuf,
    removed: usize,
}

impl StagedRewrite {
    pub fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    pub fn removed(&self) -> usize {
        self.removed
    }

    /// Rename over the store. The old store stays resolvable until the new one
    /// replaces it in the same step.
    pub fn publish(self) -> Result<usize, StoreError> {
        let target = self.target;
        self.temp
            .persist(&target)
            .map_err(|err| StoreError::io("publish rewritten store to", &target, err.error))?;
        File::open(&self.dir)
            .and_then(|dir| dir.sync_all())
            .map_err(|err| StoreError::io("sync hunt directory", &self.dir, err))?;
        Ok(self.removed)
    }
}

/// Iterator returned by [`RecordStore::scan_all`].
///
/// Yields `(index, record)` pairs. A short tail yields one
/// [`StoreError::Corrupt`] and ends the scan.
#[derive(Debug)]
pub struct StoreScan {
    hunt: String,
    reader: Option<BufReader<File>>,
    index: usize,
    pending_error: Option<StoreError>,
}

impl StoreScan {
    fn fill(&mut self, buf: &mut [u8; RECORD_WIDTH]) -> io::Result<usize> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(0);
        };
        let mut filled = 0;
        while filled < RECORD_WIDTH {
            match reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(filled)
    }
}

impl StoreScan {
    /// Next record as its stored bytes, with the same corruption handling as
    /// the decoding iterator.
    pub fn next_raw(&mut self) -> Option<Result<(usize, [u8; RECORD_WIDTH]), StoreError>> {
        if let Some(err) = self.pending_error.take() {
            self.reader = None;
            return Some(Err(err));
        }
        self.reader.as_ref()?;

        let mut buf = [0u8; RECORD_WIDTH];
        match self.fill(&mut buf) {
            Ok(0) => {
                self.reader = None;
                None
            }
            Ok(RECORD_WIDTH) => {
                let index = self.index;
                self.index += 1;
                Some(Ok((index, buf)))
            }
            Ok(short) => {
                self.reader = None;
                Some(Err(StoreError::Corrupt {
                    hunt: self.hunt.clone(),
                    complete_records: self.index,
                    trailing_bytes: short,
                }))
            }
            Err(err) => {
                self.reader = None;
                Some(Err(StoreError::io(
                    "read store of hunt",
                    self.hunt.clone(),
                    err,
                )))
            }
        }
    }
}

impl Iterator for StoreScan {
    type Item = Result<(usize, TreasureRecord), StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_raw()
            .map(|item| item.map(|(index, raw)| (index, TreasureRecord::decode(&raw))))
    }
}

/// Every hunt directory under `root` (dot-directories skipped), sorted by
/// name, with the record count derived from the store length.
pub fn list_hunts(root: &Path) -> Result<Vec<HuntSummary>, StoreError> {
    let entries = fs::read_dir(root).map_err(|err| StoreError::io("read hunt root", root, err))?;
    let mut hunts = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| StoreError::io("read hunt root", root, err))?;
        let is_dir = entry.file_type().map(|ty| ty.is_dir()).unwrap_or(false);
        if !is_dir {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        let Ok(hunt) = HuntId::new(name) else {
            continue;
        };
        let size = RecordStore::open(root, hunt.clone()).size()?;
        hunts.push(HuntSummary { hunt, size });
    }
    hunts.sort_by(|a, b| a.hunt.cmp(&b.hunt));
    Ok(hunts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn record(id: i32, value: i32) -> TreasureRecord {
        TreasureRecord::new(id, format!("user{id}"), 1.5, -2.5, format!("clue {id}"), value)
            .expect("valid record")
    }

    fn store_in(dir: &TempDir, hunt: &str) -> RecordStore {
        let layout = HuntLayout::new(dir.path(), HuntId::new(hunt).expect("hunt id"));
        layout.materialize().expect("materialize");
        RecordStore::new(layout)
    }

    fn ids(store: &RecordStore) -> Vec<i32> {
        store
            .scan_all()
            .map(|item| item.expect("scan").1.id)
            .collect()
    }

    #[test]
    fn append_then_scan_in_order() {
        let dir = TempDir::new().expect("temp dir");
        let store = store_in(&dir, "h1");
        for id in [3, 1, 2] {
            store.append(&record(id, id * 10)).expect("append");
        }

        let scanned: Vec<(usize, i32)> = store
            .scan_all()
            .map(|item| {
                let (index, record) = item.expect("scan");
                (index, record.id)
            })
            .collect();
        assert_eq!(scanned, vec![(0, 3), (1, 1), (2, 2)]);

        let size = store.size().expect("size");
        assert_eq!(size.records, 3);
        assert_eq!(size.bytes, 3 * RECORD_WIDTH as u64);
        assert_eq!(size.trailing_bytes, 0);
    }

    #[test]
    fn scan_is_restartable() {
        let dir = TempDir::new().expect("temp dir");
        let store = store_in(&dir, "h1");
        store.append(&record(1, 1)).expect("append");
        assert_eq!(ids(&store), vec![1]);
        store.append(&record(2, 2)).expect("append");
        assert_eq!(ids(&store), vec![1, 2]);
    }

    #[test]
    fn empty_hunt_scans_to_nothing() {
        let dir = TempDir::new().expect("temp dir");
        let store = store_in(&dir, "fresh");
        assert!(store.scan_all().next().is_none());
        assert_eq!(store.size().expect("size"), StoreSize::default());
    }

    #[test]
    fn missing_hunt_is_not_found() {
        let dir = TempDir::new().expect("temp dir");
        let store = RecordStore::open(dir.path(), HuntId::new("ghost").expect("id"));
        let first = store.scan_all().next().expect("one item");
        assert!(matches!(first, Err(StoreError::HuntNotFound { .. })));
        assert!(matches!(
            store.append(&record(1, 1)),
            Err(StoreError::HuntNotFound { .. })
        ));
        assert!(store.find_by_id(1).expect_err("missing").is_not_found());
    }

    #[test]
    fn find_by_id_returns_first_match() {
        let dir = TempDir::new().expect("temp dir");
        let store = store_in(&dir, "h1");
        store.append(&record(5, 1)).expect("append");
        store.append(&record(5, 2)).expect("append");

        assert_eq!(store.find_by_id(5).expect("found").value, 1);
        assert!(matches!(
            store.find_by_id(6),
            Err(StoreError::RecordNotFound { id: 6, .. })
        ));
    }

    #[test]
    fn delete_removes_target_and_keeps_order() {
        let dir = TempDir::new().expect("temp dir");
        let store = store_in(&dir, "h1");
        for id in [1, 2, 3, 2, 4] {
            store.append(&record(id, id)).expect("append");
        }

        assert_eq!(store.delete_by_id(2).expect("delete"), 2);
        assert_eq!(ids(&store), vec![1, 3, 4]);

        let leftovers: Vec<_> = fs::read_dir(store.layout().hunt_dir())
            .expect("read dir")
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "temp store must not linger");
    }

    #[test]
    fn delete_missing_id_leaves_store_byte_identical() {
        let dir = TempDir::new().expect("temp dir");
        let store = store_in(&dir, "h1");
        store.append(&record(1, 10)).expect("append");
        store.append(&record(2, 20)).expect("append");
        let before = fs::read(store.layout().store_path()).expect("read");

        let err = store.delete_by_id(99).expect_err("not found");
        assert!(matches!(err, StoreError::RecordNotFound { id: 99, .. }));

        let after = fs::read(store.layout().store_path()).expect("read");
        assert_eq!(before, after);
    }

    #[test]
    fn delete_copies_surviving_records_byte_for_byte() {
        use crate::treasure::OWNER_LEN;

        let dir = TempDir::new().expect("temp dir");
        let store = store_in(&dir, "h1");
        let raw_with_owner = |id: i32, owner: &[u8]| {
            let mut raw = record(id, id).encode().expect("encode");
            let slot = &mut raw[4..4 + OWNER_LEN];
            slot.fill(0);
            slot[..owner.len()].copy_from_slice(owner);
            raw
        };
        // Latin-1 owner with stray bytes after its terminator.
        let mut latin = raw_with_owner(1, b"Jos\xe9");
        latin[4 + 10] = b'A';
        let plain = raw_with_owner(2, b"bob");
        let invalid = raw_with_owner(3, &[0xe9; OWNER_LEN]);
        let path = store.layout().store_path();
        fs::write(&path, [latin, plain, invalid].concat()).expect("seed store");

        assert_eq!(store.delete_by_id(2).expect("delete"), 1);

        assert_eq!(fs::read(&path).expect("read"), [latin, invalid].concat());
    }

    #[test]
    fn unpublished_rewrite_leaves_old_store_resolvable() {
        let dir = TempDir::new().expect("temp dir");
        let store = store_in(&dir, "h1");
        for id in [1, 2, 3] {
            store.append(&record(id, id)).expect("append");
        }
        let before = fs::read(store.layout().store_path()).expect("read");

        let staged = store.stage_delete(2).expect("stage");
        assert!(staged.temp_path().exists());
        assert_eq!(
            fs::metadata(staged.temp_path()).expect("temp meta").len(),
            2 * RECORD_WIDTH as u64
        );
        // Crash point: the staged file is complete but not yet published.
        assert_eq!(fs::read(store.layout().store_path()).expect("read"), before);
        assert_eq!(ids(&store), vec![1, 2, 3]);

        let temp_path = staged.temp_path().to_path_buf();
        drop(staged);
        assert!(!temp_path.exists());
        assert_eq!(fs::read(store.layout().store_path()).expect("read"), before);
    }

    #[test]
    fn publish_installs_rewritten_store() {
        let dir = TempDir::new().expect("temp dir");
        let store = store_in(&dir, "h1");
        for id in [1, 2, 3] {
            store.append(&record(id, id)).expect("append");
        }
        let staged = store.stage_delete(1).expect("stage");
        assert_eq!(staged.removed(), 1);
        assert_eq!(staged.publish().expect("publish"), 1);
        assert_eq!(ids(&store), vec![2, 3]);
    }

    #[test]
    fn truncated_store_keeps_complete_records_and_flags_corruption() {
        let dir = TempDir::new().expect("temp dir");
        let store = store_in(&dir, "h1");
        for id in [1, 2, 3] {
            store.append(&record(id, id)).expect("append");
        }
        let path = store.layout().store_path();
        let file = OpenOptions::new().write(true).open(&path).expect("open");
        file.set_len((2 * RECORD_WIDTH + 17) as u64).expect("truncate");

        let items: Vec<_> = store.scan_all().collect();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_ref().expect("first").1.id, 1);
        assert_eq!(items[1].as_ref().expect("second").1, record(2, 2));
        assert!(matches!(
            items[2],
            Err(StoreError::Corrupt {
                complete_records: 2,
                trailing_bytes: 17,
                ..
            })
        ));

        let outcome = store.scan_outcome().expect("outcome");
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(
            outcome.corruption,
            Some(Corruption {
                complete_records: 2,
                trailing_bytes: 17
            })
        );

        let size = store.size().expect("size");
        assert_eq!((size.records, size.trailing_bytes), (2, 17));
    }

    #[test]
    fn corrupt_store_is_not_rewritten() {
        let dir = TempDir::new().expect("temp dir");
        let store = store_in(&dir, "h1");
        store.append(&record(1, 1)).expect("append");
        let path = store.layout().store_path();
        OpenOptions::new()
            .append(true)
            .open(&path)
            .expect("open")
            .write_all(&[0u8; 5])
            .expect("write tail");
        let before = fs::read(&path).expect("read");

        assert!(matches!(
            store.delete_by_id(1),
            Err(StoreError::Corrupt { .. })
        ));
        assert_eq!(fs::read(&path).expect("read"), before);
    }

    #[test]
    fn list_hunts_reports_counts_and_skips_dot_dirs() {
        let dir = TempDir::new().expect("temp dir");
        let beta = store_in(&dir, "beta");
        beta.append(&record(1, 1)).expect("append");
        beta.append(&record(2, 1)).expect("append");
        store_in(&dir, "alpha");
        fs::create_dir(dir.path().join(".cache")).expect("dot dir");
        fs::write(dir.path().join("cmd_hunt.txt"), "beta\n").expect("plain file");

        let hunts = list_hunts(dir.path()).expect("list");
        let summary: Vec<(String, usize)> = hunts
            .iter()
            .map(|h| (h.hunt.to_string(), h.size.records))
            .collect();
        assert_eq!(
            summary,
            vec![("alpha".to_string(), 0), ("beta".to_string(), 2)]
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn delete_never_leaves_target_and_keeps_the_rest(
            ids_in in proptest::collection::vec(0i32..6, 1..24),
            pick in any::<prop::sample::Index>(),
        ) {
            let dir = TempDir::new().expect("temp dir");
            let store = store_in(&dir, "prop");
            for (n, id) in ids_in.iter().enumerate() {
                store.append(&record(*id, n as i32)).expect("append");
            }
            let target = ids_in[pick.index(ids_in.len())];

            store.delete_by_id(target).expect("delete");

            let remaining: Vec<(i32, i32)> = store
                .scan_all()
                .map(|item| {
                    let (_, r) = item.expect("scan");
                    (r.id, r.value)
                })
                .collect();
            let expected: Vec<(i32, i32)> = ids_in
                .iter()
                .enumerate()
                .filter(|(_, id)| **id != target)
                .map(|(n, id)| (*id, n as i32))
                .collect();
            prop_assert_eq!(remaining, expected);
        }
    }
}

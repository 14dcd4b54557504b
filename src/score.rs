//! Score aggregation and the one-shot subprocess that reports it.

use crate::{
    config::HuntConfig,
    error::{ScoreError, StoreError},
    storage::{Corruption, RecordStore},
    treasure::HuntId,
};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Sum of `value` over every complete record of a hunt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreSummary {
    pub hunt: HuntId,
    pub total: i64,
    pub records: usize,
    pub corruption: Option<Corruption>,
}

impl fmt::Display for ScoreSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Total score for hunt '{}': {}", self.hunt, self.total)
    }
}

/// Scan the hunt's store independently and add up the values. A short tail
/// stops the scan; the partial sum is kept and the corruption recorded.
pub fn compute_score(root: &Path, hunt: &HuntId) -> Result<ScoreSummary, StoreError> {
    let store = RecordStore::open(root, hunt.clone());
    let mut summary = ScoreSummary {
        hunt: hunt.clone(),
        total: 0,
        records: 0,
        corruption: None,
    };
    for item in store.scan_all() {
        match item {
            Ok((_, record)) => {
                summary.total += i64::from(record.value);
                summary.records += 1;
            }
            Err(StoreError::Corrupt {
                complete_records,
                trailing_bytes,
                ..
            }) => {
                summary.corruption = Some(Corruption {
                    complete_records,
                    trailing_bytes,
                });
            }
            Err(err) => return Err(err),
        }
    }
    Ok(summary)
}

/// Output relayed back from one score subprocess run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreReport {
    pub output: String,
    pub status: ExitStatus,
}

/// Launches `<program> <leading args..> <hunt>` and relays its stdout.
#[derive(Debug, Clone)]
pub struct ScoreLauncher {
    program: PathBuf,
    leading_args: Vec<OsString>,
    current_dir: Option<PathBuf>,
}

impl ScoreLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            current_dir: None,
        }
    }

    /// `thunt --root <root> score`, using the running binary unless another
    /// program is configured.
    pub fn for_binary(program: impl Into<PathBuf>, root: &Path) -> Self {
        Self::new(program).with_args([
            OsString::from("--root"),
            root.as_os_str().to_owned(),
            OsString::from("score"),
        ])
    }

    /// A configured `score_program` takes just the hunt id and runs inside the
    /// root; otherwise the running binary's `score` subcommand is used.
    pub fn from_config(config: &HuntConfig) -> Result<Self, ScoreError> {
        match &config.score_program {
            Some(program) => Ok(Self::new(program).with_current_dir(&config.root)),
            None => Ok(Self::for_binary(std::env::current_exe()?, &config.root)),
        }
    }

    pub fn with_args<I>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = OsString>,
    {
        self.leading_args.extend(args);
        self
    }

    pub fn with_current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Run once for `hunt`. The pipe is drained to EOF before the exit status
    /// is collected. A failed spawn is reported and not retried.
    pub async fn run(&self, hunt: &HuntId) -> Result<ScoreReport, ScoreError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.leading_args)
            .arg(hunt.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| ScoreError::Launch {
            program: self.program.clone(),
            source,
        })?;
        debug!(pid = ?child.id(), %hunt, "score calculator started");

        let mut output = Vec::new();
        if let Some(mut stdout) = child.stdout.take() {
            let mut buffer = [0u8; 4096];
            loop {
                let read = stdout.read(&mut buffer).await?;
                if read == 0 {
                    break;
                }
                output.extend_from_slice(&buffer[..read]);
            }
        }

        let status = child.wait().await?;
        let output = String::from_utf8_lossy(&output).into_owned();
        if !status.success() {
            warn!(%hunt, %status, "score calculator failed");
            return Err(ScoreError::Failed { status, output });
        }
        Ok(ScoreReport { output, status })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{storage::HuntLayout, treasure::TreasureRecord};
    use std::fs::{self, OpenOptions};
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn hunt_with_values(dir: &TempDir, name: &str, values: &[i32]) -> HuntId {
        let hunt = HuntId::new(name).expect("hunt id");
        let layout = HuntLayout::new(dir.path(), hunt.clone());
        layout.materialize().expect("materialize");
        let store = RecordStore::new(layout);
        for (n, value) in values.iter().enumerate() {
            let record =
                TreasureRecord::new(n as i32, "ana", 0.0, 0.0, "", *value).expect("record");
            store.append(&record).expect("append");
        }
        hunt
    }

    fn script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
        let mut perms = fs::metadata(&path).expect("metadata").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).expect("chmod");
        path
    }

    #[test]
    fn sums_values_across_records() {
        let dir = TempDir::new().expect("temp dir");
        let hunt = hunt_with_values(&dir, "h1", &[10, -3, 7]);
        let summary = compute_score(dir.path(), &hunt).expect("score");
        assert_eq!(summary.total, 14);
        assert_eq!(summary.records, 3);
        assert_eq!(summary.to_string(), "Total score for hunt 'h1': 14");
    }

    #[test]
    fn empty_store_scores_zero() {
        let dir = TempDir::new().expect("temp dir");
        let hunt = hunt_with_values(&dir, "empty", &[]);
        let summary = compute_score(dir.path(), &hunt).expect("score");
        assert_eq!(summary.total, 0);
        assert!(summary.corruption.is_none());
    }

    #[test]
    fn large_values_do_not_overflow() {
        let dir = TempDir::new().expect("temp dir");
        let hunt = hunt_with_values(&dir, "big", &[i32::MAX, i32::MAX]);
        let summary = compute_score(dir.path(), &hunt).expect("score");
        assert_eq!(summary.total, 2 * i64::from(i32::MAX));
    }

    #[test]
    fn short_tail_keeps_partial_sum() {
        let dir = TempDir::new().expect("temp dir");
        let hunt = hunt_with_values(&dir, "torn", &[5, 6]);
        let path = dir.path().join("torn/treasures.dat");
        let file = OpenOptions::new().write(true).open(&path).expect("open");
        file.set_len(
            (crate::treasure::RECORD_WIDTH + 3) as u64,
        )
        .expect("truncate");

        let summary = compute_score(dir.path(), &hunt).expect("score");
        assert_eq!(summary.total, 5);
        assert_eq!(
            summary.corruption,
            Some(Corruption {
                complete_records: 1,
                trailing_bytes: 3
            })
        );
    }

    #[test]
    fn missing_hunt_is_an_error() {
        let dir = TempDir::new().expect("temp dir");
        let hunt = HuntId::new("ghost").expect("hunt id");
        assert!(compute_score(dir.path(), &hunt)
            .expect_err("missing")
            .is_not_found());
    }

    #[tokio::test]
    async fn launcher_relays_subprocess_output() {
        let dir = TempDir::new().expect("temp dir");
        let program = script(&dir, "fake-score", "printf 'Total score for hunt %s: ' \"$1\"\necho 14");
        let hunt = HuntId::new("h1").expect("hunt id");

        let report = ScoreLauncher::new(&program).run(&hunt).await.expect("run");
        assert_eq!(report.output, "Total score for hunt h1: 14\n");
        assert!(report.status.success());
    }

    #[tokio::test]
    async fn launcher_drains_output_larger_than_a_pipe_buffer() {
        let dir = TempDir::new().expect("temp dir");
        let program = script(&dir, "chatty", "head -c 200000 /dev/zero | tr '\\0' 'x'");
        let hunt = HuntId::new("h1").expect("hunt id");

        let report = ScoreLauncher::new(&program).run(&hunt).await.expect("run");
        assert_eq!(report.output.len(), 200_000);
    }

    #[tokio::test]
    async fn launcher_reports_missing_program() {
        let hunt = HuntId::new("h1").expect("hunt id");
        let err = ScoreLauncher::new("/definitely/not/here/score")
            .run(&hunt)
            .await
            .expect_err("spawn fails");
        assert_eq!(err.category(), crate::error::ErrorCategory::SubprocessLaunch);
    }

    #[tokio::test]
    async fn launcher_reports_failed_exit() {
        let dir = TempDir::new().expect("temp dir");
        let program = script(&dir, "broken", "echo nope; exit 3");
        let hunt = HuntId::new("h1").expect("hunt id");

        match ScoreLauncher::new(&program).run(&hunt).await {
            Err(ScoreError::Failed { status, output }) => {
                assert_eq!(status.code(), Some(3));
                assert_eq!(output, "nope\n");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}

//! The worker: a single loop that turns dispatch triggers into store reads.
//!
//! Signal listeners only mark a kind as pending (see [`crate::signal`]). This
//! loop pops one kind at a time, reads the request parameters from the
//! [`CommandChannel`] and writes `[Monitor]`-prefixed lines to its output.
//! A failing request is reported and the loop goes back to waiting; only the
//! shutdown trigger ends it.

use crate::{
    channel::{CommandChannel, CommandKind, CommandRequest, FileChannel},
    config::{HuntConfig, MONITOR_READY_MARKER},
    error::{MonitorError, StoreError},
    platform,
    score::ScoreLauncher,
    signal::{install_listeners, signal_name, TriggerQueue},
    storage::{list_hunts, Corruption, RecordStore},
    treasure::{HuntId, TreasureRecord},
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const PREFIX: &str = "[Monitor]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Handling(CommandKind),
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

pub struct Monitor<C, W> {
    root: PathBuf,
    channel: C,
    queue: Arc<TriggerQueue>,
    launcher: ScoreLauncher,
    grace: Duration,
    out: W,
    state: MonitorState,
}

impl<C, W> Monitor<C, W>
where
    C: CommandChannel,
    W: Write + Send,
{
    pub fn new(
        root: impl Into<PathBuf>,
        channel: C,
        queue: Arc<TriggerQueue>,
        launcher: ScoreLauncher,
        out: W,
    ) -> Self {
        Self {
            root: root.into(),
            channel,
            queue,
            launcher,
            grace: crate::config::SHUTDOWN_GRACE_DEFAULT,
            out,
            state: MonitorState::Idle,
        }
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    /// Print the ready banner. Call only after the listeners are installed;
    /// the hub treats this line as permission to send triggers.
    pub fn announce_ready(&mut self) -> io::Result<()> {
        writeln!(
            self.out,
            "{MONITOR_READY_MARKER} (PID: {}). Waiting for signals...",
            platform::current_pid()
        )?;
        self.out.flush()
    }

    /// Process triggers until a shutdown trigger has been handled.
    pub async fn run(&mut self) -> Result<(), MonitorError> {
        loop {
            self.state = MonitorState::Idle;
            let kind = self.queue.next().await;
            self.state = MonitorState::Handling(kind);
            debug!(%kind, "handling trigger");

            let flow = match self.handle(kind).await {
                Ok(flow) => flow,
                Err(err) => {
                    warn!(%kind, category = %err.category(), error = %err, "request failed");
                    writeln!(self.out, "{PREFIX} {kind} failed: {err}")?;
                    Flow::Continue
                }
            };
            self.out.flush()?;

            if flow == Flow::Exit {
                self.state = MonitorState::Stopped;
                info!("monitor stopped");
                return Ok(());
            }
        }
    }

    async fn handle(&mut self, kind: CommandKind) -> Result<Flow, MonitorError> {
        writeln!(self.out, "{PREFIX} {} -> {kind}", signal_name(kind))?;
        let request = self.channel.take(kind)?;
        match request {
            CommandRequest::ListHunts => self.list_hunts()?,
            CommandRequest::ListTreasures { hunt } => self.list_treasures(&hunt)?,
            CommandRequest::ViewTreasure { hunt, id } => self.view_treasure(&hunt, id)?,
            CommandRequest::ComputeScore { hunt } => self.compute_score(&hunt).await?,
            CommandRequest::Shutdown => {
                self.shutdown().await?;
                return Ok(Flow::Exit);
            }
        }
        Ok(Flow::Continue)
    }

    fn list_hunts(&mut self) -> Result<(), MonitorError> {
        let hunts = list_hunts(&self.root)?;
        if hunts.is_empty() {
            writeln!(self.out, "{PREFIX} No hunts found.")?;
        }
        for summary in hunts {
            writeln!(
                self.out,
                "{PREFIX} Hunt: {} | Treasures: {}",
                summary.hunt, summary.size.records
            )?;
        }
        Ok(())
    }

    fn list_treasures(&mut self, hunt: &HuntId) -> Result<(), MonitorError> {
        let store = RecordStore::open(&self.root, hunt.clone());
        let outcome = store.scan_outcome()?;

        writeln!(self.out, "{PREFIX} Treasures in Hunt '{hunt}':")?;
        for record in &outcome.records {
            write_record_block(&mut self.out, record)?;
        }
        if outcome.records.is_empty() && outcome.corruption.is_none() {
            writeln!(self.out, "{PREFIX} Hunt '{hunt}' has no treasures.")?;
        }
        if let Some(corruption) = outcome.corruption {
            self.report_corruption(hunt, corruption)?;
        }
        Ok(())
    }

    fn view_treasure(&mut self, hunt: &HuntId, id: i32) -> Result<(), MonitorError> {
        let store = RecordStore::open(&self.root, hunt.clone());
        match store.find_by_id(id) {
            Ok(record) => {
                writeln!(self.out, "{PREFIX} Treasure ID {id} in hunt '{hunt}':")?;
                writeln!(
                    self.out,
                    "  User: {} | Location: {:.6}, {:.6} | Value: {}",
                    record.owner, record.latitude, record.longitude, record.value
                )?;
                writeln!(self.out, "  Clue: {}", record.note)?;
            }
            Err(StoreError::RecordNotFound { .. }) => {
                writeln!(self.out, "{PREFIX} Treasure ID {id} not found in hunt '{hunt}'.")?;
            }
            Err(StoreError::Corrupt {
                complete_records,
                trailing_bytes,
                ..
            }) => {
                writeln!(self.out, "{PREFIX} Treasure ID {id} not found in hunt '{hunt}'.")?;
                self.report_corruption(
                    hunt,
                    Corruption {
                        complete_records,
                        trailing_bytes,
                    },
                )?;
            }
            Err(err) => return Err(err.into()),
        }
        Ok(())
    }

    async fn compute_score(&mut self, hunt: &HuntId) -> Result<(), MonitorError> {
        let report = self.launcher.run(hunt).await?;
        for line in report.output.lines() {
            writeln!(self.out, "{PREFIX} {line}")?;
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), MonitorError> {
        writeln!(
            self.out,
            "{PREFIX} Exiting after {} ms...",
            self.grace.as_millis()
        )?;
        self.out.flush()?;
        tokio::time::sleep(self.grace).await;
        Ok(())
    }

    fn report_corruption(
        &mut self,
        hunt: &HuntId,
        corruption: Corruption,
    ) -> Result<(), MonitorError> {
        warn!(
            %hunt,
            complete = corruption.complete_records,
            trailing = corruption.trailing_bytes,
            "store has a short tail"
        );
        writeln!(
            self.out,
            "{PREFIX} Store of hunt '{hunt}' is corrupt: {} trailing bytes after {} complete records.",
            corruption.trailing_bytes, corruption.complete_records
        )?;
        Ok(())
    }
}

fn write_record_block(out: &mut impl Write, record: &TreasureRecord) -> io::Result<()> {
    writeln!(
        out,
        "  ID: {} | User: {} | Location: {:.6}, {:.6} | Value: {}",
        record.id, record.owner, record.latitude, record.longitude, record.value
    )?;
    writeln!(out, "     Clue: {}", record.note)
}

/// Entry point of `thunt monitor`: file channel under the root, stdout output,
/// listeners installed before the ready banner.
pub async fn run_worker(config: &HuntConfig) -> Result<(), MonitorError> {
    let queue = Arc::new(TriggerQueue::new());
    let _listeners = install_listeners(queue.clone())?;
    let launcher = ScoreLauncher::from_config(config)?;
    let channel = FileChannel::new(config.channel_dir());

    let mut monitor = Monitor::new(&config.root, channel, queue, launcher, io::stdout())
        .with_grace(config.shutdown_grace());
    monitor.announce_ready()?;
    info!(pid = platform::current_pid(), root = %config.root.display(), "monitor ready");
    monitor.run().await
}

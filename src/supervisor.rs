//! The hub side of the protocol: owns at most one monitor process, hands it
//! requests and tracks its lifetime.
//!
//! Liveness comes from a reaper task that awaits the child and publishes its
//! exit on a `watch` channel. Stopping sends SIGTERM and then waits on that
//! notification, however long the monitor's grace delay is.

use crate::{
    channel::{CommandChannel, CommandKind, CommandRequest},
    config::{HuntConfig, MONITOR_READY_MARKER},
    error::SupervisorError,
    platform,
    signal::{signal_name, signal_number},
    treasure::HuntId,
};
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Shared buffer receiving the monitor's stdout in capture mode.
pub type CaptureBuffer = Arc<Mutex<Vec<u8>>>;

/// Where the monitor's stdout goes.
#[derive(Clone)]
pub enum OutputStrategy {
    /// Copy every line to the hub's stdout.
    Mirror,
    /// Keep every line in a shared buffer.
    Capture(CaptureBuffer),
}

impl OutputStrategy {
    pub fn capture() -> (Self, CaptureBuffer) {
        let buffer = CaptureBuffer::default();
        (OutputStrategy::Capture(buffer.clone()), buffer)
    }
}

impl fmt::Debug for OutputStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputStrategy::Mirror => f.write_str("Mirror"),
            OutputStrategy::Capture(_) => f.write_str("Capture"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    NotStarted,
    Running { pid: u32 },
    /// SIGTERM delivered, exit not yet observed.
    Stopping { pid: u32 },
}

impl WorkerState {
    pub fn pid(&self) -> Option<u32> {
        match self {
            WorkerState::NotStarted => None,
            WorkerState::Running { pid } | WorkerState::Stopping { pid } => Some(*pid),
        }
    }
}

/// How a monitor process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    Exited(ExitStatus),
    /// The child could not be awaited; its status is unknown.
    Lost,
}

impl fmt::Display for WorkerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerExit::Exited(status) => write!(f, "{status}"),
            WorkerExit::Lost => f.write_str("unknown status"),
        }
    }
}

struct Worker {
    pid: u32,
    exit: watch::Receiver<Option<WorkerExit>>,
    output: JoinHandle<io::Result<()>>,
}

pub struct Hub<C> {
    program: PathBuf,
    root: PathBuf,
    grace: Duration,
    channel: C,
    output: OutputStrategy,
    state: WorkerState,
    worker: Option<Worker>,
    last_exit: Option<WorkerExit>,
}

impl<C: CommandChannel> Hub<C> {
    /// Hub for `config`; the monitor runs `worker_program` or, by default, the
    /// running binary.
    pub fn new(
        config: &HuntConfig,
        channel: C,
        output: OutputStrategy,
    ) -> Result<Self, SupervisorError> {
        let program = match &config.worker_program {
            Some(program) => program.clone(),
            None => std::env::current_exe()?,
        };
        Ok(Self {
            program,
            root: config.root.clone(),
            grace: config.shutdown_grace(),
            channel,
            output,
            state: WorkerState::NotStarted,
            worker: None,
            last_exit: None,
        })
    }

    /// Tracked state, refreshed from the exit notification first.
    pub fn state(&mut self) -> WorkerState {
        self.refresh()
    }

    pub fn last_exit(&self) -> Option<WorkerExit> {
        self.last_exit
    }

    /// Fold an observed exit into the tracked state.
    pub fn refresh(&mut self) -> WorkerState {
        let exited = self
            .worker
            .as_ref()
            .and_then(|worker| *worker.exit.borrow());
        if let Some(exit) = exited {
            if let Some(worker) = self.worker.take() {
                info!(pid = worker.pid, %exit, "monitor exited");
            }
            self.last_exit = Some(exit);
            self.state = WorkerState::NotStarted;
        }
        self.state
    }

    pub fn is_worker_alive(&mut self) -> bool {
        self.refresh() != WorkerState::NotStarted
    }

    /// Leaving the hub is refused while a monitor is alive, stopping or not.
    pub fn can_exit(&mut self) -> bool {
        !self.is_worker_alive()
    }

    /// Spawn the monitor and return its PID once it printed its ready banner.
    pub async fn start_worker(&mut self) -> Result<u32, SupervisorError> {
        if let Some(pid) = self.refresh().pid() {
            return Err(SupervisorError::AlreadyRunning { pid });
        }

        let mut command = Command::new(&self.program);
        command
            .arg("--root")
            .arg(&self.root)
            .arg("monitor")
            .arg("--shutdown-grace-ms")
            .arg(self.grace.as_millis().to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        platform::prepare_command(&mut command);

        let mut child = command.spawn().map_err(|source| SupervisorError::Spawn {
            program: self.program.clone(),
            source,
        })?;
        let pid = child
            .id()
            .ok_or_else(|| io::Error::other("monitor exited before reporting its PID"))?;
        let stdout = child.stdout.take();

        let (exit_tx, exit_rx) = watch::channel(None);
        tokio::spawn(reap(child, exit_tx));

        let (ready_tx, ready_rx) = oneshot::channel();
        let output = match stdout {
            Some(stdout) => tokio::spawn(copy_output(stdout, self.output.clone(), ready_tx)),
            None => tokio::spawn(async { Ok(()) }),
        };

        self.state = WorkerState::Running { pid };
        self.worker = Some(Worker {
            pid,
            exit: exit_rx.clone(),
            output,
        });
        debug!(pid, program = %self.program.display(), "monitor spawned");

        let mut exit_watch = exit_rx;
        let ready = tokio::select! {
            ready = ready_rx => ready.is_ok(),
            _ = exit_watch.wait_for(Option::is_some) => false,
        };
        if ready {
            info!(pid, "monitor ready");
            return Ok(pid);
        }

        // Output closed without a banner; a still running child is killed.
        let reaped = exit_watch.borrow().is_some();
        if !reaped {
            if let Err(errno) = platform::send_signal(pid, libc::SIGKILL) {
                debug!(pid, %errno, "monitor already gone");
            }
        }
        wait_for_exit(&mut exit_watch).await;
        self.refresh();
        Err(SupervisorError::ExitedBeforeReady)
    }

    /// Send SIGTERM and wait for the exit notification. If the signal cannot
    /// be delivered the tracked state is left as it was.
    pub async fn stop_worker(&mut self) -> Result<WorkerExit, SupervisorError> {
        let (pid, mut exit_rx) = match (self.refresh(), self.worker.as_ref()) {
            (WorkerState::NotStarted, _) | (_, None) => return Err(SupervisorError::NotRunning),
            (_, Some(worker)) => (worker.pid, worker.exit.clone()),
        };

        if self.state == (WorkerState::Running { pid }) {
            self.send(pid, CommandKind::Shutdown)?;
            self.state = WorkerState::Stopping { pid };
            info!(pid, "sent SIGTERM to monitor, waiting for it to exit");
        }

        let exit = wait_for_exit(&mut exit_rx).await;
        if let Some(worker) = self.worker.take() {
            match worker.output.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(pid, error = %err, "copying monitor output failed"),
                Err(err) => warn!(pid, error = %err, "monitor output task panicked"),
            }
        }
        self.state = WorkerState::NotStarted;
        self.last_exit = Some(exit);
        info!(pid, %exit, "monitor stopped");
        Ok(exit)
    }

    /// Submit the request, then raise its trigger. Fire-and-forget: the result
    /// shows up in the monitor's output.
    pub fn request(&mut self, request: CommandRequest) -> Result<(), SupervisorError> {
        let pid = match self.refresh() {
            WorkerState::Running { pid } => pid,
            WorkerState::Stopping { .. } | WorkerState::NotStarted => {
                return Err(SupervisorError::NotRunning)
            }
        };
        self.channel.submit(&request)?;
        let kind = request.kind();
        self.send(pid, kind)?;
        if request == CommandRequest::Shutdown {
            self.state = WorkerState::Stopping { pid };
        }
        debug!(pid, %kind, "request sent");
        Ok(())
    }

    pub fn list_hunts(&mut self) -> Result<(), SupervisorError> {
        self.request(CommandRequest::ListHunts)
    }

    pub fn list_treasures(&mut self, hunt: HuntId) -> Result<(), SupervisorError> {
        self.request(CommandRequest::ListTreasures { hunt })
    }

    pub fn view_treasure(&mut self, hunt: HuntId, id: i32) -> Result<(), SupervisorError> {
        self.request(CommandRequest::ViewTreasure { hunt, id })
    }

    pub fn compute_score(&mut self, hunt: HuntId) -> Result<(), SupervisorError> {
        self.request(CommandRequest::ComputeScore { hunt })
    }

    fn send(&self, pid: u32, kind: CommandKind) -> Result<(), SupervisorError> {
        platform::send_signal(pid, signal_number(kind)).map_err(|errno| {
            SupervisorError::Signal {
                signal: signal_name(kind),
                pid,
                errno,
            }
        })
    }
}

impl<C> Drop for Hub<C> {
    fn drop(&mut self) {
        if let Some(worker) = &self.worker {
            if worker.exit.borrow().is_none() {
                let _ = platform::send_signal(worker.pid, libc::SIGTERM);
            }
        }
    }
}

async fn reap(mut child: Child, exit_tx: watch::Sender<Option<WorkerExit>>) {
    let exit = match child.wait().await {
        Ok(status) => WorkerExit::Exited(status),
        Err(err) => {
            warn!(error = %err, "failed to wait for monitor");
            WorkerExit::Lost
        }
    };
    exit_tx.send_replace(Some(exit));
}

async fn wait_for_exit(exit: &mut watch::Receiver<Option<WorkerExit>>) -> WorkerExit {
    match exit.wait_for(Option::is_some).await {
        Ok(value) => (*value).unwrap_or(WorkerExit::Lost),
        Err(_) => WorkerExit::Lost,
    }
}

/// Copy the monitor's stdout line by line according to `strategy`, firing
/// `ready` on the first line carrying the ready marker.
async fn copy_output<R>(
    reader: R,
    strategy: OutputStrategy,
    ready: oneshot::Sender<()>,
) -> io::Result<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut reader = BufReader::new(reader);
    let mut ready = Some(ready);
    let mut line = Vec::with_capacity(256);
    loop {
        line.clear();
        let read = reader.read_until(b'\n', &mut line).await?;
        if read == 0 {
            break;
        }

        match &strategy {
            OutputStrategy::Mirror => {
                let mut handle = tokio::io::stdout();
                handle.write_all(&line).await?;
                handle.flush().await?;
            }
            OutputStrategy::Capture(buffer) => {
                buffer.lock().await.extend_from_slice(&line);
            }
        }

        if line.starts_with(MONITOR_READY_MARKER.as_bytes()) {
            if let Some(ready) = ready.take() {
                let _ = ready.send(());
            }
        }
    }
    Ok(())
}

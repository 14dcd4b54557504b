//! Dispatch triggers.
//!
//! Each request kind maps to one Unix signal. On the monitor side a signal
//! never runs request code: the listener only marks its kind as pending in a
//! [`TriggerQueue`] and the processing loop does all the I/O. A kind that is
//! already pending is coalesced, so a burst of identical triggers is handled
//! once.

use crate::channel::CommandKind;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::debug;

/// Raw signal number carrying `kind`.
pub fn signal_number(kind: CommandKind) -> libc::c_int {
    match kind {
        CommandKind::ListHunts => libc::SIGUSR1,
        CommandKind::ListTreasures => libc::SIGUSR2,
        CommandKind::ViewTreasure => realtime_signal(0),
        CommandKind::ComputeScore => realtime_signal(1),
        CommandKind::Shutdown => libc::SIGTERM,
    }
}

pub fn signal_name(kind: CommandKind) -> &'static str {
    match kind {
        CommandKind::ListHunts => "SIGUSR1",
        CommandKind::ListTreasures => "SIGUSR2",
        CommandKind::ViewTreasure => "SIGRTMIN",
        CommandKind::ComputeScore => "SIGRTMIN+1",
        CommandKind::Shutdown => "SIGTERM",
    }
}

pub fn kind_for_signal(signo: libc::c_int) -> Option<CommandKind> {
    CommandKind::ALL
        .into_iter()
        .find(|kind| signal_number(*kind) == signo)
}

#[cfg(target_os = "linux")]
fn realtime_signal(offset: libc::c_int) -> libc::c_int {
    libc::SIGRTMIN() + offset
}

// No realtime signals outside Linux; fall back to otherwise unused ones.
#[cfg(not(target_os = "linux"))]
fn realtime_signal(offset: libc::c_int) -> libc::c_int {
    if offset == 0 {
        libc::SIGWINCH
    } else {
        libc::SIGURG
    }
}

/// Pending request kinds in arrival order, at most one entry per kind.
#[derive(Debug, Default)]
pub struct TriggerQueue {
    pending: Mutex<VecDeque<CommandKind>>,
    notify: Notify,
}

impl TriggerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn capacity(&self) -> usize {
        CommandKind::ALL.len()
    }

    /// Mark `kind` as pending. Returns `false` if it already was (coalesced).
    pub fn raise(&self, kind: CommandKind) -> bool {
        {
            let mut pending = self.pending.lock();
            if pending.contains(&kind) {
                return false;
            }
            pending.push_back(kind);
        }
        self.notify.notify_one();
        true
    }

    pub fn try_next(&self) -> Option<CommandKind> {
        self.pending.lock().pop_front()
    }

    /// Wait for the oldest pending kind.
    pub async fn next(&self) -> CommandKind {
        loop {
            if let Some(kind) = self.try_next() {
                return kind;
            }
            self.notify.notified().await;
        }
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Keeps the listener tasks alive; dropping it stops listening.
pub struct ListenerGuard {
    handles: Vec<JoinHandle<()>>,
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

/// Register a signal stream for every trigger and forward deliveries into
/// `queue`. Every stream is registered before this returns, so the caller may
/// announce readiness right after.
pub fn install_listeners(queue: Arc<TriggerQueue>) -> io::Result<ListenerGuard> {
    let mut handles = Vec::with_capacity(CommandKind::ALL.len());
    for kind in CommandKind::ALL {
        let mut stream = signal(SignalKind::from_raw(signal_number(kind)))?;
        let queue = queue.clone();
        handles.push(tokio::spawn(async move {
            while stream.recv().await.is_some() {
                if !queue.raise(kind) {
                    debug!(%kind, "trigger coalesced with a pending one");
                }
            }
        }));
    }
    Ok(ListenerGuard { handles })
}

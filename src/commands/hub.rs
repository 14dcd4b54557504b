//! Interactive hub shell.

use crate::{
    channel::{CommandChannel, FileChannel},
    config::HuntConfig,
    error::SupervisorError,
    supervisor::{Hub, OutputStrategy, WorkerState},
    treasure::HuntId,
};
use anyhow::Result;
use std::io::{self, Write};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::debug;

const HELP: &str = "\
Commands:
  start_monitor                       start the monitor
  list_hunts                          list every hunt with its treasure count
  list_treasures <hunt>               list the treasures of a hunt
  view_treasure <hunt> <id>           show one treasure
  calculate_score <hunt>              total value of a hunt
  stop_monitor                        stop the monitor and wait for it
  exit                                leave (only once the monitor stopped)
  help                                this text";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    StartMonitor,
    ListHunts,
    ListTreasures(HuntId),
    ViewTreasure(HuntId, i32),
    CalculateScore(HuntId),
    StopMonitor,
    Exit,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShellParseError {
    #[error("Usage: {0}")]
    Usage(&'static str),
    #[error("Unknown or unimplemented command: {0}")]
    Unknown(String),
    #[error("invalid hunt id '{0}'")]
    InvalidHunt(String),
    #[error("treasure id '{0}' is not an integer")]
    InvalidId(String),
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Option<Result<ShellCommand, ShellParseError>> {
    let mut words = line.split_whitespace();
    let name = words.next()?;
    let args: Vec<&str> = words.collect();

    let hunt = |raw: &str| HuntId::new(raw).map_err(|_| ShellParseError::InvalidHunt(raw.into()));
    let parsed = match (name, args.as_slice()) {
        ("start_monitor", []) => Ok(ShellCommand::StartMonitor),
        ("list_hunts", []) => Ok(ShellCommand::ListHunts),
        ("list_treasures", [h]) => hunt(*h).map(ShellCommand::ListTreasures),
        ("list_treasures", _) => Err(ShellParseError::Usage("list_treasures <hunt_id>")),
        ("view_treasure", [h, id]) => hunt(*h).and_then(|h| {
            id.parse::<i32>()
                .map(|id| ShellCommand::ViewTreasure(h, id))
                .map_err(|_| ShellParseError::InvalidId((*id).into()))
        }),
        ("view_treasure", _) => Err(ShellParseError::Usage(
            "view_treasure <hunt_id> <treasure_id>",
        )),
        ("calculate_score", [h]) => hunt(*h).map(ShellCommand::CalculateScore),
        ("calculate_score", _) => Err(ShellParseError::Usage("calculate_score <hunt_id>")),
        ("stop_monitor", []) => Ok(ShellCommand::StopMonitor),
        ("exit", []) => Ok(ShellCommand::Exit),
        ("help", _) => Ok(ShellCommand::Help),
        _ => Err(ShellParseError::Unknown(line.trim().to_string())),
    };
    Some(parsed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// Read commands from `input` until `exit` is accepted. On end of input a
/// running monitor is stopped first.
pub async fn run_shell<C, R, W>(hub: &mut Hub<C>, mut input: R, out: &mut W) -> Result<()>
where
    C: CommandChannel,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut line = String::new();
    let mut tracked = hub.state().pid();
    writeln!(out, "Welcome to Treasure Hub")?;

    loop {
        report_unexpected_exit(hub, &mut tracked, out)?;
        write!(out, "hub> ")?;
        out.flush()?;

        line.clear();
        if input.read_line(&mut line).await? == 0 {
            writeln!(out)?;
            if hub.is_worker_alive() {
                execute(hub, ShellCommand::StopMonitor, out).await?;
            }
            writeln!(out, "[Hub] Exiting Treasure Hub.")?;
            return Ok(());
        }

        let command = match parse_line(&line) {
            None => continue,
            Some(Ok(command)) => command,
            Some(Err(err)) => {
                writeln!(out, "[Hub] {err}")?;
                continue;
            }
        };
        debug!(?command, "hub command");

        let flow = execute(hub, command, out).await?;
        tracked = hub.state().pid();
        if flow == Flow::Quit {
            return Ok(());
        }
    }
}

fn report_unexpected_exit<C, W>(
    hub: &mut Hub<C>,
    tracked: &mut Option<u32>,
    out: &mut W,
) -> io::Result<()>
where
    C: CommandChannel,
    W: Write,
{
    if let Some(pid) = *tracked {
        if !hub.is_worker_alive() {
            writeln!(out, "[Hub] Monitor (PID {pid}) has terminated.")?;
            *tracked = None;
        }
    }
    Ok(())
}

async fn execute<C, W>(hub: &mut Hub<C>, command: ShellCommand, out: &mut W) -> io::Result<Flow>
where
    C: CommandChannel,
    W: Write,
{
    let result: Result<(), SupervisorError> = match command {
        ShellCommand::StartMonitor => hub
            .start_worker()
            .await
            .and_then(|pid| Ok(writeln!(out, "[Hub] Monitor started with PID: {pid}")?)),
        ShellCommand::ListHunts => hub
            .list_hunts()
            .and_then(|()| Ok(writeln!(out, "[Hub] Sending request to list hunts...")?)),
        ShellCommand::ListTreasures(hunt) => {
            let message = format!("[Hub] Requesting list_treasures for hunt '{hunt}'...");
            hub.list_treasures(hunt)
                .and_then(|()| Ok(writeln!(out, "{message}")?))
        }
        ShellCommand::ViewTreasure(hunt, id) => {
            let message = format!(
                "[Hub] Requesting view_treasure for hunt '{hunt}' and treasure '{id}'..."
            );
            hub.view_treasure(hunt, id)
                .and_then(|()| Ok(writeln!(out, "{message}")?))
        }
        ShellCommand::CalculateScore(hunt) => {
            let message = format!("[Hub] Requesting score for hunt '{hunt}'...");
            hub.compute_score(hunt)
                .and_then(|()| Ok(writeln!(out, "{message}")?))
        }
        ShellCommand::StopMonitor => {
            if let Some(pid) = hub.state().pid() {
                writeln!(out, "[Hub] Sending termination request to monitor (PID: {pid})...")?;
                out.flush()?;
            }
            hub.stop_worker()
                .await
                .and_then(|exit| Ok(writeln!(out, "[Hub] Monitor terminated ({exit}).")?))
        }
        ShellCommand::Exit => {
            if let WorkerState::Running { pid } | WorkerState::Stopping { pid } = hub.state() {
                writeln!(out, "[Hub] Cannot exit: Monitor is still running (PID: {pid})")?;
                return Ok(Flow::Continue);
            }
            writeln!(out, "[Hub] Exiting Treasure Hub.")?;
            return Ok(Flow::Quit);
        }
        ShellCommand::Help => {
            writeln!(out, "{HELP}")?;
            return Ok(Flow::Continue);
        }
    };

    if let Err(err) = result {
        writeln!(out, "[Hub] {err}")?;
    }
    Ok(Flow::Continue)
}

/// Entry point of `thunt hub`.
pub async fn run_hub(config: &HuntConfig) -> Result<()> {
    let channel = FileChannel::new(config.channel_dir());
    let mut hub = Hub::new(config, channel, OutputStrategy::Mirror)?;
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = io::stdout();
    run_shell(&mut hub, stdin, &mut stdout).await
}

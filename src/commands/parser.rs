//! CLI 命令行参数解析
//!
//! One binary, four roles: the interactive hub, the monitor it spawns, the
//! one-shot score calculator and the hunt manager.

use crate::treasure::HuntId;
use clap::{Parser, Subcommand};
use std::ffi::OsString;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "thunt",
    about = "Treasure hunt records with a signal-driven monitor",
    version,
    disable_help_subcommand = true
)]
pub struct Cli {
    /// Directory holding the hunts (defaults to the configured root or `.`)
    #[arg(long, global = true, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `thunt::monitor=trace`
    #[arg(long, global = true, value_name = "FILTER")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Interactive shell supervising one monitor
    Hub,

    /// Run the monitor (normally started by the hub)
    Monitor {
        /// Delay between the shutdown trigger and exit
        #[arg(long, value_name = "MS")]
        shutdown_grace_ms: Option<u64>,
    },

    /// Print the total score of a hunt
    Score {
        #[arg(value_name = "HUNT")]
        hunt: HuntId,
    },

    /// Manage hunts and their treasures
    #[command(subcommand)]
    Manager(ManagerAction),
}

#[derive(Subcommand, Debug, Clone)]
pub enum ManagerAction {
    /// Add a treasure, creating the hunt if needed
    #[command(allow_negative_numbers = true)]
    Add {
        hunt: HuntId,
        #[arg(long)]
        id: i32,
        #[arg(long)]
        owner: String,
        #[arg(long)]
        latitude: f32,
        #[arg(long)]
        longitude: f32,
        #[arg(long, default_value = "")]
        note: String,
        #[arg(long)]
        value: i32,
    },

    /// Show store size and every treasure of a hunt
    List { hunt: HuntId },

    /// Show one treasure
    #[command(allow_negative_numbers = true)]
    View { hunt: HuntId, id: i32 },

    /// Remove every treasure with the given id
    #[command(allow_negative_numbers = true)]
    RemoveTreasure { hunt: HuntId, id: i32 },

    /// Remove a hunt with its log and alias
    RemoveHunt { hunt: HuntId },
}

impl Cli {
    /// 尝试解析命令行参数（用于测试或自定义 argv）
    pub fn try_parse_from_args<I, T>(iter: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Self::try_parse_from(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_is_accepted_before_or_after_the_subcommand() {
        let cli = Cli::try_parse_from_args(["thunt", "--root", "/srv/h", "hub"]).expect("parse");
        assert_eq!(cli.root, Some(PathBuf::from("/srv/h")));
        assert!(matches!(cli.command, Commands::Hub));

        let cli = Cli::try_parse_from_args([
            "thunt",
            "monitor",
            "--root",
            "/srv/h",
            "--shutdown-grace-ms",
            "50",
        ])
        .expect("parse");
        assert_eq!(cli.root, Some(PathBuf::from("/srv/h")));
        assert!(matches!(
            cli.command,
            Commands::Monitor {
                shutdown_grace_ms: Some(50)
            }
        ));
    }

    #[test]
    fn manager_add_takes_negative_coordinates() {
        let cli = Cli::try_parse_from_args([
            "thunt", "manager", "add", "h1", "--id", "3", "--owner", "ana", "--latitude",
            "-33.9", "--longitude", "18.4", "--value", "-5",
        ])
        .expect("parse");
        match cli.command {
            Commands::Manager(ManagerAction::Add {
                hunt,
                id,
                latitude,
                value,
                note,
                ..
            }) => {
                assert_eq!(hunt.as_str(), "h1");
                assert_eq!(id, 3);
                assert!((latitude + 33.9).abs() < 1e-4);
                assert_eq!(value, -5);
                assert_eq!(note, "");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn invalid_hunt_ids_are_rejected_by_the_parser() {
        assert!(Cli::try_parse_from_args(["thunt", "score", "../etc"]).is_err());
        assert!(Cli::try_parse_from_args(["thunt", "manager", "list", ".hidden"]).is_err());
    }
}

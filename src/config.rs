//! 配置管理
//!
//! Well-known names shared by the hub, the monitor and the score helper, plus
//! the layered `HuntConfig` (defaults, `thunt.toml`, `THUNT_*` env vars).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const STORE_FILE_NAME: &str = "treasures.dat";
pub const AUDIT_LOG_FILE_NAME: &str = "logged_hunt";
pub const AUDIT_ALIAS_PREFIX: &str = "logged_hunt-";

pub const CHANNEL_LIST_TREASURES_FILE: &str = "cmd_hunt.txt";
pub const CHANNEL_VIEW_TREASURE_FILE: &str = "cmd_view.txt";
pub const CHANNEL_COMPUTE_SCORE_FILE: &str = "cmd_score.txt";

pub const CONFIG_FILE_STEM: &str = "thunt";
pub const ENV_PREFIX: &str = "THUNT";

/// Printed by the monitor once every trigger listener is registered.
pub const MONITOR_READY_MARKER: &str = "[Monitor] Running";

pub const SHUTDOWN_GRACE_DEFAULT: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

/// Runtime configuration shared by every subcommand.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HuntConfig {
    /// Directory holding hunt directories, aliases and channel files.
    pub root: PathBuf,
    /// Grace delay the monitor sleeps after a shutdown trigger.
    pub shutdown_grace_ms: u64,
    /// Worker executable; defaults to the running binary.
    pub worker_program: Option<PathBuf>,
    /// Score helper executable; defaults to the running binary.
    pub score_program: Option<PathBuf>,
    pub log_level: Option<String>,
    pub log_file: Option<PathBuf>,
}

impl Default for HuntConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            shutdown_grace_ms: SHUTDOWN_GRACE_DEFAULT.as_millis() as u64,
            worker_program: None,
            score_program: None,
            log_level: None,
            log_file: None,
        }
    }
}

impl HuntConfig {
    /// Load `thunt.toml` (optional) from the working directory, then `THUNT_*`
    /// environment variables on top.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Path::new(CONFIG_FILE_STEM))
    }

    pub fn load_from(file_stem: &Path) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(file_stem).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn with_root(mut self, root: Option<PathBuf>) -> Self {
        if let Some(root) = root {
            self.root = root;
        }
        self
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Channel files live next to the hunts so every process agrees on them.
    pub fn channel_dir(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn defaults_point_at_working_directory() {
        let config = HuntConfig::default();
        assert_eq!(config.root, PathBuf::from("."));
        assert_eq!(config.shutdown_grace(), SHUTDOWN_GRACE_DEFAULT);
        assert!(config.worker_program.is_none());
    }

    #[test]
    #[serial]
    fn file_values_are_loaded() {
        let dir = TempDir::new().expect("temp dir");
        let stem = dir.path().join("thunt");
        std::fs::write(
            dir.path().join("thunt.toml"),
            "root = \"/srv/hunts\"\nshutdown_grace_ms = 50\n",
        )
        .expect("write config");

        let config = HuntConfig::load_from(&stem).expect("load");
        assert_eq!(config.root, PathBuf::from("/srv/hunts"));
        assert_eq!(config.shutdown_grace_ms, 50);
    }

    #[test]
    #[serial]
    fn cli_root_overrides_loaded_root() {
        let config = HuntConfig::default().with_root(Some(PathBuf::from("/tmp/other")));
        assert_eq!(config.root, PathBuf::from("/tmp/other"));
        let unchanged = HuntConfig::default().with_root(None);
        assert_eq!(unchanged.root, PathBuf::from("."));
    }
}

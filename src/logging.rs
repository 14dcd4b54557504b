//! 日志系统
//!
//! Diagnostics go to stderr: stdout carries the monitor's protocol lines and
//! the score result, so nothing else may write there.

use anyhow::Result;
use std::path::Path;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const DEFAULT_FILTER: &str = "info,thunt=debug";

/// Build the level filter: an explicit level wins over `RUST_LOG`, which wins
/// over [`DEFAULT_FILTER`].
pub fn build_filter(log_level: Option<&str>) -> Result<EnvFilter> {
    match log_level {
        Some(level) => Ok(EnvFilter::try_new(level)?),
        None => Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))),
    }
}

/// 初始化日志系统
///
/// `log_file`, when given, receives an uncoloured copy of every event and is
/// opened in append mode.
pub fn init_logger(log_level: Option<&str>, log_file: Option<&Path>) -> Result<()> {
    let env_filter = build_filter(log_level)?;

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .compact();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer);

    if let Some(log_path) = log_file {
        if let Some(parent) = log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        let file_layer = fmt::layer()
            .with_writer(std::sync::Arc::new(file))
            .with_target(true)
            .with_ansi(false)
            .with_level(true);

        registry.with(file_layer).try_init()?;
    } else {
        registry.try_init()?;
    }

    tracing::debug!("logger initialized");
    Ok(())
}

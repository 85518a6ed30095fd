//! Logging setup for scaffold-testkit
//!
//! Logs go to stderr. When `logging.file` is configured they are mirrored,
//! without colours, into that file.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing_subscriber::{fmt, prelude::*, registry, EnvFilter};

use crate::config::LoggingConfig;

/// Build the filter directive for the crate from the configured level and `-v` count.
///
/// Each `-v` raises the level by one step, capped at trace.
pub fn filter_directive(level: &str, verbosity: u8) -> String {
    const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

    let base = LEVELS.iter().position(|l| *l == level).unwrap_or(2);
    let idx = (base + verbosity as usize).min(LEVELS.len() - 1);
    format!("scaffold_testkit={}", LEVELS[idx])
}

/// Initialize the global tracing subscriber.
///
/// RUST_LOG, when set, takes precedence over the configured level.
pub fn init_logging(config: &LoggingConfig, verbosity: u8) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(&config.level, verbosity)));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let file_layer = match &config.file {
        Some(path) => Some(
            fmt::layer()
                .with_writer(file_appender(path)?)
                .with_ansi(false)
                .with_target(false)
                .with_thread_ids(false),
        ),
        None => None,
    };

    let subscriber = registry().with(filter).with(stderr_layer).with(file_layer);

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set tracing subscriber: {}", e))?;

    Ok(())
}

fn file_appender(path: &Path) -> Result<tracing_appender::rolling::RollingFileAppender> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("Log file path has no file name: {}", path.display()))?;

    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;

    Ok(tracing_appender::rolling::never(dir, file_name))
}

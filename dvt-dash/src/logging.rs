//! Tracing setup for the `dvt-dash` binary.
//!
//! The dashboard owns the terminal, so in TUI mode events go to a daily
//! rolling file through a non-blocking writer. Every other command logs to
//! stderr.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub const LOG_FILE_PREFIX: &str = "dvt-dash.log";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    /// Rolling file in this directory.
    File(PathBuf),
}

/// Keeps the file writer flushing until dropped.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

/// Filter used when `RUST_LOG` is unset: our crates at the requested level,
/// everything else at `warn`.
pub fn default_directive(verbose: bool, configured_level: &str) -> String {
    let level = if verbose { "debug" } else { configured_level };
    format!("warn,dvt_dash={level},dvt_common={level}")
}

pub fn init_logging(target: LogTarget, verbose: bool, configured_level: &str) -> Result<LoggingGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose, configured_level)));

    match target {
        LogTarget::Stderr => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(std::io::stderr))
                .with(filter)
                .try_init()
                .context("failed to initialize logging")?;
            Ok(LoggingGuard { _file: None })
        }
        LogTarget::File(dir) => {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .with(filter)
                .try_init()
                .context("failed to initialize logging")?;
            Ok(LoggingGuard { _file: Some(guard) })
        }
    }
}

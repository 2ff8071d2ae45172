//! JSONL run log for the workspace's tests.
//!
//! When enabled, every tracing event emitted during a test run is also
//! appended as one JSON object per line to `target/test-logs/dvt-tests.jsonl`.
//! A failed reconciliation or live-channel test can then be read back with
//! its full event order after the run.
//!
//! - `DVT_TEST_LOGGING`: `1`/`true` enables, `0`/`false` disables (default: on under `CI`)
//! - `DVT_TEST_LOG_FILE`: write to this file instead
//! - `DVT_TEST_LOG_LEVEL`: level for the workspace crates (default: `info`)

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, Once};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

const LOG_FILE_NAME: &str = "dvt-tests.jsonl";

static INIT: Once = Once::new();

/// Whether the JSONL run log was requested for this process.
pub fn jsonl_logging_enabled() -> bool {
    enabled_from(
        std::env::var("DVT_TEST_LOGGING").ok().as_deref(),
        std::env::var_os("CI").is_some(),
    )
}

fn enabled_from(flag: Option<&str>, in_ci: bool) -> bool {
    match flag {
        Some("1" | "true") => true,
        Some("0" | "false") => false,
        _ => in_ci,
    }
}

/// Install the global subscriber: test-writer output plus the JSONL file.
/// Later calls are no-ops, as is a call after another subscriber won.
pub fn init_global_test_logging() {
    INIT.call_once(|| {
        let path = test_log_path(
            std::env::var("DVT_TEST_LOG_FILE").ok().as_deref(),
            std::env::var("CARGO_TARGET_DIR").ok().as_deref(),
            &std::env::current_dir().unwrap_or_default(),
        );
        let json_layer = open_log_file(&path).map(|file| {
            fmt::layer()
                .json()
                .with_writer(Mutex::new(file))
                .with_span_events(FmtSpan::CLOSE)
                .with_file(true)
                .with_line_number(true)
        });

        let level = std::env::var("DVT_TEST_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let filter = EnvFilter::try_new(test_filter(&level))
            .unwrap_or_else(|_| EnvFilter::new(test_filter("info")));

        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(json_layer)
            .with(fmt::layer().with_test_writer().compact());
        if tracing::subscriber::set_global_default(subscriber).is_ok() {
            tracing::info!(target: "test", path = %path.display(), "test run log enabled");
        }
    });
}

fn test_filter(level: &str) -> String {
    format!("dvt_dash={level},dvt_common={level},test={level}")
}

fn open_log_file(path: &Path) -> Option<File> {
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    File::create(path).ok()
}

/// Where the run log goes: an explicit file, else `test-logs/` under the
/// cargo target directory, found from `CARGO_TARGET_DIR` or by walking up
/// from `cwd` to the nearest `target/`.
pub fn test_log_path(file: Option<&str>, target_dir: Option<&str>, cwd: &Path) -> PathBuf {
    if let Some(file) = file.filter(|f| !f.is_empty()) {
        return PathBuf::from(file);
    }
    let target = match target_dir.filter(|d| !d.is_empty()) {
        Some(dir) => PathBuf::from(dir),
        None => cwd
            .ancestors()
            .map(|dir| dir.join("target"))
            .find(|dir| dir.is_dir())
            .unwrap_or_else(|| PathBuf::from("target")),
    };
    target.join("test-logs").join(LOG_FILE_NAME)
}

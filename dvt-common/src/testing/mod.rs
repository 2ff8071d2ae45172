//! Test support shared by the workspace's unit and integration tests.

mod log;

pub use log::{init_global_test_logging, jsonl_logging_enabled, test_log_path};

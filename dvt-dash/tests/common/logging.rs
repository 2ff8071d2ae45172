use tracing_subscriber::{EnvFilter, fmt};

/// Test-writer output, plus the JSONL run log when `DVT_TEST_LOGGING` is on.
pub fn init_test_logging() {
    if dvt_common::testing::jsonl_logging_enabled() {
        dvt_common::testing::init_global_test_logging();
        return;
    }
    let _ = fmt()
        .with_test_writer()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("dvt_dash=debug".parse().unwrap())
                .add_directive("dvt_common=debug".parse().unwrap()),
        )
        .try_init();
}

#[macro_export]
macro_rules! test_log {
    ($($arg:tt)*) => {
        tracing::info!(target: "test", $($arg)*);
    };
}

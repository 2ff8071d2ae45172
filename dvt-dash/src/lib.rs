//! DVT compatibility dashboard.
//!
//! Launches SSD compatibility test runs on the test-execution backend and
//! keeps two views of their state current: which runs are in flight (from the
//! live WebSocket channel) and the latest result per test type (from the
//! results API).

pub mod api;
pub mod launch;
pub mod live;
pub mod logging;
pub mod reconciler;
pub mod render;
pub mod tui;

pub use api::{ApiClient, ApiError};
pub use launch::{LaunchError, WaitOutcome, launch_and_wait, launch_test};
pub use live::{ChannelState, LiveChannel, LiveError, LiveMessage};
pub use reconciler::{ActiveTestSet, Reconciler, RefreshApplied, RefreshTicket, ResultCache};

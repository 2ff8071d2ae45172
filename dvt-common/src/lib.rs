//! Shared types and utilities for the DVT compatibility dashboard.
//!
//! This crate carries everything the dashboard needs that is not tied to a
//! transport: the wire types served by the test-execution backend, the static
//! catalog of launchable test categories, live-event parsing and the layered
//! configuration.

pub mod catalog;
pub mod config;
pub mod events;
pub mod testing;
pub mod types;

pub use catalog::{CATALOG, TestCategory, TestDefinition};
pub use config::{DashConfig, RefreshOrdering};
pub use events::{LiveEvent, RunOutcome, parse_live_message};
pub use types::{
    LaunchAck, LaunchRequest, ModuleStatus, TestConfig, TestId, TestResult, TestStatus,
};

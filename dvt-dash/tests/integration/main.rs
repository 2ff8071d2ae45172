//! End-to-end tests against an in-process mock of the test-execution backend.

#[path = "../common/mod.rs"]
mod common;

mod api_tests;
mod launch_tests;
mod live_tests;

//! Interactive TUI dashboard.
//!
//! Launch panel, result history and run configuration, with run state kept
//! current from the live channel and the results API.

mod app;
mod event;
mod state;
#[cfg(test)]
mod test_harness;
mod widgets;

pub use app::{App, Effect, TuiConfig, run_tui};
pub use event::Action;
pub use state::{ConfigField, ConfigForm, DashboardState, Notice, NoticeLevel, Panel};

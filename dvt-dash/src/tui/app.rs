//! TUI application runner.
//!
//! [`App`] turns key presses, live events and finished network calls into
//! state changes plus a list of [`Effect`]s. The runner performs the effects
//! (spawned reads and submits, reconnects) and feeds their results back, so
//! all mutation stays on the dashboard task.

use crate::api::{ApiClient, ApiError};
use crate::launch::{LaunchError, launch_test};
use crate::live::{ChannelState, LiveChannel, LiveMessage};
use crate::reconciler::{Reconciler, RefreshApplied, RefreshTicket};
use crate::tui::{
    event::{Action, action_for_event},
    state::{DashboardState, NoticeLevel, Panel},
    widgets,
};
use anyhow::Result;
use crossterm::{
    event::EventStream,
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use dvt_common::{
    LaunchAck, LiveEvent, RefreshOrdering, RunOutcome, TestCategory, TestConfig, TestResult,
};
use futures::StreamExt;
use ratatui::{Terminal, backend::CrosstermBackend};
use std::io::{self, Stdout};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

const TICK_RATE: Duration = Duration::from_millis(250);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for the TUI dashboard.
#[derive(Debug, Clone)]
pub struct TuiConfig {
    pub api: ApiClient,
    pub live_url: String,
    pub refresh_interval: Duration,
    pub refresh_ordering: RefreshOrdering,
    pub launch_defaults: TestConfig,
    /// High contrast mode for accessibility.
    pub high_contrast: bool,
}

/// Work the runner performs on behalf of [`App`].
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Refresh(RefreshTicket),
    Launch {
        category: TestCategory,
        config: TestConfig,
    },
    /// Close the live channel, if any, and open a new one.
    Reconnect,
}

/// Dashboard controller: view state plus the run-state reconciler.
#[derive(Debug)]
pub struct App {
    pub state: DashboardState,
    pub reconciler: Reconciler,
    refresh_interval: Duration,
}

impl App {
    pub fn new(config: &TuiConfig) -> Self {
        let mut state = DashboardState::new();
        state.high_contrast = config.high_contrast;
        state.form = crate::tui::state::ConfigForm::from_config(&config.launch_defaults);
        state.api_url = config.api.base_url().to_string();
        state.live_url = config.live_url.clone();
        Self {
            state,
            reconciler: Reconciler::new(config.refresh_ordering),
            refresh_interval: config.refresh_interval,
        }
    }

    #[cfg(test)]
    fn with_parts(state: DashboardState, reconciler: Reconciler, refresh_interval: Duration) -> Self {
        Self {
            state,
            reconciler,
            refresh_interval,
        }
    }

    /// Initial results read when the dashboard mounts.
    pub fn start(&mut self) -> Vec<Effect> {
        vec![self.new_refresh(Instant::now())]
    }

    fn track_refresh(&mut self, ticket: RefreshTicket, now: Instant) -> Effect {
        self.state.refreshes_in_flight += 1;
        self.state.last_refresh_request = Some(now);
        Effect::Refresh(ticket)
    }

    fn new_refresh(&mut self, now: Instant) -> Effect {
        let ticket = self.reconciler.request_refresh();
        self.track_refresh(ticket, now)
    }

    /// Rows of the current panel, for selection bounds.
    fn list_len(&self) -> usize {
        match self.state.panel {
            Panel::Launch => TestCategory::ALL.len(),
            Panel::History => self.reconciler.results().as_slice().len(),
            Panel::Config => crate::tui::state::ConfigField::ALL.len(),
        }
    }

    pub fn selected_category(&self) -> TestCategory {
        TestCategory::ALL[self.state.selected_index.min(TestCategory::ALL.len() - 1)]
    }

    pub fn history(&self) -> Vec<&TestResult> {
        self.reconciler.results().newest_first()
    }

    pub fn handle_action(&mut self, action: Action) -> Vec<Effect> {
        if self.state.is_input_mode() {
            return self.handle_input_action(action);
        }

        match action {
            Action::Quit => {
                if self.state.show_help {
                    self.state.show_help = false;
                } else {
                    self.state.should_quit = true;
                }
            }
            Action::Back => {
                if self.state.show_help {
                    self.state.show_help = false;
                } else if self.state.expanded.is_some() {
                    self.state.expanded = None;
                }
            }
            Action::Help => self.state.show_help = !self.state.show_help,
            _ if self.state.show_help => {}
            Action::Up => self.state.select_up(),
            Action::Down => {
                let len = self.list_len();
                self.state.select_down(len);
            }
            Action::NextPanel => self.state.next_panel(),
            Action::PrevPanel => self.state.prev_panel(),
            Action::Refresh => return vec![self.new_refresh(Instant::now())],
            Action::Reconnect => {
                self.reconciler.reset_active();
                self.state.channel = ChannelState::Connecting;
                self.state
                    .push_notice(NoticeLevel::Info, "reconnecting live channel");
                return vec![Effect::Reconnect, self.new_refresh(Instant::now())];
            }
            Action::Select => return self.handle_select(),
            Action::TextInput(_) | Action::DeleteChar | Action::Tick => {}
        }
        Vec::new()
    }

    fn handle_input_action(&mut self, action: Action) -> Vec<Effect> {
        match action {
            Action::Quit => self.state.should_quit = true,
            Action::Back => self.state.cancel_edit(),
            Action::Select => {
                if let Some(field) = self.state.commit_edit() {
                    debug!(field = field.label(), "config field updated");
                    if let Err(err) = self.state.form.to_test_config() {
                        self.state.push_notice(NoticeLevel::Warn, err.to_string());
                    }
                }
            }
            Action::TextInput(c) => {
                if let Some((_, buffer)) = self.state.editing.as_mut() {
                    buffer.push(c);
                }
            }
            Action::DeleteChar => {
                if let Some((_, buffer)) = self.state.editing.as_mut() {
                    buffer.pop();
                }
            }
            _ => {}
        }
        Vec::new()
    }

    fn handle_select(&mut self) -> Vec<Effect> {
        match self.state.panel {
            Panel::Launch => {
                let category = self.selected_category();
                if self.reconciler.category_running(category) {
                    self.state.push_notice(
                        NoticeLevel::Warn,
                        format!("{} is already running", category.definition().name),
                    );
                    return Vec::new();
                }
                match self.state.form.to_test_config() {
                    Ok(config) => {
                        self.state.push_notice(
                            NoticeLevel::Info,
                            format!("submitting {}", category.definition().name),
                        );
                        return vec![Effect::Launch { category, config }];
                    }
                    Err(err) => {
                        self.state.push_notice(
                            NoticeLevel::Error,
                            format!("cannot launch {category}: {err}"),
                        );
                    }
                }
            }
            Panel::History => {
                let selected = self
                    .history()
                    .get(self.state.selected_index)
                    .map(|r| r.id.clone());
                self.state.expanded = match (selected, self.state.expanded.take()) {
                    (Some(id), Some(open)) if id == open => None,
                    (selected, _) => selected,
                };
            }
            Panel::Config => self.state.begin_edit(),
        }
        Vec::new()
    }

    pub fn handle_live(&mut self, message: LiveMessage) -> Vec<Effect> {
        match message {
            LiveMessage::Event(event) => {
                if let LiveEvent::Terminated {
                    test_id, outcome, ..
                } = &event
                {
                    match outcome {
                        RunOutcome::Completed { .. } => self
                            .state
                            .push_notice(NoticeLevel::Info, format!("{test_id} completed")),
                        RunOutcome::Failed { error } => self.state.push_notice(
                            NoticeLevel::Warn,
                            format!(
                                "{test_id} failed: {}",
                                error.as_deref().unwrap_or("no error message")
                            ),
                        ),
                    }
                }
                match self.reconciler.handle_event(&event) {
                    Some(ticket) => vec![self.track_refresh(ticket, Instant::now())],
                    None => Vec::new(),
                }
            }
            LiveMessage::Closed { reason } => {
                self.state.push_notice(
                    NoticeLevel::Warn,
                    "live channel closed, press c to reconnect",
                );
                self.state.channel = ChannelState::Closed { reason };
                Vec::new()
            }
        }
    }

    pub fn live_opened(&mut self) {
        self.state.channel = ChannelState::Open;
    }

    pub fn live_failed(&mut self, error: &str) {
        self.state.channel = ChannelState::Closed {
            reason: Some(error.to_string()),
        };
        self.state.push_notice(NoticeLevel::Error, error.to_string());
    }

    pub fn handle_refresh(
        &mut self,
        ticket: RefreshTicket,
        outcome: Result<Vec<TestResult>, ApiError>,
    ) {
        self.state.refreshes_in_flight = self.state.refreshes_in_flight.saturating_sub(1);
        if let RefreshApplied::Failed { error } = self.reconciler.apply_refresh(ticket, outcome) {
            self.state
                .push_notice(NoticeLevel::Warn, format!("refresh failed: {error}"));
        }
        let len = self.list_len();
        self.state.clamp_selection(len);
    }

    /// Report a submit outcome. The running set is left alone either way.
    pub fn handle_launch_result(
        &mut self,
        category: TestCategory,
        outcome: Result<LaunchAck, LaunchError>,
    ) {
        match outcome {
            Ok(ack) => self.state.push_notice(
                NoticeLevel::Info,
                format!("{category} accepted as {}", ack.test_id),
            ),
            Err(err) => self
                .state
                .push_notice(NoticeLevel::Error, format!("{category} launch failed: {err}")),
        }
    }

    /// Periodic poll, skipped while a read is still outstanding.
    pub fn on_tick(&mut self, now: Instant) -> Vec<Effect> {
        let due = self
            .state
            .last_refresh_request
            .is_none_or(|at| now.duration_since(at) >= self.refresh_interval);
        if due && self.state.refreshes_in_flight == 0 {
            vec![self.new_refresh(now)]
        } else {
            Vec::new()
        }
    }
}

/// Run the TUI dashboard.
pub async fn run_tui(config: TuiConfig) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, &config).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

async fn connect_live(app: &mut App, url: &str) -> Option<LiveChannel> {
    app.state.channel = ChannelState::Connecting;
    match tokio::time::timeout(CONNECT_TIMEOUT, LiveChannel::connect(url)).await {
        Ok(Ok(channel)) => {
            app.live_opened();
            Some(channel)
        }
        Ok(Err(err)) => {
            app.live_failed(&err.to_string());
            None
        }
        Err(_) => {
            app.live_failed(&format!("timed out connecting to {url}"));
            None
        }
    }
}

async fn next_live(live: &mut Option<LiveChannel>) -> Option<LiveMessage> {
    match live {
        Some(channel) => channel.recv().await,
        None => std::future::pending().await,
    }
}

/// Join tasks that have already finished so the set only holds work still
/// in flight. Returns how many were reaped.
fn reap_finished(tasks: &mut JoinSet<()>) -> usize {
    let mut reaped = 0;
    while let Some(joined) = tasks.try_join_next() {
        match joined {
            Err(err) if err.is_panic() => warn!(error = %err, "background task panicked"),
            _ => {}
        }
        reaped += 1;
    }
    reaped
}

type RefreshDone = (RefreshTicket, Result<Vec<TestResult>, ApiError>);
type LaunchDone = (TestCategory, Result<LaunchAck, LaunchError>);

/// Main application loop.
async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    config: &TuiConfig,
) -> Result<()> {
    let mut app = App::new(config);
    let (refresh_tx, mut refresh_rx) = mpsc::unbounded_channel::<RefreshDone>();
    let (launch_tx, mut launch_rx) = mpsc::unbounded_channel::<LaunchDone>();
    // Dropping the set abandons whatever is still in flight.
    let mut tasks: JoinSet<()> = JoinSet::new();

    let mut live = connect_live(&mut app, &config.live_url).await;
    let mut pending = app.start();
    let mut events = EventStream::new();
    let mut tick = tokio::time::interval(TICK_RATE);
    info!(api = %app.state.api_url, live = %config.live_url, "dashboard started");

    loop {
        reap_finished(&mut tasks);
        for effect in pending.drain(..) {
            match effect {
                Effect::Refresh(ticket) => {
                    let api = config.api.clone();
                    let tx = refresh_tx.clone();
                    tasks.spawn(async move {
                        let _ = tx.send((ticket, api.list_results().await));
                    });
                }
                Effect::Launch { category, config: run_config } => {
                    let api = config.api.clone();
                    let tx = launch_tx.clone();
                    tasks.spawn(async move {
                        let outcome = launch_test(&api, category, &run_config).await;
                        let _ = tx.send((category, outcome));
                    });
                }
                Effect::Reconnect => {
                    if let Some(old) = live.take() {
                        old.close().await;
                    }
                    live = connect_live(&mut app, &config.live_url).await;
                }
            }
        }

        if app.state.should_quit {
            break;
        }

        terminal.draw(|f| widgets::render(f, &app))?;

        pending = tokio::select! {
            maybe_event = events.next() => match maybe_event {
                Some(Ok(event)) => action_for_event(&event, app.state.is_input_mode())
                    .map(|action| app.handle_action(action))
                    .unwrap_or_default(),
                Some(Err(err)) => return Err(err.into()),
                None => {
                    app.state.should_quit = true;
                    Vec::new()
                }
            },
            message = next_live(&mut live) => match message {
                Some(message) => app.handle_live(message),
                None => {
                    live = None;
                    Vec::new()
                }
            },
            Some((ticket, outcome)) = refresh_rx.recv() => {
                app.handle_refresh(ticket, outcome);
                Vec::new()
            }
            Some((category, outcome)) = launch_rx.recv() => {
                app.handle_launch_result(category, outcome);
                Vec::new()
            }
            _ = tick.tick() => app.on_tick(Instant::now()),
        };
    }

    if let Some(channel) = live.take() {
        channel.close().await;
    }
    tasks.abort_all();
    info!("dashboard stopped");
    Ok(())
}

//! Dashboard view state.
//!
//! Everything the screen shows that is not run state: panel selection,
//! the Config form, notices and the live channel indicator. Run state lives
//! in the reconciler.

use crate::live::ChannelState;
use chrono::{DateTime, Utc};
use dvt_common::types::TestConfigError;
use dvt_common::{TestConfig, TestId};
use std::collections::VecDeque;
use std::time::Instant;

const MAX_NOTICES: usize = 50;

/// Which panel is currently selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Panel {
    #[default]
    Launch,
    History,
    Config,
}

impl Panel {
    pub const ALL: [Panel; 3] = [Panel::Launch, Panel::History, Panel::Config];

    pub fn next(self) -> Self {
        match self {
            Panel::Launch => Panel::History,
            Panel::History => Panel::Config,
            Panel::Config => Panel::Launch,
        }
    }

    pub fn prev(self) -> Self {
        match self {
            Panel::Launch => Panel::Config,
            Panel::History => Panel::Launch,
            Panel::Config => Panel::History,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Panel::Launch => "Launch",
            Panel::History => "History",
            Panel::Config => "Config",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NoticeLevel {
    Info,
    Warn,
    Error,
}

/// A non-blocking message on the status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Editable text fields of the Config panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigField {
    DevicePath,
    ExtraDevices,
    Parameters,
}

impl ConfigField {
    pub const ALL: [ConfigField; 3] = [
        ConfigField::DevicePath,
        ConfigField::ExtraDevices,
        ConfigField::Parameters,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ConfigField::DevicePath => "Primary device",
            ConfigField::ExtraDevices => "Extra devices (comma-separated)",
            ConfigField::Parameters => "Parameters (key=value, space-separated)",
        }
    }
}

/// Raw text of the Config panel. Parsed into a [`TestConfig`] on launch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigForm {
    pub device_path: String,
    pub extra_devices: String,
    pub parameters: String,
}

impl ConfigForm {
    pub fn from_config(config: &TestConfig) -> Self {
        let parameters = config
            .test_parameters
            .iter()
            .map(|(key, value)| match value {
                serde_json::Value::String(s) => format!("{key}={s}"),
                other => format!("{key}={other}"),
            })
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            device_path: config.ssd_device_path.clone(),
            extra_devices: config.extra_devices().join(", "),
            parameters,
        }
    }

    pub fn field(&self, field: ConfigField) -> &str {
        match field {
            ConfigField::DevicePath => &self.device_path,
            ConfigField::ExtraDevices => &self.extra_devices,
            ConfigField::Parameters => &self.parameters,
        }
    }

    pub fn set_field(&mut self, field: ConfigField, value: String) {
        match field {
            ConfigField::DevicePath => self.device_path = value,
            ConfigField::ExtraDevices => self.extra_devices = value,
            ConfigField::Parameters => self.parameters = value,
        }
    }

    pub fn to_test_config(&self) -> Result<TestConfig, TestConfigError> {
        let mut config = TestConfig::new(self.device_path.trim()).with_extra_devices(
            self.extra_devices
                .split(',')
                .map(str::to_string)
                .collect(),
        );
        for spec in self.parameters.split_whitespace() {
            config.insert_parameter(spec)?;
        }
        config.validate()?;
        Ok(config)
    }
}

/// View state of the dashboard.
#[derive(Debug, Clone)]
pub struct DashboardState {
    pub panel: Panel,
    pub selected_index: usize,
    pub show_help: bool,
    pub high_contrast: bool,
    pub should_quit: bool,
    pub form: ConfigForm,
    /// Field being edited, with its working copy.
    pub editing: Option<(ConfigField, String)>,
    /// History entry whose raw payload is shown.
    pub expanded: Option<TestId>,
    pub notices: VecDeque<Notice>,
    pub channel: ChannelState,
    pub refreshes_in_flight: usize,
    pub last_refresh_request: Option<Instant>,
    pub api_url: String,
    pub live_url: String,
}

impl Default for DashboardState {
    fn default() -> Self {
        Self {
            panel: Panel::Launch,
            selected_index: 0,
            show_help: false,
            high_contrast: false,
            should_quit: false,
            form: ConfigForm::default(),
            editing: None,
            expanded: None,
            notices: VecDeque::with_capacity(MAX_NOTICES),
            channel: ChannelState::default(),
            refreshes_in_flight: 0,
            last_refresh_request: None,
            api_url: String::new(),
            live_url: String::new(),
        }
    }
}

impl DashboardState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_input_mode(&self) -> bool {
        self.editing.is_some()
    }

    pub fn select_up(&mut self) {
        self.selected_index = self.selected_index.saturating_sub(1);
    }

    pub fn select_down(&mut self, list_len: usize) {
        let max_index = list_len.saturating_sub(1);
        if self.selected_index < max_index {
            self.selected_index += 1;
        }
    }

    /// Keep the selection inside a list that may have shrunk.
    pub fn clamp_selection(&mut self, list_len: usize) {
        self.selected_index = self.selected_index.min(list_len.saturating_sub(1));
    }

    pub fn next_panel(&mut self) {
        self.panel = self.panel.next();
        self.selected_index = 0;
    }

    pub fn prev_panel(&mut self) {
        self.panel = self.panel.prev();
        self.selected_index = 0;
    }

    pub fn selected_field(&self) -> ConfigField {
        ConfigField::ALL[self.selected_index.min(ConfigField::ALL.len() - 1)]
    }

    pub fn begin_edit(&mut self) {
        let field = self.selected_field();
        self.editing = Some((field, self.form.field(field).to_string()));
    }

    /// Store the working copy into the form.
    pub fn commit_edit(&mut self) -> Option<ConfigField> {
        let (field, value) = self.editing.take()?;
        self.form.set_field(field, value);
        Some(field)
    }

    pub fn cancel_edit(&mut self) {
        self.editing = None;
    }

    pub fn push_notice(&mut self, level: NoticeLevel, message: impl Into<String>) {
        if self.notices.len() == MAX_NOTICES {
            self.notices.pop_front();
        }
        self.notices.push_back(Notice {
            level,
            message: message.into(),
            at: Utc::now(),
        });
    }

    pub fn latest_notice(&self) -> Option<&Notice> {
        self.notices.back()
    }
}

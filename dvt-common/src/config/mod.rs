//! Configuration system for the dashboard.
//!
//! Layers, lowest precedence first: built-in defaults, the TOML config file,
//! `DVT_*` environment variables, and finally command-line flags (applied by
//! the binary). Every effective value remembers where it came from.

pub mod env;
pub mod source;
pub mod validate;

pub use env::{EnvError, EnvParser};
pub use source::{ConfigSource, ConfigValueSource, Sourced};
pub use validate::{ConfigWarning, Severity, validate_config};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::types::TestConfig;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_REFRESH_INTERVAL_MS: u64 = 5000;

/// How overlapping result refreshes are applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshOrdering {
    /// The last response to arrive wins, even if it was requested earlier.
    #[default]
    LastArrival,
    /// Responses older than the last applied one are discarded.
    Sequenced,
}

impl FromStr for RefreshOrdering {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "last_arrival" => Ok(Self::LastArrival),
            "sequenced" => Ok(Self::Sequenced),
            other => Err(format!("unknown refresh ordering '{other}'")),
        }
    }
}

impl std::fmt::Display for RefreshOrdering {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LastArrival => write!(f, "last_arrival"),
            Self::Sequenced => write!(f, "sequenced"),
        }
    }
}

/// Errors loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid environment configuration: {0}")]
    Env(String),
}

/// Defaults pre-filled into the run configuration form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchDefaults {
    #[serde(default)]
    pub device_path: String,
    #[serde(default)]
    pub extra_devices: Vec<String>,
}

/// Effective dashboard configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Live channel endpoint; derived from `api_url` when unset.
    #[serde(default)]
    pub ws_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
    #[serde(default)]
    pub refresh_ordering: RefreshOrdering,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub defaults: LaunchDefaults,
}

impl Default for DashConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            ws_url: None,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            refresh_interval_ms: DEFAULT_REFRESH_INTERVAL_MS,
            refresh_ordering: RefreshOrdering::default(),
            log_level: default_log_level(),
            defaults: LaunchDefaults::default(),
        }
    }
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_refresh_interval_ms() -> u64 {
    DEFAULT_REFRESH_INTERVAL_MS
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Configuration with the source of each key.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: DashConfig,
    pub sources: ConfigValueSource,
    pub file: Option<PathBuf>,
}

impl DashConfig {
    /// Effective live channel URL.
    ///
    /// Without an explicit `ws_url`, the API URL scheme is mapped
    /// (`http`→`ws`, `https`→`wss`) and the path replaced with `/ws`.
    pub fn live_url(&self) -> String {
        if let Some(ws) = self.ws_url.as_deref().filter(|s| !s.is_empty()) {
            return ws.to_string();
        }
        match Url::parse(&self.api_url) {
            Ok(mut url) => {
                let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
                // set_scheme only fails between special/non-special schemes;
                // http(s) -> ws(s) is always allowed.
                let _ = url.set_scheme(scheme);
                url.set_path("/ws");
                url.set_query(None);
                url.to_string()
            }
            Err(_) => format!("{}/ws", self.api_url.trim_end_matches('/')),
        }
    }

    /// Run configuration pre-filled from `[defaults]`.
    pub fn launch_defaults(&self) -> TestConfig {
        TestConfig::new(self.defaults.device_path.clone())
            .with_extra_devices(self.defaults.extra_devices.clone())
    }

    /// Parse a TOML document.
    pub fn from_toml_str(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load defaults, then the config file (explicit path or the default
    /// location if it exists), then the `DVT_*` environment.
    pub fn load(explicit: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
        let mut sources = ConfigValueSource::default();
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| default_config_path().filter(|p| p.exists()));

        let mut config = match &path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.clone(),
                    source,
                })?;
                let config = Self::from_toml_str(&raw, path)?;
                record_file_sources(&raw, path, &mut sources);
                debug!(path = %path.display(), "loaded config file");
                config
            }
            None => Self::default(),
        };

        let mut parser = EnvParser::new();
        config.apply_env(&mut parser, &mut sources);
        let errors = parser.take_errors();
        if !errors.is_empty() {
            let joined = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ConfigError::Env(joined));
        }

        Ok(LoadedConfig {
            config,
            sources,
            file: path,
        })
    }

    /// Overlay `DVT_*` environment variables.
    pub fn apply_env(&mut self, parser: &mut EnvParser, sources: &mut ConfigValueSource) {
        let api_url = parser.get_optional_string("API_URL");
        if let Some(value) = api_url.value {
            self.api_url = value;
            sources.set("api_url", ConfigSource::Environment);
        }

        let ws_url = parser.get_optional_string("WS_URL");
        if let Some(value) = ws_url.value {
            self.ws_url = Some(value);
            sources.set("ws_url", ConfigSource::Environment);
        }

        let timeout = parser.get_u64_range("REQUEST_TIMEOUT_SECS", self.request_timeout_secs, 1, 300);
        if timeout.is_from_env() {
            self.request_timeout_secs = timeout.value;
            sources.set("request_timeout_secs", ConfigSource::Environment);
        }

        let refresh =
            parser.get_u64_range("REFRESH_INTERVAL_MS", self.refresh_interval_ms, 250, 600_000);
        if refresh.is_from_env() {
            self.refresh_interval_ms = refresh.value;
            sources.set("refresh_interval_ms", ConfigSource::Environment);
        }

        let ordering = parser.get_parsed(
            "REFRESH_ORDERING",
            self.refresh_ordering,
            "last_arrival or sequenced",
        );
        if ordering.is_from_env() {
            self.refresh_ordering = ordering.value;
            sources.set("refresh_ordering", ConfigSource::Environment);
        }

        let level = parser.get_log_level("LOG_LEVEL", &self.log_level);
        if level.is_from_env() {
            self.log_level = level.value;
            sources.set("log_level", ConfigSource::Environment);
        }

        let device = parser.get_optional_string("DEVICE");
        if let Some(value) = device.value {
            self.defaults.device_path = value;
            sources.set("defaults.device_path", ConfigSource::Environment);
        }

        let extra = parser.get_string_list("EXTRA_DEVICES", self.defaults.extra_devices.clone());
        if extra.is_from_env() {
            self.defaults.extra_devices = extra.value;
            sources.set("defaults.extra_devices", ConfigSource::Environment);
        }
    }
}

/// Mark keys present in the file as file-sourced.
fn record_file_sources(raw: &str, path: &Path, sources: &mut ConfigValueSource) {
    let Ok(table) = toml::from_str::<toml::Table>(raw) else {
        return;
    };
    for (key, value) in &table {
        match value.as_table() {
            Some(inner) => {
                for nested in inner.keys() {
                    sources.set(&format!("{key}.{nested}"), ConfigSource::File(path.to_path_buf()));
                }
            }
            None => sources.set(key, ConfigSource::File(path.to_path_buf())),
        }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "dvt-dash")
}

/// `$XDG_CONFIG_HOME/dvt-dash/config.toml` (or the platform equivalent).
pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Directory for the dashboard's log file.
pub fn log_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| {
            dirs.state_dir()
                .unwrap_or_else(|| dirs.data_local_dir())
                .to_path_buf()
        })
        .or_else(|| dirs::home_dir().map(|home| home.join(".dvt-dash")))
        .unwrap_or_else(std::env::temp_dir)
}

#[cfg(test)]
pub(crate) fn env_test_lock() -> std::sync::MutexGuard<'static, ()> {
    use std::sync::{Mutex, OnceLock};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

//! Source tracking for configuration values.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Where a configuration value came from, lowest precedence first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum ConfigSource {
    Default,
    File(PathBuf),
    Environment,
    CommandLine,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::File(path) => write!(f, "file ({})", path.display()),
            Self::Environment => write!(f, "environment"),
            Self::CommandLine => write!(f, "command line"),
        }
    }
}

/// A value together with its source.
#[derive(Debug, Clone, PartialEq)]
pub struct Sourced<T> {
    pub value: T,
    pub source: ConfigSource,
    /// Environment variable name, when the value came from the environment.
    pub env_var: Option<String>,
}

impl<T> Sourced<T> {
    pub fn default_value(value: T) -> Self {
        Self {
            value,
            source: ConfigSource::Default,
            env_var: None,
        }
    }

    pub fn from_env(value: T, var_name: String) -> Self {
        Self {
            value,
            source: ConfigSource::Environment,
            env_var: Some(var_name),
        }
    }

    pub fn is_from_env(&self) -> bool {
        self.source == ConfigSource::Environment
    }
}

/// Sources of the effective configuration, keyed by config key.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigValueSource {
    entries: Vec<(String, ConfigSource)>,
}

impl ConfigValueSource {
    /// Record (or overwrite) the source of `key`.
    pub fn set(&mut self, key: &str, source: ConfigSource) {
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| k == key) {
            entry.1 = source;
        } else {
            self.entries.push((key.to_string(), source));
        }
    }

    pub fn get(&self, key: &str) -> &ConfigSource {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, source)| source)
            .unwrap_or(&ConfigSource::Default)
    }
}

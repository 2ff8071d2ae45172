//! Startup validation of the effective configuration.

use serde::Serialize;
use std::fmt;
use url::Url;

use super::DashConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A problem found in the configuration. None of these stop the dashboard;
/// they are logged and shown by `config show`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigWarning {
    pub key: &'static str,
    pub message: String,
    pub severity: Severity,
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "[{tag}] {}: {}", self.key, self.message)
    }
}

pub fn validate_config(config: &DashConfig) -> Vec<ConfigWarning> {
    let mut warnings = Vec::new();

    match Url::parse(&config.api_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        Ok(url) => warnings.push(ConfigWarning {
            key: "api_url",
            message: format!("unsupported scheme '{}', expected http or https", url.scheme()),
            severity: Severity::Error,
        }),
        Err(err) => warnings.push(ConfigWarning {
            key: "api_url",
            message: format!("not a valid URL: {err}"),
            severity: Severity::Error,
        }),
    }

    if let Some(ws) = config.ws_url.as_deref().filter(|s| !s.is_empty()) {
        match Url::parse(ws) {
            Ok(url) if matches!(url.scheme(), "ws" | "wss") => {}
            Ok(url) => warnings.push(ConfigWarning {
                key: "ws_url",
                message: format!("unsupported scheme '{}', expected ws or wss", url.scheme()),
                severity: Severity::Error,
            }),
            Err(err) => warnings.push(ConfigWarning {
                key: "ws_url",
                message: format!("not a valid URL: {err}"),
                severity: Severity::Error,
            }),
        }
    }

    if config.defaults.device_path.trim().is_empty() {
        warnings.push(ConfigWarning {
            key: "defaults.device_path",
            message: "no default device; set one in the Config panel or with --device".to_string(),
            severity: Severity::Info,
        });
    }

    if !(250..=600_000).contains(&config.refresh_interval_ms) {
        warnings.push(ConfigWarning {
            key: "refresh_interval_ms",
            message: format!(
                "{} is outside 250..=600000; polling will be clamped",
                config.refresh_interval_ms
            ),
            severity: Severity::Warning,
        });
    }

    warnings
}

//! Wire types served by the test-execution backend.
//!
//! Field names follow the backend's snake_case JSON. Timestamps are accepted
//! either as RFC 3339 or as naive ISO-8601 (taken as UTC), since the backend
//! stamps runs with local naive times.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::catalog::TestCategory;

/// Opaque identifier the backend assigns to a run.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestId(pub String);

impl TestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TestId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Status of a run. The vocabulary is open: anything the dashboard does not
/// recognize is kept verbatim and treated as pending.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TestStatus {
    Running,
    Completed,
    Failed,
    Unknown(String),
}

impl TestStatus {
    /// `completed` and `failed` are terminal; no further transitions follow.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Unknown(raw) => raw.as_str(),
        }
    }

    /// Short label for display; unknown statuses render as pending.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Completed => "PASSED",
            Self::Failed => "FAILED",
            Self::Unknown(_) => "PENDING",
        }
    }
}

impl From<String> for TestStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "running" => Self::Running,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::Unknown(value),
        }
    }
}

impl From<TestStatus> for String {
    fn from(value: TestStatus) -> Self {
        match value {
            TestStatus::Unknown(raw) => raw,
            other => other.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One executed or executing run, as reported by `GET /api/test-results`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    #[serde(rename = "test_id")]
    pub id: TestId,
    #[serde(rename = "test_category")]
    pub category: String,
    pub test_type: String,
    pub status: TestStatus,
    #[serde(with = "timestamp")]
    pub start_time: DateTime<Utc>,
    #[serde(default, with = "optional_timestamp")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(rename = "results", default)]
    pub result_payload: Map<String, Value>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl TestResult {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Error text, only when the run reached a terminal status.
    pub fn terminal_error(&self) -> Option<&str> {
        if self.is_terminal() {
            self.error_message.as_deref()
        } else {
            None
        }
    }

    /// Wall time of a finished run.
    pub fn duration(&self) -> Option<chrono::Duration> {
        if !self.is_terminal() {
            return None;
        }
        self.end_time.map(|end| end - self.start_time)
    }
}

/// Parse a backend timestamp: RFC 3339, or naive ISO-8601 taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

mod timestamp {
    use super::*;

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(de)?;
        parse_timestamp(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{raw}'")))
    }
}

mod optional_timestamp {
    use super::*;

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        ser: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(dt) => ser.serialize_some(&dt.to_rfc3339()),
            None => ser.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        de: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<String>::deserialize(de)? {
            Some(raw) => parse_timestamp(&raw)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{raw}'"))),
            None => Ok(None),
        }
    }
}

/// Rejected before submission; everything else is left to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TestConfigError {
    #[error("primary device path is empty")]
    EmptyDevicePath,
    #[error("invalid test parameter '{0}': expected key=value")]
    InvalidParameter(String),
}

/// Operator-editable run configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestConfig {
    pub ssd_device_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssd_devices: Option<Vec<String>>,
    #[serde(default)]
    pub test_parameters: Map<String, Value>,
}

impl TestConfig {
    pub fn new(device_path: impl Into<String>) -> Self {
        Self {
            ssd_device_path: device_path.into(),
            ..Self::default()
        }
    }

    /// Extra devices for multi-device/RAID runs. An empty list clears them.
    #[must_use]
    pub fn with_extra_devices(mut self, devices: Vec<String>) -> Self {
        self.set_extra_devices(devices);
        self
    }

    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.test_parameters.insert(key.into(), value);
        self
    }

    pub fn set_extra_devices(&mut self, devices: Vec<String>) {
        let devices: Vec<String> = devices
            .into_iter()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .collect();
        self.ssd_devices = if devices.is_empty() {
            None
        } else {
            Some(devices)
        };
    }

    pub fn extra_devices(&self) -> &[String] {
        self.ssd_devices.as_deref().unwrap_or_default()
    }

    /// Parse and insert a `key=value` parameter. Values that parse as JSON
    /// (numbers, booleans, arrays) keep their type; anything else is a string.
    pub fn insert_parameter(&mut self, spec: &str) -> Result<(), TestConfigError> {
        let (key, value) = parse_parameter(spec)?;
        self.test_parameters.insert(key, value);
        Ok(())
    }

    pub fn validate(&self) -> Result<(), TestConfigError> {
        if self.ssd_device_path.trim().is_empty() {
            return Err(TestConfigError::EmptyDevicePath);
        }
        Ok(())
    }
}

/// Split a `key=value` parameter.
pub fn parse_parameter(spec: &str) -> Result<(String, Value), TestConfigError> {
    let (key, raw) = spec
        .split_once('=')
        .ok_or_else(|| TestConfigError::InvalidParameter(spec.to_string()))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(TestConfigError::InvalidParameter(spec.to_string()));
    }
    let raw = raw.trim();
    let value =
        serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

/// Body of `POST /api/compatibility/{category}/test`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchRequest {
    pub test_category: String,
    pub test_type: String,
    pub config: TestConfig,
}

impl LaunchRequest {
    pub fn new(category: TestCategory, config: TestConfig) -> Self {
        Self {
            test_category: "compatibility".to_string(),
            test_type: category.test_type().to_string(),
            config,
        }
    }
}

/// Acknowledgement for a launch. It does not mean the run has started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchAck {
    pub test_id: TestId,
    #[serde(default)]
    pub status: String,
}

/// One entry of `GET /api/compatibility/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleStatus {
    pub status: String,
    #[serde(default)]
    pub module: String,
}

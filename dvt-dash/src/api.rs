//! HTTP client for the test-execution backend's command/query API.

use dvt_common::{LaunchAck, LaunchRequest, ModuleStatus, TestCategory, TestId, TestResult};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// Errors from the command/query API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid API URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}: {body}")]
    Status { url: String, status: u16, body: String },

    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("test result '{0}' not found")]
    NotFound(TestId),
}

impl ApiError {
    /// Failures that may go away on their own (connectivity, timeouts, 5xx).
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Decode snapshot records one by one, dropping the ones that fail.
fn decode_results(records: Vec<Value>) -> Vec<TestResult> {
    let total = records.len();
    let results: Vec<TestResult> = records
        .into_iter()
        .enumerate()
        .filter_map(|(index, record)| {
            let id = record.get("test_id").and_then(Value::as_str).map(str::to_string);
            match serde_json::from_value(record) {
                Ok(result) => Some(result),
                Err(err) => {
                    warn!(index, id = ?id, error = %err, "skipping undecodable test result");
                    None
                }
            }
        })
        .collect();
    if results.len() < total {
        debug!(kept = results.len(), total, "partial result snapshot");
    }
    results
}

/// Client for `/api/...` on the backend.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let base = Url::parse(base_url).map_err(|err| ApiError::InvalidUrl {
            url: base_url.to_string(),
            reason: err.to_string(),
        })?;
        if base.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl {
                url: base_url.to_string(),
                reason: "URL cannot be used as a base".to_string(),
            });
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ApiError::Client)?;
        Ok(Self { http, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Append path segments to the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn read_json<T: DeserializeOwned>(
        url: &Url,
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = response.status();
        let body = response.bytes().await.map_err(|source| ApiError::Transport {
            url: url.to_string(),
            source,
        })?;
        if !status.is_success() {
            return Err(ApiError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        serde_json::from_slice(&body).map_err(|source| ApiError::Decode {
            url: url.to_string(),
            source,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, ApiError> {
        let url = self.endpoint(segments);
        debug!(%url, "GET");
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                url: url.to_string(),
                source,
            })?;
        Self::read_json(&url, response).await
    }

    /// `GET /api/test-results`: full snapshot, no pagination.
    ///
    /// Records that do not decode are skipped so one bad row cannot keep the
    /// cache stale. A body that is not a JSON array is still an error.
    pub async fn list_results(&self) -> Result<Vec<TestResult>, ApiError> {
        let records: Vec<Value> = self.get_json(&["api", "test-results"]).await?;
        Ok(decode_results(records))
    }

    /// `GET /api/test-results/{id}`.
    pub async fn get_result(&self, id: &TestId) -> Result<TestResult, ApiError> {
        match self.get_json(&["api", "test-results", id.as_str()]).await {
            Err(ApiError::Status { status: 404, .. }) => Err(ApiError::NotFound(id.clone())),
            other => other,
        }
    }

    /// `POST /api/compatibility/{category}/test`.
    ///
    /// The acknowledgement does not mean the run has started; only the live
    /// channel reports that.
    pub async fn launch(
        &self,
        category: TestCategory,
        request: &LaunchRequest,
    ) -> Result<LaunchAck, ApiError> {
        let url = self.endpoint(&["api", "compatibility", category.id(), "test"]);
        debug!(%url, test_type = %request.test_type, "POST");
        let response = self
            .http
            .post(url.clone())
            .json(request)
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                url: url.to_string(),
                source,
            })?;
        Self::read_json(&url, response).await
    }

    /// `GET /api/compatibility/status`: readiness per test module.
    pub async fn module_status(&self) -> Result<BTreeMap<String, ModuleStatus>, ApiError> {
        self.get_json(&["api", "compatibility", "status"]).await
    }

    /// `GET /healthz`.
    pub async fn health(&self) -> Result<String, ApiError> {
        let body: serde_json::Value = self.get_json(&["healthz"]).await?;
        Ok(body
            .get("status")
            .and_then(|s| s.as_str())
            .unwrap_or("unknown")
            .to_string())
    }
}

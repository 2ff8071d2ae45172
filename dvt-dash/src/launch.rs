//! Submitting test runs.
//!
//! A submit only asks the backend to start a run. Nothing here touches the
//! running set; the live channel alone reports the run lifecycle.

use crate::api::{ApiClient, ApiError};
use crate::live::{LiveChannel, LiveMessage};
use crate::reconciler::Reconciler;
use dvt_common::types::TestConfigError;
use dvt_common::{
    LaunchAck, LaunchRequest, LiveEvent, RunOutcome, TestCategory, TestConfig, TestResult,
};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("invalid test configuration: {0}")]
    InvalidConfig(#[from] TestConfigError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("live channel closed before {test_id} finished{}", close_reason(.reason))]
    ChannelClosed {
        test_id: String,
        reason: Option<String>,
    },

    #[error("timed out after {0:?} waiting for the run to finish")]
    TimedOut(Duration),
}

fn close_reason(reason: &Option<String>) -> String {
    reason
        .as_deref()
        .map(|r| format!(": {r}"))
        .unwrap_or_default()
}

/// Validate `config` and submit a run of `category`.
pub async fn launch_test(
    api: &ApiClient,
    category: TestCategory,
    config: &TestConfig,
) -> Result<LaunchAck, LaunchError> {
    config.validate()?;
    let request = LaunchRequest::new(category, config.clone());
    info!(
        category = %category,
        device = %config.ssd_device_path,
        extra_devices = config.extra_devices().len(),
        "submitting test run"
    );
    match api.launch(category, &request).await {
        Ok(ack) => {
            info!(test_id = %ack.test_id, status = %ack.status, "run accepted");
            Ok(ack)
        }
        Err(err) => {
            warn!(category = %category, error = %err, "launch failed");
            Err(err.into())
        }
    }
}

/// Result of [`launch_and_wait`].
#[derive(Debug, Clone)]
pub struct WaitOutcome {
    pub ack: LaunchAck,
    pub outcome: RunOutcome,
    /// The run's entry from the refreshed results, if the backend has it.
    pub result: Option<TestResult>,
}

impl WaitOutcome {
    pub fn failed(&self) -> bool {
        self.outcome.is_failure()
    }
}

/// Submit a run and follow the live channel until it terminates.
///
/// `live` must already be open so that no transition of the new run is
/// missed. Every event seen along the way is folded into `reconciler`, and
/// each refresh it asks for is performed inline.
pub async fn launch_and_wait(
    api: &ApiClient,
    live: &mut LiveChannel,
    reconciler: &mut Reconciler,
    category: TestCategory,
    config: &TestConfig,
    timeout: Option<Duration>,
) -> Result<WaitOutcome, LaunchError> {
    let ack = launch_test(api, category, config).await?;
    let follow = follow_run(api, live, reconciler, &ack);
    let outcome = match timeout {
        Some(limit) => tokio::time::timeout(limit, follow)
            .await
            .map_err(|_| LaunchError::TimedOut(limit))??,
        None => follow.await?,
    };
    let result = reconciler.results().find(&ack.test_id).cloned();
    Ok(WaitOutcome {
        ack,
        outcome,
        result,
    })
}

async fn follow_run(
    api: &ApiClient,
    live: &mut LiveChannel,
    reconciler: &mut Reconciler,
    ack: &LaunchAck,
) -> Result<RunOutcome, LaunchError> {
    loop {
        match live.recv().await {
            Some(LiveMessage::Event(event)) => {
                let ticket = reconciler.handle_event(&event);
                if let Some(ticket) = ticket {
                    let fetched = api.list_results().await;
                    reconciler.apply_refresh(ticket, fetched);
                }
                if let LiveEvent::Terminated {
                    test_id, outcome, ..
                } = event
                    && test_id == ack.test_id
                {
                    return Ok(outcome);
                }
                debug!(test_id = %ack.test_id, "still waiting");
            }
            Some(LiveMessage::Closed { reason }) => {
                return Err(LaunchError::ChannelClosed {
                    test_id: ack.test_id.to_string(),
                    reason,
                });
            }
            None => {
                return Err(LaunchError::ChannelClosed {
                    test_id: ack.test_id.to_string(),
                    reason: None,
                });
            }
        }
    }
}

use std::time::Duration;

use dvt_common::{RefreshOrdering, RunOutcome, TestCategory, TestConfig, TestStatus};
use dvt_dash::api::ApiClient;
use dvt_dash::reconciler::Reconciler;
use dvt_dash::{LaunchError, LiveChannel, launch_and_wait};
use serde_json::json;

use crate::common::mock_backend::sample_results;
use crate::common::{MockBackend, RunScript, init_test_logging};

struct Harness {
    backend: MockBackend,
    api: ApiClient,
    live: LiveChannel,
    reconciler: Reconciler,
}

async fn harness(script: RunScript) -> Harness {
    let backend = MockBackend::with_results(sample_results()).await;
    backend.set_script(script);
    let api = ApiClient::new(&backend.api_url(), Duration::from_secs(5)).unwrap();
    let live = LiveChannel::connect(&backend.ws_url()).await.unwrap();
    Harness {
        backend,
        api,
        live,
        reconciler: Reconciler::new(RefreshOrdering::Sequenced),
    }
}

#[tokio::test]
async fn test_launch_and_wait_completes() {
    init_test_logging();
    crate::test_log!("TEST START: test_launch_and_wait_completes");

    let mut h = harness(RunScript::Complete).await;
    let outcome = launch_and_wait(
        &h.api,
        &mut h.live,
        &mut h.reconciler,
        TestCategory::BootDrive,
        &TestConfig::new("/dev/sda"),
        Some(Duration::from_secs(10)),
    )
    .await
    .unwrap();

    assert!(!outcome.failed());
    assert!(matches!(outcome.outcome, RunOutcome::Completed { results: Some(_) }));
    let result = outcome.result.expect("refreshed result for the run");
    assert_eq!(result.id, outcome.ack.test_id);
    assert_eq!(result.status, TestStatus::Completed);

    assert!(!h.reconciler.is_running("boot-drive"));
    assert!(h.reconciler.active().is_empty());
    assert_eq!(
        h.reconciler.latest_result_for("boot_drive").map(|r| &r.id),
        Some(&outcome.ack.test_id)
    );
    assert_eq!(h.reconciler.results().as_slice(), h.backend.results().as_slice());
    assert_eq!(h.reconciler.results().as_slice().len(), 4);
    crate::test_log!("TEST PASS: test_launch_and_wait_completes");
}

#[tokio::test]
async fn test_launch_and_wait_reports_failure() {
    init_test_logging();
    let mut h = harness(RunScript::Fail("Device not found".to_string())).await;

    let outcome = launch_and_wait(
        &h.api,
        &mut h.live,
        &mut h.reconciler,
        TestCategory::DataDrive,
        &TestConfig::new("/dev/nvme0n1"),
        Some(Duration::from_secs(10)),
    )
    .await
    .unwrap();

    assert!(outcome.failed());
    assert_eq!(
        outcome.outcome,
        RunOutcome::Failed {
            error: Some("Device not found".to_string())
        }
    );
    let result = outcome.result.unwrap();
    assert_eq!(result.status, TestStatus::Failed);
    assert_eq!(result.terminal_error(), Some("Device not found"));
    assert!(!h.reconciler.is_running("data-drive"));
}

#[tokio::test]
async fn test_wait_ignores_other_runs() {
    init_test_logging();
    let mut h = harness(RunScript::Complete).await;

    // Another client's certification run finishes while ours is in flight.
    h.backend.push_event(json!({"type": "test_started", "test_id": "certification_9"}));
    h.backend.push_event(json!({"type": "test_completed", "test_id": "certification_9"}));
    h.backend.push_event(json!({"type": "test_started", "test_id": "boot_drive_9"}));

    let outcome = launch_and_wait(
        &h.api,
        &mut h.live,
        &mut h.reconciler,
        TestCategory::SystemRobustness,
        &TestConfig::new("/dev/sdb"),
        Some(Duration::from_secs(10)),
    )
    .await
    .unwrap();

    assert!(outcome.ack.test_id.as_str().starts_with("system_robustness_"));
    assert!(!h.reconciler.is_running("certification"));
    assert!(!h.reconciler.is_running("system-robustness"));
    assert!(h.reconciler.is_running("boot-drive"));
}

#[tokio::test]
async fn test_wait_times_out_with_run_still_active() {
    init_test_logging();
    let mut h = harness(RunScript::Hang).await;

    let err = launch_and_wait(
        &h.api,
        &mut h.live,
        &mut h.reconciler,
        TestCategory::Certification,
        &TestConfig::new("/dev/sdc"),
        Some(Duration::from_millis(500)),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, LaunchError::TimedOut(_)));
    assert!(h.reconciler.is_running("certification"));
}

#[tokio::test]
async fn test_wait_fails_when_channel_closes() {
    init_test_logging();
    let mut h = harness(RunScript::Hang).await;
    let backend = h.backend.clone();
    let config = TestConfig::new("/dev/sda");

    let (waited, ()) = tokio::join!(
        launch_and_wait(
            &h.api,
            &mut h.live,
            &mut h.reconciler,
            TestCategory::BootDrive,
            &config,
            Some(Duration::from_secs(10)),
        ),
        async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            backend.close_live("backend restarting");
        }
    );

    match waited.unwrap_err() {
        LaunchError::ChannelClosed { reason, .. } => {
            assert_eq!(reason.as_deref(), Some("backend restarting"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn test_invalid_config_is_never_submitted() {
    init_test_logging();
    let mut h = harness(RunScript::Complete).await;

    let err = launch_and_wait(
        &h.api,
        &mut h.live,
        &mut h.reconciler,
        TestCategory::BootDrive,
        &TestConfig::new(""),
        Some(Duration::from_secs(1)),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, LaunchError::InvalidConfig(_)));
    assert!(h.backend.launches().is_empty());
}

use std::time::Duration;

use dvt_common::{TestCategory, TestConfig, TestId, TestStatus};
use dvt_dash::api::{ApiClient, ApiError};
use dvt_dash::reconciler::Reconciler;
use dvt_dash::{LaunchError, RefreshApplied, launch_test};

use crate::common::mock_backend::sample_results;
use crate::common::{MockBackend, RunScript, init_test_logging};

fn client(backend: &MockBackend) -> ApiClient {
    ApiClient::new(&backend.api_url(), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_list_results_returns_full_snapshot() {
    init_test_logging();
    crate::test_log!("TEST START: test_list_results_returns_full_snapshot");

    let backend = MockBackend::with_results(sample_results()).await;
    let results = client(&backend).list_results().await.unwrap();

    assert_eq!(results.len(), 3);
    let failed = results
        .iter()
        .find(|r| r.id.as_str() == "data_drive_2")
        .unwrap();
    assert_eq!(failed.status, TestStatus::Failed);
    assert_eq!(failed.terminal_error(), Some("Device not found"));
    crate::test_log!("TEST PASS: test_list_results_returns_full_snapshot");
}

#[tokio::test]
async fn test_get_result_found_and_missing() {
    init_test_logging();
    let backend = MockBackend::with_results(sample_results()).await;
    let api = client(&backend);

    let result = api.get_result(&TestId::new("boot_drive_1")).await.unwrap();
    assert_eq!(result.test_type, "boot_drive");
    assert_eq!(
        result.result_payload["ubuntu"]["boot_success"],
        serde_json::json!(true)
    );

    let err = api.get_result(&TestId::new("boot_drive_404")).await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(ref id) if id.as_str() == "boot_drive_404"));
}

#[tokio::test]
async fn test_launch_posts_category_request() {
    init_test_logging();
    let backend = MockBackend::start().await;
    backend.set_script(RunScript::Hang);
    let api = client(&backend);

    let config = TestConfig::new("/dev/nvme0n1")
        .with_extra_devices(vec!["/dev/nvme1n1".to_string()])
        .with_parameter("raid_level", serde_json::json!("raid_5"));
    let ack = launch_test(&api, TestCategory::DataDrive, &config)
        .await
        .unwrap();

    assert!(ack.test_id.as_str().starts_with("data_drive_"));
    assert_eq!(ack.status, "started");

    let launches = backend.launches();
    assert_eq!(launches.len(), 1);
    assert_eq!(launches[0].test_category, "compatibility");
    assert_eq!(launches[0].test_type, "data_drive");
    assert_eq!(launches[0].config.ssd_device_path, "/dev/nvme0n1");
    assert_eq!(launches[0].config.extra_devices(), ["/dev/nvme1n1".to_string()]);
}

#[tokio::test]
async fn test_rejected_launch_is_reported_and_changes_nothing() {
    init_test_logging();
    let backend = MockBackend::start().await;
    backend.reject_launches();
    let api = client(&backend);
    let reconciler = Reconciler::default();

    let err = launch_test(&api, TestCategory::BootDrive, &TestConfig::new("/dev/sda"))
        .await
        .unwrap_err();

    match err {
        LaunchError::Api(ApiError::Status { status, ref body, .. }) => {
            assert_eq!(status, 500);
            assert!(body.contains("device busy"));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(!reconciler.is_running("boot-drive"));
}

#[tokio::test]
async fn test_refresh_replaces_cache_from_backend() {
    init_test_logging();
    let backend = MockBackend::with_results(sample_results()).await;
    let api = client(&backend);
    let mut reconciler = Reconciler::default();

    let applied = reconciler.refresh_results(&api).await;
    assert_eq!(applied, RefreshApplied::Applied { count: 3 });

    let latest = reconciler.latest_result_for("data_drive").unwrap();
    assert_eq!(latest.id.as_str(), "data_drive_2");
    assert_eq!(latest.status, TestStatus::Failed);
    assert!(reconciler.latest_result_for("certification").is_none());
}

#[tokio::test]
async fn test_module_status_and_health() {
    init_test_logging();
    let backend = MockBackend::start().await;
    let api = client(&backend);

    assert_eq!(api.health().await.unwrap(), "ok");
    let modules = api.module_status().await.unwrap();
    assert_eq!(modules.len(), TestCategory::ALL.len());
    assert_eq!(modules["boot_drive"].status, "ready");
}

#[tokio::test]
async fn test_unreachable_backend_is_transient() {
    init_test_logging();
    let api = ApiClient::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
    let err = api.list_results().await.unwrap_err();
    assert!(err.is_transient(), "expected transient error, got {err:?}");
}

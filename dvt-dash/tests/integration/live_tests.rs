use std::time::Duration;

use dvt_common::{LiveEvent, RunOutcome, TestId};
use dvt_dash::reconciler::Reconciler;
use dvt_dash::{LiveChannel, LiveMessage};
use serde_json::json;

use crate::common::{MockBackend, init_test_logging};

async fn next(live: &mut LiveChannel) -> LiveMessage {
    tokio::time::timeout(Duration::from_secs(5), live.recv())
        .await
        .expect("no live message within 5s")
        .expect("live channel ended")
}

#[tokio::test]
async fn test_events_arrive_in_order_and_noise_is_skipped() {
    init_test_logging();
    crate::test_log!("TEST START: test_events_arrive_in_order_and_noise_is_skipped");

    let backend = MockBackend::start().await;
    let mut live = LiveChannel::connect(&backend.ws_url()).await.unwrap();

    backend.push_raw("Message received: ping");
    backend.push_event(json!({"type": "test_progress", "test_id": "boot_drive_17"}));
    backend.push_event(json!({"type": "test_started", "test_id": "boot_drive_17", "test_type": "boot_drive"}));
    backend.push_event(json!({"type": "test_started"}));
    backend.push_event(json!({"type": "test_failed", "test_id": "boot_drive_17", "error": "Device not found"}));

    assert_eq!(
        next(&mut live).await,
        LiveMessage::Event(LiveEvent::Started {
            test_id: TestId::new("boot_drive_17"),
            test_type: Some("boot_drive".to_string()),
        })
    );
    match next(&mut live).await {
        LiveMessage::Event(LiveEvent::Terminated {
            test_id, outcome, ..
        }) => {
            assert_eq!(test_id.as_str(), "boot_drive_17");
            assert_eq!(
                outcome,
                RunOutcome::Failed {
                    error: Some("Device not found".to_string())
                }
            );
        }
        other => panic!("unexpected message {other:?}"),
    }
    assert!(live.try_recv().is_none());
    crate::test_log!("TEST PASS: test_events_arrive_in_order_and_noise_is_skipped");
}

#[tokio::test]
async fn test_server_close_reports_reason() {
    init_test_logging();
    let backend = MockBackend::start().await;
    let mut live = LiveChannel::connect(&backend.ws_url()).await.unwrap();

    backend.close_live("backend restarting");

    assert_eq!(
        next(&mut live).await,
        LiveMessage::Closed {
            reason: Some("backend restarting".to_string())
        }
    );
    let end = tokio::time::timeout(Duration::from_secs(5), live.recv())
        .await
        .unwrap();
    assert!(end.is_none());
}

#[tokio::test]
async fn test_burst_of_events_drives_reconciler() {
    init_test_logging();
    let backend = MockBackend::start().await;
    let mut live = LiveChannel::connect(&backend.ws_url()).await.unwrap();
    let mut reconciler = Reconciler::default();

    for n in 0..20 {
        backend.push_event(json!({"type": "test_started", "test_id": format!("data_drive_{n}")}));
    }
    for n in (0..20).step_by(2) {
        backend.push_event(json!({"type": "test_completed", "test_id": format!("data_drive_{n}")}));
    }

    let mut refreshes = 0;
    for _ in 0..30 {
        match next(&mut live).await {
            LiveMessage::Event(event) => {
                if reconciler.handle_event(&event).is_some() {
                    refreshes += 1;
                }
            }
            LiveMessage::Closed { reason } => panic!("channel closed early: {reason:?}"),
        }
    }

    assert_eq!(refreshes, 10);
    assert_eq!(reconciler.active().len(), 10);
    assert!(reconciler.is_running("data-drive"));
    assert!(!reconciler.is_running("boot-drive"));
    assert!(reconciler.active().contains(&TestId::new("data_drive_1")));
    assert!(!reconciler.active().contains(&TestId::new("data_drive_0")));
}

#[tokio::test]
async fn test_two_clients_see_the_same_events() {
    init_test_logging();
    let backend = MockBackend::start().await;
    let mut first = LiveChannel::connect(&backend.ws_url()).await.unwrap();
    let mut second = LiveChannel::connect(&backend.ws_url()).await.unwrap();

    backend.push_event(json!({"type": "test_started", "test_id": "certification_3"}));

    for live in [&mut first, &mut second] {
        match next(live).await {
            LiveMessage::Event(event) => assert_eq!(event.test_id().as_str(), "certification_3"),
            other => panic!("unexpected message {other:?}"),
        }
    }
    first.close().await;
}

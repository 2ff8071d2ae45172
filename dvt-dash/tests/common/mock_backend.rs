//! In-process stand-in for the test-execution backend.
//!
//! Serves the results API, the launch endpoint and the `/ws` live channel on
//! an ephemeral port. Launched runs are driven by a [`RunScript`]: the mock
//! records a `running` result, pushes `test_started`, then (unless told to
//! hang) updates the result and pushes the terminal event.

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{TimeZone, Utc};
use dvt_common::{
    LaunchAck, LaunchRequest, ModuleStatus, TestCategory, TestId, TestResult, TestStatus,
};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

/// Pause between a run's transitions.
const STEP: Duration = Duration::from_millis(30);

/// How launched runs end.
#[derive(Debug, Clone, PartialEq)]
pub enum RunScript {
    Complete,
    Fail(String),
    /// `test_started` and nothing after it.
    Hang,
}

#[derive(Debug, Clone)]
enum Frame {
    Text(String),
    Close(String),
}

struct Inner {
    results: Mutex<Vec<TestResult>>,
    launches: Mutex<Vec<LaunchRequest>>,
    script: Mutex<RunScript>,
    reject_launches: AtomicBool,
    next_run: AtomicU64,
    frames: broadcast::Sender<Frame>,
}

impl Inner {
    fn push(&self, frame: Frame) {
        // No subscribers is fine; the event is simply unseen.
        let _ = self.frames.send(frame);
    }
}

#[derive(Clone)]
pub struct MockBackend {
    inner: Arc<Inner>,
    addr: SocketAddr,
}

impl MockBackend {
    pub async fn start() -> Self {
        Self::with_results(Vec::new()).await
    }

    pub async fn with_results(results: Vec<TestResult>) -> Self {
        let (frames, _) = broadcast::channel(64);
        let inner = Arc::new(Inner {
            results: Mutex::new(results),
            launches: Mutex::new(Vec::new()),
            script: Mutex::new(RunScript::Complete),
            reject_launches: AtomicBool::new(false),
            next_run: AtomicU64::new(100),
            frames,
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = create_router(inner.clone());
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Self { inner, addr }
    }

    pub fn api_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn set_script(&self, script: RunScript) {
        *self.inner.script.lock().unwrap() = script;
    }

    /// Answer every launch with HTTP 500.
    pub fn reject_launches(&self) {
        self.inner.reject_launches.store(true, Ordering::SeqCst);
    }

    pub fn launches(&self) -> Vec<LaunchRequest> {
        self.inner.launches.lock().unwrap().clone()
    }

    pub fn results(&self) -> Vec<TestResult> {
        self.inner.results.lock().unwrap().clone()
    }

    /// Send a raw text frame to every connected live client.
    pub fn push_raw(&self, text: impl Into<String>) {
        self.inner.push(Frame::Text(text.into()));
    }

    pub fn push_event(&self, event: Value) {
        self.push_raw(event.to_string());
    }

    /// Close every live connection with `reason`.
    pub fn close_live(&self, reason: &str) {
        self.inner.push(Frame::Close(reason.to_string()));
    }
}

/// Three finished runs: one boot drive pass, then a data drive pass followed
/// a day later by a data drive failure.
pub fn sample_results() -> Vec<TestResult> {
    let mut boot_payload = serde_json::Map::new();
    boot_payload.insert("ubuntu".to_string(), json!({"boot_success": true}));
    vec![
        TestResult {
            id: TestId::new("boot_drive_1"),
            category: "compatibility".to_string(),
            test_type: "boot_drive".to_string(),
            status: TestStatus::Completed,
            start_time: Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap(),
            end_time: Some(Utc.with_ymd_and_hms(2024, 1, 1, 9, 20, 0).unwrap()),
            result_payload: boot_payload,
            error_message: None,
        },
        TestResult {
            id: TestId::new("data_drive_1"),
            category: "compatibility".to_string(),
            test_type: "data_drive".to_string(),
            status: TestStatus::Completed,
            start_time: Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap(),
            end_time: Some(Utc.with_ymd_and_hms(2024, 1, 1, 10, 45, 0).unwrap()),
            result_payload: Default::default(),
            error_message: None,
        },
        TestResult {
            id: TestId::new("data_drive_2"),
            category: "compatibility".to_string(),
            test_type: "data_drive".to_string(),
            status: TestStatus::Failed,
            start_time: Utc.with_ymd_and_hms(2024, 1, 2, 10, 0, 0).unwrap(),
            end_time: Some(Utc.with_ymd_and_hms(2024, 1, 2, 10, 1, 5).unwrap()),
            result_payload: Default::default(),
            error_message: Some("Device not found".to_string()),
        },
    ]
}

fn create_router(inner: Arc<Inner>) -> Router {
    Router::new()
        .route("/healthz", get(health_handler))
        .route("/api/test-results", get(list_handler))
        .route("/api/test-results/{id}", get(result_handler))
        .route("/api/compatibility/status", get(status_handler))
        .route("/api/compatibility/{category}/test", post(launch_handler))
        .route("/ws", get(live_handler))
        .with_state(inner)
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn list_handler(State(inner): State<Arc<Inner>>) -> impl IntoResponse {
    Json(inner.results.lock().unwrap().clone())
}

async fn result_handler(State(inner): State<Arc<Inner>>, Path(id): Path<String>) -> Response {
    let found = inner
        .results
        .lock()
        .unwrap()
        .iter()
        .find(|r| r.id.as_str() == id)
        .cloned();
    match found {
        Some(result) => Json(result).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"detail": "Test result not found"})),
        )
            .into_response(),
    }
}

async fn status_handler() -> impl IntoResponse {
    let modules: BTreeMap<String, ModuleStatus> = TestCategory::ALL
        .iter()
        .map(|category| {
            (
                category.test_type().to_string(),
                ModuleStatus {
                    status: "ready".to_string(),
                    module: format!("{}_test", category.test_type()),
                },
            )
        })
        .collect();
    Json(modules)
}

async fn launch_handler(
    State(inner): State<Arc<Inner>>,
    Path(category): Path<String>,
    Json(request): Json<LaunchRequest>,
) -> Response {
    let Some(category) = TestCategory::from_id(&category) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"detail": "Unknown test category"})),
        )
            .into_response();
    };
    if inner.reject_launches.load(Ordering::SeqCst) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"detail": "Failed to start test: device busy"})),
        )
            .into_response();
    }

    let run = inner.next_run.fetch_add(1, Ordering::SeqCst);
    let test_id = TestId::new(format!("{}_{run}", category.test_type()));
    inner.launches.lock().unwrap().push(request);
    let script = inner.script.lock().unwrap().clone();
    tokio::spawn(drive_run(inner.clone(), test_id.clone(), category, script));

    Json(LaunchAck {
        test_id,
        status: "started".to_string(),
    })
    .into_response()
}

async fn drive_run(inner: Arc<Inner>, test_id: TestId, category: TestCategory, script: RunScript) {
    let test_type = category.test_type();
    tokio::time::sleep(STEP).await;

    inner.results.lock().unwrap().push(TestResult {
        id: test_id.clone(),
        category: "compatibility".to_string(),
        test_type: test_type.to_string(),
        status: TestStatus::Running,
        start_time: Utc::now(),
        end_time: None,
        result_payload: Default::default(),
        error_message: None,
    });
    inner.push(Frame::Text(
        json!({"type": "test_started", "test_id": test_id, "test_type": test_type}).to_string(),
    ));

    let event = match script {
        RunScript::Hang => return,
        RunScript::Complete => json!({
            "type": "test_completed",
            "test_id": test_id,
            "test_type": test_type,
            "results": {"passed": true},
        }),
        RunScript::Fail(ref error) => json!({
            "type": "test_failed",
            "test_id": test_id,
            "test_type": test_type,
            "error": error,
        }),
    };
    tokio::time::sleep(STEP).await;

    // The record is final before the terminal event goes out.
    if let Some(result) = inner
        .results
        .lock()
        .unwrap()
        .iter_mut()
        .find(|r| r.id == test_id)
    {
        result.end_time = Some(Utc::now());
        match &script {
            RunScript::Fail(error) => {
                result.status = TestStatus::Failed;
                result.error_message = Some(error.clone());
            }
            _ => {
                result.status = TestStatus::Completed;
                result
                    .result_payload
                    .insert("passed".to_string(), json!(true));
            }
        }
    }
    inner.push(Frame::Text(event.to_string()));
}

async fn live_handler(ws: WebSocketUpgrade, State(inner): State<Arc<Inner>>) -> Response {
    // Subscribe before the upgrade completes so nothing pushed after the
    // client's handshake is missed.
    let frames = inner.frames.subscribe();
    ws.on_upgrade(move |socket| forward_frames(socket, frames))
}

async fn forward_frames(mut socket: WebSocket, mut frames: broadcast::Receiver<Frame>) {
    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Ok(Frame::Text(text)) => {
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Ok(Frame::Close(reason)) => {
                    let _ = socket
                        .send(Message::Close(Some(CloseFrame {
                            code: close_code::AWAY,
                            reason: reason.into(),
                        })))
                        .await;
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}

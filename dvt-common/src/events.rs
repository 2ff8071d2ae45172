//! Live event messages pushed by the backend over the WebSocket channel.
//!
//! Messages are JSON objects `{type, test_id, ...}`. Only the run lifecycle
//! transitions matter to the dashboard; anything else (unknown types,
//! malformed JSON, missing ids) is dropped rather than treated as fatal.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::types::TestId;

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed { results: Option<Value> },
    Failed { error: Option<String> },
}

impl RunOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// A recognized lifecycle transition.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    Started {
        test_id: TestId,
        test_type: Option<String>,
    },
    Terminated {
        test_id: TestId,
        test_type: Option<String>,
        outcome: RunOutcome,
    },
}

impl LiveEvent {
    pub fn test_id(&self) -> &TestId {
        match self {
            Self::Started { test_id, .. } | Self::Terminated { test_id, .. } => test_id,
        }
    }

    /// Wire name of the event type.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Started { .. } => "test_started",
            Self::Terminated {
                outcome: RunOutcome::Completed { .. },
                ..
            } => "test_completed",
            Self::Terminated {
                outcome: RunOutcome::Failed { .. },
                ..
            } => "test_failed",
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    test_id: Option<String>,
    #[serde(default)]
    test_type: Option<Value>,
    #[serde(default)]
    results: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

/// Error detail as text. Structured errors keep their JSON form.
fn error_text(value: Option<Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

/// Parse one text frame. Returns `None` for anything that is not a
/// recognized lifecycle transition.
pub fn parse_live_message(text: &str) -> Option<LiveEvent> {
    let raw: RawMessage = match serde_json::from_str(text) {
        Ok(raw) => raw,
        Err(err) => {
            debug!(error = %err, "ignoring malformed live message");
            return None;
        }
    };

    let Some(test_id) = raw.test_id.filter(|id| !id.is_empty()).map(TestId) else {
        debug!(kind = %raw.kind, "ignoring live message without test_id");
        return None;
    };

    let test_type = match raw.test_type {
        Some(Value::String(t)) => Some(t),
        _ => None,
    };

    match raw.kind.as_str() {
        "test_started" => Some(LiveEvent::Started { test_id, test_type }),
        "test_completed" => Some(LiveEvent::Terminated {
            test_id,
            test_type,
            outcome: RunOutcome::Completed {
                results: raw.results,
            },
        }),
        "test_failed" => Some(LiveEvent::Terminated {
            test_id,
            test_type,
            outcome: RunOutcome::Failed {
                error: error_text(raw.error),
            },
        }),
        other => {
            debug!(kind = %other, "ignoring unrecognized live message type");
            None
        }
    }
}

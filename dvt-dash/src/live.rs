//! Live event channel (WebSocket `/ws`).
//!
//! The channel is a scoped resource: a reader task owns the socket and
//! forwards parsed events into an unbounded queue, so arrival order is kept
//! and no `test_started` is dropped. Dropping the channel aborts the reader.

use dvt_common::{LiveEvent, parse_live_message};
use futures::{SinkExt, StreamExt};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

const CLOSE_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum LiveError {
    #[error("failed to connect to live channel {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: Box<tokio_tungstenite::tungstenite::Error>,
    },
}

/// What the consumer of a [`LiveChannel`] receives.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveMessage {
    Event(LiveEvent),
    /// The socket ended. No further messages follow.
    Closed { reason: Option<String> },
}

/// Connection state as shown by the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ChannelState {
    #[default]
    Connecting,
    Open,
    Closed { reason: Option<String> },
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "live"),
            Self::Closed { reason: Some(reason) } => write!(f, "closed ({reason})"),
            Self::Closed { reason: None } => write!(f, "closed"),
        }
    }
}

pub struct LiveChannel {
    url: String,
    events: mpsc::UnboundedReceiver<LiveMessage>,
    shutdown: Option<oneshot::Sender<()>>,
    reader: JoinHandle<()>,
}

impl LiveChannel {
    pub async fn connect(url: &str) -> Result<Self, LiveError> {
        let (socket, _response) =
            tokio_tungstenite::connect_async(url)
                .await
                .map_err(|source| LiveError::Connect {
                    url: url.to_string(),
                    source: Box::new(source),
                })?;
        info!(url, "live channel open");

        let (tx, events) = mpsc::unbounded_channel();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let (mut sink, mut stream) = socket.split();
        let task_url = url.to_string();

        let reader = tokio::spawn(async move {
            let reason = loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        let _ = sink.send(Message::Close(None)).await;
                        break Some("closed by dashboard".to_string());
                    }
                    frame = stream.next() => match frame {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(event) = parse_live_message(text.as_str()) {
                                debug!(kind = event.kind(), test_id = %event.test_id(), "live event");
                                if tx.send(LiveMessage::Event(event)).is_err() {
                                    break None;
                                }
                            }
                        }
                        Some(Ok(Message::Binary(bytes))) => {
                            debug!(len = bytes.len(), "ignoring binary live frame");
                        }
                        Some(Ok(Message::Close(frame))) => {
                            break frame
                                .map(|f| f.reason.as_str().to_string())
                                .filter(|r| !r.is_empty());
                        }
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            warn!(url = %task_url, error = %err, "live channel error");
                            break Some(err.to_string());
                        }
                        None => break None,
                    }
                }
            };
            info!(url = %task_url, reason = ?reason, "live channel closed");
            let _ = tx.send(LiveMessage::Closed { reason });
        });

        Ok(Self {
            url: url.to_string(),
            events,
            shutdown: Some(shutdown_tx),
            reader,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Next message in arrival order. `None` once the reader has gone and the
    /// queue is drained.
    pub async fn recv(&mut self) -> Option<LiveMessage> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Option<LiveMessage> {
        self.events.try_recv().ok()
    }

    /// Send a close frame and wait briefly for the reader to finish.
    pub async fn close(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if tokio::time::timeout(CLOSE_GRACE, &mut self.reader)
            .await
            .is_err()
        {
            debug!(url = %self.url, "live reader did not finish in time, aborting");
        }
    }
}

impl Drop for LiveChannel {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

//! Request/response connection to a popmq server.
//!
//! A single WebSocket carries many concurrent requests. Requests are tagged
//! with an id. A reader task routes each response to the `oneshot` its caller
//! is waiting on. Writes go through an unbounded channel drained by a writer
//! task, the same split the server uses.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tracing::{debug, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::transport::message::{ClientMessage, RequestId, ServerMessage};
use crate::utils::error::ClientError;

type Pending = Arc<Mutex<HashMap<RequestId, oneshot::Sender<ServerMessage>>>>;

#[derive(Debug)]
pub struct Connection {
    outgoing: mpsc::UnboundedSender<WsMessage>,
    pending: Pending,
    next_id: AtomicU64,
    running: Arc<AtomicBool>,
}

impl Connection {
    pub async fn connect(url: &str) -> Result<Self, ClientError> {
        let (ws_stream, _response) = connect_async(url).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let running = Arc::new(AtomicBool::new(true));

        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let closing = msg.is_close();
                if let Err(e) = ws_sender.send(msg).await {
                    debug!("Failed to send request: {e}");
                    break;
                }
                if closing {
                    break;
                }
            }
        });

        {
            let pending = pending.clone();
            let running = running.clone();
            tokio::spawn(async move {
                while let Some(frame) = ws_receiver.next().await {
                    let text = match frame {
                        Ok(WsMessage::Text(text)) => text,
                        Ok(WsMessage::Close(_)) => break,
                        Ok(_) => continue,
                        Err(e) => {
                            debug!("Connection read error: {e}");
                            break;
                        }
                    };
                    let response = match serde_json::from_str::<ServerMessage>(text.as_str()) {
                        Ok(response) => response,
                        Err(e) => {
                            warn!("Ignoring malformed response: {e}");
                            continue;
                        }
                    };
                    let waiter = response.id().and_then(|id| pending.lock().remove(&id));
                    match waiter {
                        Some(waiter) => {
                            let _ = waiter.send(response);
                        }
                        None => warn!("Unsolicited response: {response:?}"),
                    }
                }
                // Order matters: a request registered after the clear sees
                // `running == false` and backs out.
                running.store(false, Ordering::SeqCst);
                pending.lock().clear();
            });
        }

        Ok(Self {
            outgoing: tx,
            pending,
            next_id: AtomicU64::new(1),
            running,
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Publishes `body` to `topic`, returning the number of queues it reached.
    pub async fn publish(&self, topic: &str, body: &str) -> Result<usize, ClientError> {
        let response = self
            .request(|id| ClientMessage::Publish {
                id,
                topic: topic.to_string(),
                body: body.to_string(),
            })
            .await?;
        match response {
            ServerMessage::Published { subscribers, .. } => Ok(subscribers),
            other => Err(unexpected(other)),
        }
    }

    /// Takes one message from `queue`. `None` waits as long as the server allows.
    ///
    /// Dropping the returned future does not cancel the take on the server;
    /// pass a timeout or close the connection for that.
    pub async fn take(&self, queue: &str, timeout: Option<Duration>) -> Result<String, ClientError> {
        let timeout_ms = timeout.map(timeout_millis);
        let response = self
            .request(|id| ClientMessage::Take {
                id,
                queue: queue.to_string(),
                timeout_ms,
            })
            .await?;
        match response {
            ServerMessage::Message { body, .. } => Ok(body),
            other => Err(unexpected(other)),
        }
    }

    pub async fn subscribe(&self, queue: &str, topic: &str) -> Result<(), ClientError> {
        let response = self
            .request(|id| ClientMessage::Subscribe {
                id,
                queue: queue.to_string(),
                topic: topic.to_string(),
            })
            .await?;
        match response {
            ServerMessage::Subscribed { .. } => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    pub async fn unsubscribe(&self, queue: &str, topic: &str) -> Result<(), ClientError> {
        let response = self
            .request(|id| ClientMessage::Unsubscribe {
                id,
                queue: queue.to_string(),
                topic: topic.to_string(),
            })
            .await?;
        match response {
            ServerMessage::Unsubscribed { .. } => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Sends a close frame. Requests still in flight fail with `Closed`.
    pub fn close(&self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.outgoing.send(WsMessage::Close(None));
    }

    async fn request<F>(&self, build: F) -> Result<ServerMessage, ClientError>
    where
        F: FnOnce(RequestId) -> ClientMessage,
    {
        if !self.is_running() {
            return Err(ClientError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let json = serde_json::to_string(&build(id))?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);
        if !self.is_running() || self.outgoing.send(WsMessage::text(json)).is_err() {
            self.pending.lock().remove(&id);
            return Err(ClientError::Closed);
        }

        match rx.await.map_err(|_| ClientError::Closed)? {
            ServerMessage::Error { status, message, .. } => {
                Err(ClientError::Server { status, message })
            }
            response => Ok(response),
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.is_running() {
            self.close();
        }
    }
}

/// Wire value for a take timeout. Never `0`, which the server reads as "no
/// timeout"; saturates instead of wrapping.
pub(crate) fn timeout_millis(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX).max(1)
}

fn unexpected(response: ServerMessage) -> ClientError {
    ClientError::UnexpectedResponse(format!("{response:?}"))
}

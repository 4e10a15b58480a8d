//! WebSocket transport
//!
//! Translates JSON requests into broker operations. Responsibilities:
//! - Accept TCP/WebSocket connections, refusing those over `max_connections`
//! - Apply publish and subscription changes in arrival order, inline
//! - Run each take in its own task, so a blocked take never holds up
//!   other requests on the same connection
//! - Cancel in-flight takes when the connection's read side ends
//! - Serialize responses through a single per-connection send loop

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::spawn;
use tokio::sync::{Semaphore, mpsc, watch};
use tokio_tungstenite::accept_async;
use tracing::{debug, error, info, warn};
use tungstenite::protocol::Message as WsMessage;
use uuid::Uuid;

use crate::broker::Broker;
use crate::config::Settings;
use crate::transport::message::{ClientMessage, RequestId, STATUS_BAD_REQUEST, ServerMessage};
use crate::utils::error::BrokerError;

/// Binds the configured address and serves until the task is dropped.
///
/// Only a failure to bind is returned; everything after that is handled per
/// connection.
pub async fn start_websocket_server(broker: Arc<Broker>, settings: Settings) -> std::io::Result<()> {
    let addr = settings.bind_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("WebSocket server listening on ws://{addr}");
    serve(listener, broker, settings).await;
    Ok(())
}

/// Accept loop over an already bound listener.
pub async fn serve(listener: TcpListener, broker: Arc<Broker>, settings: Settings) {
    let connections = Arc::new(Semaphore::new(settings.broker.max_connections));
    let default_timeout = match settings.broker.take_timeout_ms {
        0 => None,
        ms => Some(Duration::from_millis(ms)),
    };

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Failed to accept connection: {e}");
                continue;
            }
        };

        let Ok(permit) = connections.clone().try_acquire_owned() else {
            warn!("Connection limit reached, refusing {peer}");
            continue;
        };

        let broker = broker.clone();
        spawn(async move {
            handle_connection(stream, broker, default_timeout).await;
            drop(permit);
        });
    }
}

async fn handle_connection(stream: TcpStream, broker: Arc<Broker>, default_timeout: Option<Duration>) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake error: {e}");
            return;
        }
    };

    let client_id = format!("client-{}", Uuid::new_v4());
    debug!("{client_id} connected");

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();
    let (closed_tx, closed_rx) = watch::channel(false);

    {
        let client_id = client_id.clone();
        spawn(async move {
            while let Some(msg) = rx.recv().await {
                if let Err(e) = ws_sender.send(msg).await {
                    debug!("Failed to send message to {client_id}: {e}");
                    break;
                }
            }
            let _ = ws_sender.close().await;
            debug!("Send loop closed for {client_id}");
        });
    }

    while let Some(frame) = ws_receiver.next().await {
        let msg = match frame {
            Ok(msg) => msg,
            Err(e) => {
                debug!("Read error from {client_id}: {e}");
                break;
            }
        };

        let text = match msg {
            WsMessage::Text(text) => text,
            WsMessage::Close(_) => break,
            WsMessage::Binary(_) => {
                send(&tx, &bad_request("binary frames are not supported".to_string()));
                continue;
            }
            _ => continue,
        };

        match serde_json::from_str::<ClientMessage>(text.as_str()) {
            Ok(ClientMessage::Take {
                id,
                queue,
                timeout_ms,
            }) => {
                let timeout = match timeout_ms {
                    Some(0) => None,
                    Some(ms) => Some(Duration::from_millis(ms)),
                    None => default_timeout,
                };
                spawn(serve_take(
                    broker.clone(),
                    id,
                    queue,
                    timeout,
                    tx.clone(),
                    closed_rx.clone(),
                ));
            }
            Ok(request) => {
                send(&tx, &handle_request(&broker, request));
            }
            Err(err) => {
                warn!(
                    "Invalid client message from {client_id}: {err} | {}",
                    text.as_str().chars().take(100).collect::<String>()
                );
                send(&tx, &bad_request(format!("invalid request: {err}")));
            }
        }
    }

    // Wakes every take still waiting on behalf of this connection.
    let _ = closed_tx.send(true);
    info!("{client_id} disconnected");
}

/// Serves one take for a connection.
///
/// Gives up when `closed` flips or `timeout` elapses. A message taken after
/// the caller went away is put back at the head of its queue.
pub(crate) async fn serve_take(
    broker: Arc<Broker>,
    id: RequestId,
    queue: String,
    timeout: Option<Duration>,
    tx: mpsc::UnboundedSender<WsMessage>,
    closed: watch::Receiver<bool>,
) {
    match broker.take(&queue, cancellation(closed.clone(), timeout)).await {
        Ok(message) => {
            let response = ServerMessage::Message {
                id,
                queue: queue.clone(),
                body: String::from_utf8_lossy(&message).into_owned(),
            };
            if *closed.borrow() || !send(&tx, &response) {
                debug!("Caller for queue {queue} went away, restoring message");
                broker.store.restore(&queue, message);
            }
        }
        Err(err) => {
            send(&tx, &error_response(id, &err));
        }
    }
}

/// Runs the requests that complete without waiting.
pub fn handle_request(broker: &Broker, request: ClientMessage) -> ServerMessage {
    match request {
        ClientMessage::Publish { id, topic, body } => {
            let bytes = body.len();
            match broker.publish(&topic, Bytes::from(body)) {
                Ok(subscribers) => ServerMessage::Published {
                    id,
                    topic,
                    bytes,
                    subscribers,
                },
                Err(err) => error_response(id, &err),
            }
        }
        ClientMessage::Subscribe { id, queue, topic } => {
            broker.subscribe(&queue, &topic);
            ServerMessage::Subscribed { id, queue, topic }
        }
        ClientMessage::Unsubscribe { id, queue, topic } => match broker.unsubscribe(&queue, &topic) {
            Ok(()) => ServerMessage::Unsubscribed { id, queue, topic },
            Err(err) => error_response(id, &err),
        },
        ClientMessage::Take { id, .. } => ServerMessage::Error {
            id: Some(id),
            status: STATUS_BAD_REQUEST,
            message: "take cannot be served synchronously".to_string(),
        },
    }
}

/// Resolves when the connection closes or `timeout` elapses, whichever is first.
fn cancellation(mut closed: watch::Receiver<bool>, timeout: Option<Duration>) -> impl Future<Output = ()> {
    async move {
        let disconnected = async move {
            // An error means the sender is gone, which also means closed.
            let _ = closed.wait_for(|closed| *closed).await;
        };
        match timeout {
            Some(timeout) => {
                tokio::select! {
                    _ = disconnected => {}
                    _ = tokio::time::sleep(timeout) => {}
                }
            }
            None => disconnected.await,
        }
    }
}

fn error_response(id: RequestId, err: &BrokerError) -> ServerMessage {
    ServerMessage::Error {
        id: Some(id),
        status: err.status(),
        message: err.to_string(),
    }
}

fn bad_request(message: String) -> ServerMessage {
    ServerMessage::Error {
        id: None,
        status: STATUS_BAD_REQUEST,
        message,
    }
}

/// Queues `response` on the send loop. Returns `false` if the loop is gone.
fn send(tx: &mpsc::UnboundedSender<WsMessage>, response: &ServerMessage) -> bool {
    match serde_json::to_string(response) {
        Ok(json) => tx.send(WsMessage::text(json)).is_ok(),
        Err(e) => {
            error!("Failed to serialize response: {e}");
            false
        }
    }
}

//! Named-queue client
//!
//! `QueueClient` owns one queue on the server. Publishing and subscription
//! changes go straight out on the connection. A background puller keeps one
//! take outstanding on the client's queue and hands each message to
//! [`QueueClient::retrieve`] through a small local buffer.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, Notify, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::client::connection::Connection;
use crate::utils::error::ClientError;

/// How long the puller waits before retrying a queue the server doesn't know yet.
const RETRY_INTERVAL: Duration = Duration::from_millis(250);

/// Messages fetched ahead of `retrieve` calls.
const PREFETCH: usize = 1;

#[derive(Debug)]
pub struct QueueClient {
    name: String,
    connection: Arc<Connection>,
    incoming: AsyncMutex<mpsc::Receiver<String>>,
    subscribed: Arc<Notify>,
    stop: Arc<Notify>,
    puller: Mutex<Option<JoinHandle<Vec<String>>>>,
}

impl QueueClient {
    /// Connects to `url` and starts pulling messages for queue `name`.
    pub async fn connect(name: impl Into<String>, url: &str) -> Result<Self, ClientError> {
        let name = name.into();
        let connection = Arc::new(Connection::connect(url).await?);
        let (tx, rx) = mpsc::channel(PREFETCH);
        let subscribed = Arc::new(Notify::new());
        let stop = Arc::new(Notify::new());

        let puller = tokio::spawn(pull(
            connection.clone(),
            name.clone(),
            tx,
            subscribed.clone(),
            stop.clone(),
        ));

        Ok(Self {
            name,
            connection,
            incoming: AsyncMutex::new(rx),
            subscribed,
            stop,
            puller: Mutex::new(Some(puller)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn publish(&self, topic: &str, body: &str) -> Result<usize, ClientError> {
        self.connection.publish(topic, body).await
    }

    /// Waits for the next message on this client's queue.
    ///
    /// Returns `None` once the client has shut down or lost its connection.
    pub async fn retrieve(&self) -> Option<String> {
        self.incoming.lock().await.recv().await
    }

    /// Like [`retrieve`](Self::retrieve), giving up after `timeout`.
    pub async fn retrieve_timeout(&self, timeout: Duration) -> Option<String> {
        tokio::time::timeout(timeout, self.retrieve())
            .await
            .ok()
            .flatten()
    }

    pub async fn subscribe(&self, topic: &str) -> Result<(), ClientError> {
        self.connection.subscribe(&self.name, topic).await?;
        self.subscribed.notify_one();
        Ok(())
    }

    pub async fn unsubscribe(&self, topic: &str) -> Result<(), ClientError> {
        self.connection.unsubscribe(&self.name, topic).await
    }

    pub fn is_running(&self) -> bool {
        self.connection.is_running()
            && self
                .puller
                .lock()
                .as_ref()
                .is_some_and(|puller| !puller.is_finished())
    }

    /// Stops the puller, closes the connection and returns, oldest first,
    /// every message already taken from the server but not yet retrieved.
    ///
    /// Messages still queued on the server stay there.
    pub async fn shutdown(&self) -> Vec<String> {
        self.stop.notify_one();
        let puller = self.puller.lock().take();

        let held = match puller {
            Some(puller) => match puller.await {
                Ok(held) => held,
                Err(e) => {
                    warn!("Puller for {} failed: {e}", self.name);
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        self.connection.close();

        let mut unread = Vec::new();
        let mut incoming = self.incoming.lock().await;
        while let Ok(message) = incoming.try_recv() {
            unread.push(message);
        }
        unread.extend(held);
        unread
    }
}

// Messages already fetched are lost unless `shutdown` ran first.
impl Drop for QueueClient {
    fn drop(&mut self) {
        self.stop.notify_one();
        self.connection.close();
    }
}

/// Keeps one take outstanding on `queue` until stopped. Returns whatever it
/// took but could not hand over.
async fn pull(
    connection: Arc<Connection>,
    queue: String,
    incoming: mpsc::Sender<String>,
    subscribed: Arc<Notify>,
    stop: Arc<Notify>,
) -> Vec<String> {
    let mut held = Vec::new();
    loop {
        let take = connection.take(&queue, None);
        tokio::pin!(take);

        let result = tokio::select! {
            result = &mut take => result,
            _ = stop.notified() => {
                // Closing cancels the take on the server. A reply already on
                // the wire still arrives before the close completes.
                connection.close();
                if let Ok(body) = take.await {
                    held.push(body);
                }
                break;
            }
        };

        match result {
            Ok(body) => {
                tokio::select! {
                    biased;
                    permit = incoming.reserve() => match permit {
                        Ok(permit) => permit.send(body),
                        Err(_) => {
                            held.push(body);
                            break;
                        }
                    },
                    _ = stop.notified() => {
                        held.push(body);
                        break;
                    }
                }
            }
            Err(ClientError::Server { status: 404, message }) => {
                debug!("Nothing to pull from {queue}: {message}");
                tokio::select! {
                    _ = subscribed.notified() => {}
                    _ = stop.notified() => break,
                    _ = tokio::time::sleep(RETRY_INTERVAL) => {}
                }
            }
            Err(ClientError::Closed) => break,
            Err(e) => {
                warn!("Puller for {queue} stopped: {e}");
                break;
            }
        }
    }
    debug!("Puller for {queue} exited");
    held
}

//! Queue store
//!
//! Owns one unbounded FIFO buffer per known queue and mediates blocking
//! consumption. Each buffer has its own `Notify`; a consumer waiting on an
//! empty queue parks on that queue alone and holds no lock while it waits.
//!
//! Buffers are created on first subscription and are never removed, even
//! when drained or unsubscribed from everything.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tracing::debug;

use crate::broker::message::{Message, QueueName};
use crate::broker::registry::SubscriptionRegistry;
use crate::utils::error::BrokerError;

#[derive(Debug, Default)]
struct QueueBuffer {
    messages: Mutex<VecDeque<Message>>,
    available: Notify,
}

impl QueueBuffer {
    fn push(&self, message: Message) {
        self.messages.lock().push_back(message);
        self.available.notify_one();
    }

    fn push_front(&self, message: Message) {
        self.messages.lock().push_front(message);
        self.available.notify_one();
    }

    fn pop(&self) -> Option<Message> {
        self.messages.lock().pop_front()
    }
}

#[derive(Debug, Default)]
pub struct QueueStore {
    queues: RwLock<HashMap<QueueName, Arc<QueueBuffer>>>,
}

impl QueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer for `name` unless one already exists.
    pub fn ensure_queue(&self, name: &str) {
        self.buffer_or_create(name);
    }

    /// Append `body` to every queue subscribed to `topic`.
    ///
    /// Returns how many queues received it; `0` means the message was
    /// dropped. All buffers hold the message before this returns.
    pub fn publish(&self, registry: &SubscriptionRegistry, topic: &str, body: Message) -> usize {
        let queues = registry.queues_subscribed_to(topic);
        for queue in &queues {
            self.buffer_or_create(queue).push(body.clone());
        }
        debug!(topic, recipients = queues.len(), "fan-out complete");
        queues.len()
    }

    /// Remove and return the oldest message in `name`.
    ///
    /// Waits while the buffer is empty. Resolves to `NoMessageAvailable` as
    /// soon as `cancel` completes, without touching the buffer. A message is
    /// only popped at the point it is returned, so a cancelled take never
    /// loses one.
    pub async fn take<F>(&self, name: &str, cancel: F) -> Result<Message, BrokerError>
    where
        F: Future<Output = ()>,
    {
        let buffer = self.buffer(name).ok_or_else(|| BrokerError::UnknownQueue {
            queue: name.to_string(),
        })?;

        tokio::pin!(cancel);
        loop {
            let notified = buffer.available.notified();
            tokio::pin!(notified);
            // Register before looking at the buffer so a push in between
            // still wakes us.
            notified.as_mut().enable();

            if let Some(message) = buffer.pop() {
                return Ok(message);
            }

            tokio::select! {
                biased;
                _ = &mut cancel => {
                    return Err(BrokerError::NoMessageAvailable {
                        queue: name.to_string(),
                    });
                }
                _ = &mut notified => {}
            }
        }
    }

    /// Remove the oldest message without waiting.
    pub fn try_take(&self, name: &str) -> Result<Option<Message>, BrokerError> {
        let buffer = self.buffer(name).ok_or_else(|| BrokerError::UnknownQueue {
            queue: name.to_string(),
        })?;
        Ok(buffer.pop())
    }

    /// Put a message that could not be handed to its caller back at the head
    /// of the queue, so it is the next one delivered.
    pub fn restore(&self, name: &str, message: Message) {
        self.buffer_or_create(name).push_front(message);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.queues.read().contains_key(name)
    }

    /// Number of buffered messages, or `None` for an unknown queue.
    pub fn len(&self, name: &str) -> Option<usize> {
        self.buffer(name).map(|buffer| buffer.messages.lock().len())
    }

    fn buffer(&self, name: &str) -> Option<Arc<QueueBuffer>> {
        self.queues.read().get(name).cloned()
    }

    fn buffer_or_create(&self, name: &str) -> Arc<QueueBuffer> {
        if let Some(buffer) = self.buffer(name) {
            return buffer;
        }
        self.queues
            .write()
            .entry(name.to_string())
            .or_default()
            .clone()
    }
}

//! Broker engine
//!
//! `Broker` ties the subscription registry to the queue store. One instance
//! is built by the entry point and shared as `Arc<Broker>` with every request
//! task. All locking is internal and per structure, so callers never wrap it
//! in an outer `Mutex`, and a blocked `take` never stalls other requests.

use std::future::Future;

use tracing::info;

use crate::broker::message::Message;
use crate::broker::registry::SubscriptionRegistry;
use crate::broker::store::QueueStore;
use crate::utils::error::BrokerError;

#[derive(Debug, Default)]
pub struct Broker {
    pub registry: SubscriptionRegistry,
    pub store: QueueStore,
}

impl Broker {
    pub fn new() -> Self {
        Self {
            registry: SubscriptionRegistry::new(),
            store: QueueStore::new(),
        }
    }

    /// Subscribes `queue` to `topic`, creating the queue's buffer on first use.
    pub fn subscribe(&self, queue: &str, topic: &str) {
        // Buffer first: a publish that sees the subscription must find it.
        self.store.ensure_queue(queue);
        self.registry.subscribe(queue, topic);
        info!("Subscribed queue ({queue}) to topic ({topic})");
    }

    /// Unsubscribes `queue` from `topic`. Pending messages stay buffered.
    pub fn unsubscribe(&self, queue: &str, topic: &str) -> Result<(), BrokerError> {
        self.registry.unsubscribe(queue, topic)?;
        info!("Unsubscribed queue ({queue}) from topic ({topic})");
        Ok(())
    }

    /// Fans `body` out to every queue subscribed to `topic`.
    ///
    /// Returns the number of recipients, or `NoSubscribers` if there were none.
    pub fn publish(&self, topic: &str, body: Message) -> Result<usize, BrokerError> {
        let size = body.len();
        let subscribers = self.store.publish(&self.registry, topic, body);
        if subscribers == 0 {
            return Err(BrokerError::NoSubscribers {
                topic: topic.to_string(),
            });
        }
        info!("Published message ({size} bytes) to {subscribers} subscribers of {topic}");
        Ok(subscribers)
    }

    /// Takes one message from `queue`, waiting until one arrives or `cancel` fires.
    pub async fn take<F>(&self, queue: &str, cancel: F) -> Result<Message, BrokerError>
    where
        F: Future<Output = ()>,
    {
        let message = self.store.take(queue, cancel).await?;
        info!("Delivered message ({} bytes) from queue {queue}", message.len());
        Ok(message)
    }
}

//! Subscription registry
//!
//! Maps a queue name to the set of topics it is subscribed to. Topics are
//! never stored on their own; a topic exists only as long as some queue's set
//! mentions it. Subscribing twice is a no-op since membership is a `HashSet`.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;

use crate::broker::message::{QueueName, TopicName};
use crate::utils::error::BrokerError;

#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    subscriptions: RwLock<HashMap<QueueName, HashSet<TopicName>>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `topic` to the queue's topic set, creating the set if needed.
    pub fn subscribe(&self, queue: &str, topic: &str) {
        self.subscriptions
            .write()
            .entry(queue.to_string())
            .or_default()
            .insert(topic.to_string());
    }

    /// Remove `topic` from the queue's topic set.
    ///
    /// Only a queue with no subscription record at all is an error. Removing
    /// a topic a known queue is not subscribed to does nothing. The queue's
    /// record is kept even when its set becomes empty.
    pub fn unsubscribe(&self, queue: &str, topic: &str) -> Result<(), BrokerError> {
        let mut subscriptions = self.subscriptions.write();
        let topics = subscriptions
            .get_mut(queue)
            .ok_or_else(|| BrokerError::UnknownQueue {
                queue: queue.to_string(),
            })?;
        topics.remove(topic);
        Ok(())
    }

    /// Every queue whose topic set contains `topic`, read under one lock.
    pub fn queues_subscribed_to(&self, topic: &str) -> Vec<QueueName> {
        self.subscriptions
            .read()
            .iter()
            .filter(|(_, topics)| topics.contains(topic))
            .map(|(queue, _)| queue.clone())
            .collect()
    }

    /// The topics `queue` is subscribed to, or `None` for an unknown queue.
    pub fn topics_of(&self, queue: &str) -> Option<HashSet<TopicName>> {
        self.subscriptions.read().get(queue).cloned()
    }

    pub fn is_known(&self, queue: &str) -> bool {
        self.subscriptions.read().contains_key(queue)
    }
}

//! Topic-based fan-out between gateway connections.
//!
//! The gateway publishes processed events and presence changes to topics;
//! every connection subscribed to a topic receives a copy. The in-process
//! implementation covers one gateway instance; the trait is the seam a
//! clustered broker implementation would fill.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use telemetry::metrics;
use tokio::sync::broadcast;
use tracing::trace;

use tracker_core::Result;

/// Per-topic channel capacity. A receiver that falls this far behind
/// starts losing the oldest messages rather than blocking publishers.
const TOPIC_CAPACITY: usize = 1024;

/// Global topic every connection is subscribed to.
pub const TOPIC_ANALYTICS: &str = "analytics";

/// Per-identity topic name.
pub fn user_topic(user_id: &str) -> String {
    format!("user:{user_id}")
}

/// Fan-out seam between connections.
#[async_trait]
pub trait Backplane: Send + Sync {
    /// Deliver a message to all current subscribers of a topic.
    /// Publishing to a topic with no subscribers is not an error.
    async fn publish(&self, topic: &str, message: serde_json::Value) -> Result<()>;

    /// Subscribe to a topic. Only messages published after this call are
    /// received.
    fn subscribe(&self, topic: &str) -> broadcast::Receiver<serde_json::Value>;
}

/// In-process backplane over tokio broadcast channels.
#[derive(Default)]
pub struct LocalBackplane {
    topics: RwLock<HashMap<String, broadcast::Sender<serde_json::Value>>>,
}

impl LocalBackplane {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<serde_json::Value> {
        if let Some(sender) = self.topics.read().get(topic) {
            return sender.clone();
        }
        let mut topics = self.topics.write();
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .clone()
    }

    /// Drop topic channels that have no subscribers left.
    pub fn sweep(&self) {
        self.topics
            .write()
            .retain(|_, sender| sender.receiver_count() > 0);
    }

    /// Number of live subscribers on a topic.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .get(topic)
            .map(|s| s.receiver_count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl Backplane for LocalBackplane {
    async fn publish(&self, topic: &str, message: serde_json::Value) -> Result<()> {
        let sender = self.sender(topic);
        // send fails only when there are no receivers; that is fine.
        let delivered = sender.send(message).unwrap_or(0);
        metrics().broadcasts_sent.inc();
        trace!(topic = %topic, delivered = delivered, "Published to backplane");
        Ok(())
    }

    fn subscribe(&self, topic: &str) -> broadcast::Receiver<serde_json::Value> {
        self.sender(topic).subscribe()
    }
}

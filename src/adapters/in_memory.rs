//! In-Memory Adapters
//!
//! A fixed user registry and a recording broker. Used by tests and for
//! exercising the publish loop without external services.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::domain::ports::{MessageBroker, UserId, UserRegistry};
use crate::error::{Error, Result};

// =============================================================================
// Static Registry
// =============================================================================

/// Registry returning a fixed list of users.
#[derive(Debug, Clone, Default)]
pub struct StaticUserRegistry {
    user_ids: Vec<UserId>,
}

impl StaticUserRegistry {
    /// Create a registry from anything convertible to user IDs.
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<UserId>,
    {
        Self {
            user_ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    /// Create an empty registry.
    pub fn empty() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRegistry for StaticUserRegistry {
    async fn fetch_user_ids(&self) -> Result<Vec<UserId>> {
        Ok(self.user_ids.clone())
    }
}

// =============================================================================
// Recording Broker
// =============================================================================

/// A message handed to the [`RecordingBroker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Broker that records every publish in memory.
///
/// Topics registered with [`RecordingBroker::failing_on`] reject publishes,
/// as does any publish after `disconnect`.
#[derive(Debug, Default)]
pub struct RecordingBroker {
    messages: RwLock<Vec<PublishedMessage>>,
    failing_topics: RwLock<HashSet<String>>,
    disconnects: AtomicUsize,
}

impl RecordingBroker {
    /// Create a new recording broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every publish on `topic`.
    pub fn failing_on(self, topic: impl Into<String>) -> Self {
        self.failing_topics.write().insert(topic.into());
        self
    }

    /// All recorded messages, in publish order.
    pub fn messages(&self) -> Vec<PublishedMessage> {
        self.messages.read().clone()
    }

    /// Topics of all recorded messages, in publish order.
    pub fn topics(&self) -> Vec<String> {
        self.messages.read().iter().map(|m| m.topic.clone()).collect()
    }

    /// Messages recorded on one topic.
    pub fn messages_on(&self, topic: &str) -> Vec<PublishedMessage> {
        self.messages
            .read()
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// Number of recorded messages.
    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    /// Check if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.messages.read().is_empty()
    }

    /// How many times `disconnect` was called.
    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    /// Whether `disconnect` has been called.
    pub fn is_disconnected(&self) -> bool {
        self.disconnect_count() > 0
    }
}

#[async_trait]
impl MessageBroker for RecordingBroker {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        if self.is_disconnected() {
            return Err(Error::Publish {
                topic: topic.to_string(),
                reason: "broker disconnected".to_string(),
            });
        }

        if self.failing_topics.read().contains(topic) {
            return Err(Error::Publish {
                topic: topic.to_string(),
                reason: "rejected by test broker".to_string(),
            });
        }

        self.messages.write().push(PublishedMessage {
            topic: topic.to_string(),
            payload,
        });
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_static_registry_preserves_order() {
        let registry = StaticUserRegistry::new(["u2", "u1", "u3"]);
        let ids = registry.fetch_user_ids().await.unwrap();
        assert_eq!(
            ids,
            vec![UserId::new("u2"), UserId::new("u1"), UserId::new("u3")]
        );

        assert!(StaticUserRegistry::empty()
            .fetch_user_ids()
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_recording_broker() {
        let broker = RecordingBroker::new().failing_on("bad");
        assert!(broker.is_empty());

        broker.publish("a", b"1".to_vec()).unwrap();
        broker.publish("b", b"2".to_vec()).unwrap();
        broker.publish("a", b"3".to_vec()).unwrap();
        assert_matches!(broker.publish("bad", b"4".to_vec()), Err(Error::Publish { .. }));

        assert_eq!(broker.len(), 3);
        assert_eq!(broker.topics(), vec!["a", "b", "a"]);
        assert_eq!(broker.messages_on("a").len(), 2);

        broker.disconnect().await.unwrap();
        assert!(broker.is_disconnected());
        assert_matches!(broker.publish("a", b"5".to_vec()), Err(Error::Publish { .. }));
        assert_eq!(broker.len(), 3);
    }
}

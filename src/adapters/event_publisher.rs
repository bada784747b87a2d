//! Event Publisher Adapter
//!
//! Implements the `EventPublisher` port with various backends.

use async_trait::async_trait;
use tracing::{debug, info, warn, Level};

use crate::domain::events::PublisherEvent;
use crate::domain::ports::EventPublisher;
use crate::error::Result;

/// Logging-based event publisher.
///
/// Failures and connection losses go to warn. Lifecycle events, every
/// published reading and every broker acknowledgement go to info. Outgoing
/// packet notifications go to debug unless `info_level` is set.
#[derive(Debug, Clone, Default)]
pub struct LoggingEventPublisher {
    /// Whether to log packet-level events at info level (true) or debug level (false)
    info_level: bool,
}

impl LoggingEventPublisher {
    /// Create a new logging event publisher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a publisher that also logs packet-level events at info level.
    pub fn info_level() -> Self {
        Self { info_level: true }
    }

    /// Create a publisher that logs packet-level events at debug level.
    pub fn debug_level() -> Self {
        Self { info_level: false }
    }

    /// Level `event` is logged at.
    pub fn level_for(&self, event: &PublisherEvent) -> Level {
        match event {
            PublisherEvent::PublishFailed { .. } | PublisherEvent::ConnectionLost { .. } => {
                Level::WARN
            }
            PublisherEvent::UsersLoaded { .. } => Level::DEBUG,
            PublisherEvent::MessageSent { .. } if !self.info_level => Level::DEBUG,
            _ => Level::INFO,
        }
    }
}

fn describe(event: &PublisherEvent) -> String {
    match event {
        PublisherEvent::StateChanged { from, to, .. } => {
            format!("Publisher state {} -> {}", from, to)
        }
        PublisherEvent::UsersLoaded { count, .. } => format!("User snapshot holds {} users", count),
        PublisherEvent::PassCompleted {
            pass,
            published,
            failed,
            ..
        } => format!(
            "Pass {} complete: {} published, {} failed",
            pass, published, failed
        ),
        PublisherEvent::ReadingPublished {
            topic, size_bytes, ..
        } => format!("Published reading to {} ({} bytes)", topic, size_bytes),
        PublisherEvent::PublishFailed { topic, reason, .. } => {
            format!("Publish to {} failed: {}", topic, reason)
        }
        PublisherEvent::MessageSent { packet_id, .. } => {
            format!("Sent publish packet {}", packet_id)
        }
        PublisherEvent::PublishAcknowledged { packet_id, .. } => {
            format!("Broker acknowledged packet {}", packet_id)
        }
        PublisherEvent::BrokerConnected {
            endpoint,
            session_present,
            ..
        } => format!(
            "Broker connected at {} (session present: {})",
            endpoint, session_present
        ),
        PublisherEvent::ConnectionLost {
            endpoint, reason, ..
        } => format!("Broker connection to {} lost: {}", endpoint, reason),
        PublisherEvent::BrokerDisconnected { endpoint, .. } => {
            format!("Broker disconnected from {}", endpoint)
        }
    }
}

#[async_trait]
impl EventPublisher for LoggingEventPublisher {
    async fn publish(&self, event: PublisherEvent) -> Result<()> {
        let event_type = event.event_type();
        let message = describe(&event);

        let level = self.level_for(&event);
        if level == Level::WARN {
            warn!(event_type = %event_type, "{}", message);
        } else if level == Level::INFO {
            info!(event_type = %event_type, "{}", message);
        } else {
            debug!(event_type = %event_type, "{}", message);
        }

        Ok(())
    }

    async fn publish_all(&self, events: Vec<PublisherEvent>) -> Result<()> {
        for event in events {
            self.publish(event).await?;
        }
        Ok(())
    }
}

/// In-memory event collector for testing.
///
/// Collects events in memory for later inspection during tests.
#[derive(Debug, Default)]
pub struct InMemoryEventCollector {
    events: parking_lot::RwLock<Vec<PublisherEvent>>,
}

impl InMemoryEventCollector {
    /// Create a new in-memory event collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all collected events.
    pub fn events(&self) -> Vec<PublisherEvent> {
        self.events.read().clone()
    }

    /// Get the count of collected events.
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Check if there are no events.
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clear all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Get events of a specific type.
    pub fn events_of_type(&self, event_type: &str) -> Vec<PublisherEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type() == event_type)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventCollector {
    async fn publish(&self, event: PublisherEvent) -> Result<()> {
        self.events.write().push(event);
        Ok(())
    }

    async fn publish_all(&self, events: Vec<PublisherEvent>) -> Result<()> {
        self.events.write().extend(events);
        Ok(())
    }
}

/// Composite event publisher that publishes to multiple backends.
#[derive(Default)]
pub struct CompositeEventPublisher {
    publishers: Vec<Box<dyn EventPublisher>>,
}

impl CompositeEventPublisher {
    /// Create a new composite publisher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a publisher to the composite.
    pub fn with_publisher<P: EventPublisher + 'static>(mut self, publisher: P) -> Self {
        self.publishers.push(Box::new(publisher));
        self
    }
}

impl std::fmt::Debug for CompositeEventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeEventPublisher")
            .field("publisher_count", &self.publishers.len())
            .finish()
    }
}

#[async_trait]
impl EventPublisher for CompositeEventPublisher {
    async fn publish(&self, event: PublisherEvent) -> Result<()> {
        for publisher in &self.publishers {
            publisher.publish(event.clone()).await?;
        }
        Ok(())
    }

    async fn publish_all(&self, events: Vec<PublisherEvent>) -> Result<()> {
        for publisher in &self.publishers {
            publisher.publish_all(events.clone()).await?;
        }
        Ok(())
    }
}

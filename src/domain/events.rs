//! Publisher Events
//!
//! Immutable records of things that happened to the publish loop or the
//! broker connection. Events travel over an unbounded channel so that
//! producers (the loop, the broker's event pump) never block on consumers.
//!
//! # Example
//!
//! ```ignore
//! let (tx, rx) = event_channel();
//! tx.send(PublisherEvent::pass_completed(1, 2, 0)).ok();
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::ports::LoopState;

/// Sending half of the event channel.
pub type EventSender = mpsc::UnboundedSender<PublisherEvent>;

/// Receiving half of the event channel.
pub type EventReceiver = mpsc::UnboundedReceiver<PublisherEvent>;

/// Create a new event channel.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Event representing a significant occurrence in the publisher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PublisherEvent {
    // =========================================================================
    // Lifecycle Events
    // =========================================================================
    /// The publish loop changed state.
    StateChanged {
        from: String,
        to: String,
        timestamp: DateTime<Utc>,
    },

    /// The user snapshot was loaded from the registry.
    UsersLoaded {
        count: usize,
        timestamp: DateTime<Utc>,
    },

    /// A full pass over all users finished.
    PassCompleted {
        pass: u64,
        published: usize,
        failed: usize,
        timestamp: DateTime<Utc>,
    },

    // =========================================================================
    // Message Events
    // =========================================================================
    /// The loop handed a reading to the broker client.
    ReadingPublished {
        user_id: String,
        topic: String,
        size_bytes: usize,
        timestamp: DateTime<Utc>,
    },

    /// The loop could not hand a reading to the broker client.
    PublishFailed {
        user_id: String,
        topic: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// The broker client wrote a publish packet to the wire.
    MessageSent {
        packet_id: u16,
        timestamp: DateTime<Utc>,
    },

    /// The broker acknowledged a publish.
    PublishAcknowledged {
        packet_id: u16,
        timestamp: DateTime<Utc>,
    },

    // =========================================================================
    // Connection Events
    // =========================================================================
    /// The broker accepted the connection.
    BrokerConnected {
        endpoint: String,
        session_present: bool,
        timestamp: DateTime<Utc>,
    },

    /// The broker connection dropped; the client will retry.
    ConnectionLost {
        endpoint: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// The broker connection was closed on request.
    BrokerDisconnected {
        endpoint: String,
        timestamp: DateTime<Utc>,
    },
}

impl PublisherEvent {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            PublisherEvent::StateChanged { timestamp, .. } => *timestamp,
            PublisherEvent::UsersLoaded { timestamp, .. } => *timestamp,
            PublisherEvent::PassCompleted { timestamp, .. } => *timestamp,
            PublisherEvent::ReadingPublished { timestamp, .. } => *timestamp,
            PublisherEvent::PublishFailed { timestamp, .. } => *timestamp,
            PublisherEvent::MessageSent { timestamp, .. } => *timestamp,
            PublisherEvent::PublishAcknowledged { timestamp, .. } => *timestamp,
            PublisherEvent::BrokerConnected { timestamp, .. } => *timestamp,
            PublisherEvent::ConnectionLost { timestamp, .. } => *timestamp,
            PublisherEvent::BrokerDisconnected { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            PublisherEvent::StateChanged { .. } => "StateChanged",
            PublisherEvent::UsersLoaded { .. } => "UsersLoaded",
            PublisherEvent::PassCompleted { .. } => "PassCompleted",
            PublisherEvent::ReadingPublished { .. } => "ReadingPublished",
            PublisherEvent::PublishFailed { .. } => "PublishFailed",
            PublisherEvent::MessageSent { .. } => "MessageSent",
            PublisherEvent::PublishAcknowledged { .. } => "PublishAcknowledged",
            PublisherEvent::BrokerConnected { .. } => "BrokerConnected",
            PublisherEvent::ConnectionLost { .. } => "ConnectionLost",
            PublisherEvent::BrokerDisconnected { .. } => "BrokerDisconnected",
        }
    }

    /// Get the user ID if applicable.
    pub fn user_id(&self) -> Option<&str> {
        match self {
            PublisherEvent::ReadingPublished { user_id, .. } => Some(user_id),
            PublisherEvent::PublishFailed { user_id, .. } => Some(user_id),
            _ => None,
        }
    }
}

// =============================================================================
// Event Builders
// =============================================================================

impl PublisherEvent {
    /// Create a StateChanged event.
    pub fn state_changed(from: LoopState, to: LoopState) -> Self {
        PublisherEvent::StateChanged {
            from: from.to_string(),
            to: to.to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Create a UsersLoaded event.
    pub fn users_loaded(count: usize) -> Self {
        PublisherEvent::UsersLoaded {
            count,
            timestamp: Utc::now(),
        }
    }

    /// Create a PassCompleted event.
    pub fn pass_completed(pass: u64, published: usize, failed: usize) -> Self {
        PublisherEvent::PassCompleted {
            pass,
            published,
            failed,
            timestamp: Utc::now(),
        }
    }

    /// Create a ReadingPublished event.
    pub fn reading_published(
        user_id: impl Into<String>,
        topic: impl Into<String>,
        size_bytes: usize,
    ) -> Self {
        PublisherEvent::ReadingPublished {
            user_id: user_id.into(),
            topic: topic.into(),
            size_bytes,
            timestamp: Utc::now(),
        }
    }

    /// Create a PublishFailed event.
    pub fn publish_failed(
        user_id: impl Into<String>,
        topic: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        PublisherEvent::PublishFailed {
            user_id: user_id.into(),
            topic: topic.into(),
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a MessageSent event.
    pub fn message_sent(packet_id: u16) -> Self {
        PublisherEvent::MessageSent {
            packet_id,
            timestamp: Utc::now(),
        }
    }

    /// Create a PublishAcknowledged event.
    pub fn publish_acknowledged(packet_id: u16) -> Self {
        PublisherEvent::PublishAcknowledged {
            packet_id,
            timestamp: Utc::now(),
        }
    }

    /// Create a BrokerConnected event.
    pub fn broker_connected(endpoint: impl Into<String>, session_present: bool) -> Self {
        PublisherEvent::BrokerConnected {
            endpoint: endpoint.into(),
            session_present,
            timestamp: Utc::now(),
        }
    }

    /// Create a ConnectionLost event.
    pub fn connection_lost(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        PublisherEvent::ConnectionLost {
            endpoint: endpoint.into(),
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a BrokerDisconnected event.
    pub fn broker_disconnected(endpoint: impl Into<String>) -> Self {
        PublisherEvent::BrokerDisconnected {
            endpoint: endpoint.into(),
            timestamp: Utc::now(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

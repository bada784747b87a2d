//! Domain Ports (Port/Adapter Pattern)
//!
//! This module defines the abstractions the publish loop depends on.
//! Infrastructure adapters implement these traits to provide concrete
//! implementations.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Domain Layer                            │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                    Ports (Traits)                    │    │
//! │  │   UserRegistry │ MessageBroker │ EventPublisher     │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Infrastructure Layer                       │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                  Adapters (Impls)                    │    │
//! │  │  MongoUserRegistry │ MqttBroker │ LoggingPublisher  │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;

use super::events::PublisherEvent;
use crate::error::Result;

// =============================================================================
// Value Objects
// =============================================================================

/// User identifier (value object).
///
/// Opaque to this crate; sourced once from the registry and used to build
/// both the topic and the payload's `userId` field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle state of the publish loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl LoopState {
    /// Whether the loop is issuing publishes.
    pub fn is_running(&self) -> bool {
        *self == LoopState::Running
    }

    /// Whether the loop has reached its terminal state.
    pub fn is_terminal(&self) -> bool {
        *self == LoopState::Stopped
    }
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoopState::Starting => write!(f, "starting"),
            LoopState::Running => write!(f, "running"),
            LoopState::Stopping => write!(f, "stopping"),
            LoopState::Stopped => write!(f, "stopped"),
        }
    }
}

// =============================================================================
// User Registry Port
// =============================================================================

/// Port for reading the set of users to simulate.
///
/// Implementations return identifiers in the order the store yields them.
#[async_trait]
pub trait UserRegistry: Send + Sync {
    /// Snapshot every user identifier in the registry.
    async fn fetch_user_ids(&self) -> Result<Vec<UserId>>;
}

// =============================================================================
// Message Broker Port
// =============================================================================

/// Port for the outbound message broker.
///
/// `publish` hands a message to the client and returns immediately; it must
/// not wait for delivery confirmation. Acknowledgements, if any, arrive as
/// [`PublisherEvent`]s on the event channel.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Queue a payload for delivery on `topic`.
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()>;

    /// Disconnect gracefully and stop any background activity.
    async fn disconnect(&self) -> Result<()>;
}

#[async_trait]
impl<T: MessageBroker + ?Sized> MessageBroker for Box<T> {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        (**self).publish(topic, payload)
    }

    async fn disconnect(&self) -> Result<()> {
        (**self).disconnect().await
    }
}

#[async_trait]
impl<T: MessageBroker + ?Sized> MessageBroker for std::sync::Arc<T> {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        (**self).publish(topic, payload)
    }

    async fn disconnect(&self) -> Result<()> {
        (**self).disconnect().await
    }
}

// =============================================================================
// Event Publisher Port
// =============================================================================

/// Port for consuming publisher events.
///
/// This trait abstracts event sinks, allowing different backends
/// (logging, Prometheus, in-memory) to be used.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an event.
    async fn publish(&self, event: PublisherEvent) -> Result<()>;

    /// Publish multiple events.
    async fn publish_all(&self, events: Vec<PublisherEvent>) -> Result<()>;
}

#[async_trait]
impl<T: EventPublisher + ?Sized> EventPublisher for std::sync::Arc<T> {
    async fn publish(&self, event: PublisherEvent) -> Result<()> {
        (**self).publish(event).await
    }

    async fn publish_all(&self, events: Vec<PublisherEvent>) -> Result<()> {
        (**self).publish_all(events).await
    }
}

// =============================================================================
// Tests
// =============================================================================

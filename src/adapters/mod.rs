//! Infrastructure Adapters
//!
//! This module contains adapter implementations for the domain ports,
//! following the Port/Adapter (Hexagonal) architecture pattern.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Domain Layer                              │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │                    Ports (Traits)                           │ │
//! │  │     UserRegistry │ MessageBroker │ EventPublisher          │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Adapters (This Module)                       │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │ MongoUserRegistry │ MqttBroker │ LoggingBroker             │ │
//! │  │ StaticUserRegistry │ RecordingBroker │ *EventPublisher     │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use vitals_publisher::adapters::{MongoConfig, MongoUserRegistry};
//! use vitals_publisher::domain::ports::UserRegistry;
//!
//! let registry = MongoUserRegistry::connect(MongoConfig::default()).await?;
//! let users = registry.fetch_user_ids().await?;
//! ```

mod dry_run;
mod event_publisher;
mod in_memory;
mod mongo;
mod mqtt;

pub use dry_run::LoggingBroker;
pub use event_publisher::{CompositeEventPublisher, InMemoryEventCollector, LoggingEventPublisher};
pub use in_memory::{PublishedMessage, RecordingBroker, StaticUserRegistry};
pub use mongo::{user_id_from_document, MongoConfig, MongoUserRegistry};
pub use mqtt::{parse_qos, MqttBroker, MqttConfig, DEFAULT_TLS_PORT};

//! Vitals Publisher - Synthetic Patient Telemetry over MQTT
//!
//! Reads the set of user identifiers from a MongoDB collection once at
//! startup, then every three seconds publishes one randomly generated
//! vital-sign reading per user to `patient/health/{userId}` on an MQTT
//! broker over TLS, until interrupted.
//!
//! # Architecture
//!
//! ```text
//! UserRegistry (MongoDB) → PublishLoop → MessageBroker (MQTT)
//!                               │
//!                               ▼
//!                     PublisherEvent channel → EventDispatcher
//!                                               (logs, Prometheus)
//! ```
//!
//! # Modules
//!
//! - [`adapters`] - Infrastructure adapters implementing domain ports
//! - [`domain`] - Ports and events
//! - [`error`] - Error types
//! - [`metrics`] - Prometheus metrics integration
//! - [`publisher`] - Publish loop state machine and event dispatcher
//! - [`server`] - Metrics and health HTTP endpoints
//! - [`telemetry`] - Vital-sign reading generator

pub mod adapters;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod publisher;
pub mod server;
pub mod telemetry;

// Re-export commonly used types
pub use error::{Error, Result};
pub use publisher::{PublishLoop, PublishLoopConfig, RunSummary, StopReason};
pub use telemetry::Reading;

//! Domain Layer
//!
//! Value objects, ports and events shared by the publish loop and the
//! infrastructure adapters.
//!
//! - **Ports** (`ports.rs`) - Trait abstractions for the registry, broker
//!   and event sinks
//! - **Events** (`events.rs`) - Notifications emitted by the loop and the
//!   broker client
//!
//! # Usage
//!
//! ```ignore
//! use vitals_publisher::domain::ports::{MessageBroker, UserRegistry};
//!
//! async fn snapshot<R: UserRegistry>(registry: &R) -> Result<usize> {
//!     Ok(registry.fetch_user_ids().await?.len())
//! }
//! ```

pub mod events;
pub mod ports;

pub use events::{event_channel, EventReceiver, EventSender, PublisherEvent};
pub use ports::{EventPublisher, LoopState, MessageBroker, UserId, UserRegistry};

//! Event Dispatcher
//!
//! Drains the event channel into an [`EventPublisher`] on a background
//! task, so producers never wait on observability sinks.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::events::EventReceiver;
use crate::domain::ports::EventPublisher;

/// Spawn a task forwarding every event from `events` to `sink`.
///
/// The task ends once every sender has been dropped and the channel is
/// drained; it resolves to the number of events forwarded.
pub fn spawn_dispatcher(events: EventReceiver, sink: Arc<dyn EventPublisher>) -> JoinHandle<u64> {
    tokio::spawn(dispatch(events, sink))
}

async fn dispatch(mut events: EventReceiver, sink: Arc<dyn EventPublisher>) -> u64 {
    let mut forwarded = 0;

    while let Some(event) = events.recv().await {
        let event_type = event.event_type();
        if let Err(e) = sink.publish(event).await {
            warn!(event_type = %event_type, "Event sink rejected event: {}", e);
            continue;
        }
        forwarded += 1;
    }

    debug!("Event dispatcher drained after {} events", forwarded);
    forwarded
}

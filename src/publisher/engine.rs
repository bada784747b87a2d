//! Publish Loop
//!
//! Owns the user snapshot and the broker client, and drives the
//! `Starting → Running → Stopping → Stopped` lifecycle:
//!
//! ```text
//! Starting ──registry + broker ok──▶ Running ──interrupt / pass limit──▶ Stopping ──▶ Stopped
//!     │                                                                               ▲
//!     └────────────────────────────── startup error ──────────────────────────────────┘
//! ```
//!
//! Each pass generates one reading per user, in snapshot order, and hands
//! it to the broker without waiting for delivery. Passes are separated by a
//! fixed, cancellable sleep.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::events::{EventSender, PublisherEvent};
use crate::domain::ports::{LoopState, MessageBroker, UserId, UserRegistry};
use crate::error::{Error, Result};
use crate::telemetry;

/// Literal prefix of every reading topic.
pub const TOPIC_PREFIX: &str = "patient/health/";

/// Pause between the end of one pass and the start of the next.
pub const PASS_INTERVAL: Duration = Duration::from_secs(3);

/// Topic on which readings for `user_id` are published.
pub fn topic_for(user_id: &UserId) -> String {
    format!("{}{}", TOPIC_PREFIX, user_id)
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the publish loop
#[derive(Debug, Clone, Default)]
pub struct PublishLoopConfig {
    /// Stop after this many completed passes (unbounded when `None`)
    pub max_passes: Option<u64>,
}

impl PublishLoopConfig {
    fn limit_reached(&self, passes: u64) -> bool {
        self.max_passes.is_some_and(|max| passes >= max)
    }
}

// =============================================================================
// Summaries
// =============================================================================

/// Outcome of a single pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// 1-based pass number
    pub pass: u64,

    /// Readings handed to the broker
    pub published: usize,

    /// Readings that could not be handed to the broker
    pub failed: usize,

    /// Whether shutdown cut the pass short
    pub interrupted: bool,
}

/// Why the loop left `Running`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StopReason {
    /// External interrupt
    #[default]
    Interrupted,
    /// Configured pass limit reached
    PassLimitReached,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Interrupted => write!(f, "interrupted"),
            StopReason::PassLimitReached => write!(f, "pass limit reached"),
        }
    }
}

/// Outcome of a complete run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Passes that ran to completion
    pub passes: u64,

    /// Readings handed to the broker, including any from an interrupted pass
    pub published: u64,

    /// Readings that could not be handed to the broker
    pub failed: u64,

    /// Why the loop stopped
    pub stop_reason: StopReason,
}

// =============================================================================
// Startup
// =============================================================================

/// Run the `Starting` phase: snapshot the registry, then connect the broker.
///
/// The broker connector is only invoked once the snapshot succeeded. Any
/// failure is returned unchanged after a `Starting → Stopped` event.
#[instrument(skip_all)]
pub async fn start<R, B, F, Fut>(
    config: PublishLoopConfig,
    registry: &R,
    connect_broker: F,
    events: EventSender,
) -> Result<PublishLoop<B>>
where
    R: UserRegistry + ?Sized,
    B: MessageBroker,
    F: FnOnce(EventSender) -> Fut,
    Fut: Future<Output = Result<B>>,
{
    let startup = async {
        let user_ids = registry.fetch_user_ids().await?;
        info!("Found {} users", user_ids.len());
        let _ = events.send(PublisherEvent::users_loaded(user_ids.len()));

        let broker = connect_broker(events.clone()).await?;
        Ok::<_, Error>((user_ids, broker))
    };

    match startup.await {
        Ok((user_ids, broker)) => Ok(PublishLoop::new(config, user_ids, broker, events)),
        Err(e) => {
            abort_startup(&events, &e);
            Err(e)
        }
    }
}

/// Record a failed `Starting` phase: log the error and emit the
/// `Starting → Stopped` transition.
///
/// Used by [`start`], and by callers whose registry connection fails before
/// [`start`] can run.
pub fn abort_startup(events: &EventSender, error: &Error) {
    error!("Startup failed: {}", error);
    let _ = events.send(PublisherEvent::state_changed(
        LoopState::Starting,
        LoopState::Stopped,
    ));
}

// =============================================================================
// Publish Loop
// =============================================================================

/// The publish loop, holding the user snapshot and the broker client.
pub struct PublishLoop<B: MessageBroker> {
    config: PublishLoopConfig,
    user_ids: Vec<UserId>,
    broker: B,
    events: EventSender,
    state: watch::Sender<LoopState>,
}

impl<B: MessageBroker> PublishLoop<B> {
    /// Create a loop in the `Starting` state.
    pub fn new(
        config: PublishLoopConfig,
        user_ids: Vec<UserId>,
        broker: B,
        events: EventSender,
    ) -> Self {
        let (state, _) = watch::channel(LoopState::Starting);
        Self {
            config,
            user_ids,
            broker,
            events,
            state,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LoopState {
        *self.state.borrow()
    }

    /// Watch lifecycle state changes. The receiver keeps the final state
    /// after the loop has been consumed.
    pub fn subscribe_state(&self) -> watch::Receiver<LoopState> {
        self.state.subscribe()
    }

    /// The user snapshot, in registry order.
    pub fn user_ids(&self) -> &[UserId] {
        &self.user_ids
    }

    /// The broker client.
    pub fn broker(&self) -> &B {
        &self.broker
    }

    /// Run until interrupted or the pass limit is reached, then disconnect
    /// the broker.
    #[instrument(skip_all, fields(users = self.user_ids.len()))]
    pub async fn run(self, shutdown: CancellationToken) -> RunSummary {
        self.transition(LoopState::Running);
        info!(
            "Publishing readings for {} users every {:?}",
            self.user_ids.len(),
            PASS_INTERVAL
        );

        let mut summary = RunSummary::default();

        let stop_reason = loop {
            if shutdown.is_cancelled() {
                break StopReason::Interrupted;
            }
            if self.config.limit_reached(summary.passes) {
                break StopReason::PassLimitReached;
            }

            let pass = self.publish_pass(summary.passes + 1, &shutdown);
            summary.published += pass.published as u64;
            summary.failed += pass.failed as u64;

            if pass.interrupted {
                break StopReason::Interrupted;
            }

            summary.passes = pass.pass;
            let _ = self.events.send(PublisherEvent::pass_completed(
                pass.pass,
                pass.published,
                pass.failed,
            ));

            if self.config.limit_reached(summary.passes) {
                break StopReason::PassLimitReached;
            }

            tokio::select! {
                _ = shutdown.cancelled() => break StopReason::Interrupted,
                _ = sleep(PASS_INTERVAL) => {}
            }
        };

        summary.stop_reason = stop_reason;
        self.transition(LoopState::Stopping);
        info!("Stopping publisher ({})", stop_reason);

        if let Err(e) = self.broker.disconnect().await {
            error!("Broker disconnect failed: {}", e);
        }

        self.transition(LoopState::Stopped);
        info!(
            "Publisher stopped after {} passes ({} published, {} failed)",
            summary.passes, summary.published, summary.failed
        );

        summary
    }

    /// Publish one reading per user, in snapshot order.
    ///
    /// Stops early, without rollback, once `shutdown` is cancelled.
    pub fn publish_pass(&self, pass: u64, shutdown: &CancellationToken) -> PassSummary {
        let mut summary = PassSummary {
            pass,
            ..Default::default()
        };

        for user_id in &self.user_ids {
            if shutdown.is_cancelled() {
                summary.interrupted = true;
                break;
            }

            let topic = topic_for(user_id);
            match self.publish_reading(user_id, &topic) {
                Ok(size) => {
                    summary.published += 1;
                    let _ = self
                        .events
                        .send(PublisherEvent::reading_published(user_id.as_str(), &topic, size));
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!(topic = %topic, "Failed to publish reading: {}", e);
                    let _ = self.events.send(PublisherEvent::publish_failed(
                        user_id.as_str(),
                        &topic,
                        e.to_string(),
                    ));
                }
            }
        }

        debug!(
            pass = summary.pass,
            published = summary.published,
            failed = summary.failed,
            "Pass finished"
        );
        summary
    }

    fn publish_reading(&self, user_id: &UserId, topic: &str) -> Result<usize> {
        let reading = telemetry::generate(user_id);
        let payload = reading.to_payload()?;
        let size = payload.len();

        self.broker.publish(topic, payload)?;
        debug!(topic = %topic, reading = ?reading, "Published reading");

        Ok(size)
    }

    fn transition(&self, to: LoopState) {
        let from = self.state.send_replace(to);
        if from != to {
            let _ = self.events.send(PublisherEvent::state_changed(from, to));
        }
    }
}

impl<B: MessageBroker> std::fmt::Debug for PublishLoop<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublishLoop")
            .field("config", &self.config)
            .field("users", &self.user_ids.len())
            .field("state", &self.state())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

//! Prometheus Exporter
//!
//! Implements the `EventPublisher` port by folding publisher events into
//! Prometheus counters and gauges, and renders them in the text
//! exposition format for the `/metrics` endpoint.

use async_trait::async_trait;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

use crate::domain::events::PublisherEvent;
use crate::domain::ports::{EventPublisher, LoopState};
use crate::error::{Error, Result};

/// Metric name prefix.
pub const METRIC_PREFIX: &str = "vitals_publisher";

/// Prometheus metrics for the publisher.
///
/// Each instance owns its own registry.
pub struct PrometheusEventPublisher {
    registry: Registry,
    messages_published: IntCounter,
    publish_failures: IntCounter,
    passes: IntCounter,
    acks: IntCounter,
    connection_lost: IntCounter,
    users: IntGauge,
    running: IntGauge,
}

impl PrometheusEventPublisher {
    /// Create and register all publisher metrics.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        Ok(Self {
            messages_published: register_counter(
                &registry,
                "messages_published_total",
                "Readings handed to the broker client",
            )?,
            publish_failures: register_counter(
                &registry,
                "publish_failures_total",
                "Readings the broker client rejected",
            )?,
            passes: register_counter(&registry, "passes_total", "Completed publish passes")?,
            acks: register_counter(
                &registry,
                "acks_total",
                "Publish acknowledgements received from the broker",
            )?,
            connection_lost: register_counter(
                &registry,
                "connection_lost_total",
                "Broker connection drops",
            )?,
            users: register_gauge(&registry, "users", "Users in the startup snapshot")?,
            running: register_gauge(&registry, "running", "1 while the publish loop is running")?,
            registry,
        })
    }

    /// Render all metrics in the Prometheus text format.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| Error::Internal(format!("Failed to encode metrics: {}", e)))?;
        Ok(buffer)
    }

    /// Content type of [`PrometheusEventPublisher::encode`] output.
    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }

    pub fn messages_published(&self) -> u64 {
        self.messages_published.get()
    }

    pub fn publish_failures(&self) -> u64 {
        self.publish_failures.get()
    }

    pub fn passes(&self) -> u64 {
        self.passes.get()
    }

    pub fn acks(&self) -> u64 {
        self.acks.get()
    }

    pub fn connection_lost(&self) -> u64 {
        self.connection_lost.get()
    }

    pub fn users(&self) -> i64 {
        self.users.get()
    }

    pub fn is_running(&self) -> bool {
        self.running.get() == 1
    }
}

impl std::fmt::Debug for PrometheusEventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusEventPublisher")
            .field("messages_published", &self.messages_published())
            .field("publish_failures", &self.publish_failures())
            .field("passes", &self.passes())
            .finish()
    }
}

fn register_counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter> {
    let counter = IntCounter::new(format!("{}_{}", METRIC_PREFIX, name), help)
        .map_err(|e| Error::Internal(format!("Invalid metric {}: {}", name, e)))?;
    registry
        .register(Box::new(counter.clone()))
        .map_err(|e| Error::Internal(format!("Failed to register metric {}: {}", name, e)))?;
    Ok(counter)
}

fn register_gauge(registry: &Registry, name: &str, help: &str) -> Result<IntGauge> {
    let gauge = IntGauge::new(format!("{}_{}", METRIC_PREFIX, name), help)
        .map_err(|e| Error::Internal(format!("Invalid metric {}: {}", name, e)))?;
    registry
        .register(Box::new(gauge.clone()))
        .map_err(|e| Error::Internal(format!("Failed to register metric {}: {}", name, e)))?;
    Ok(gauge)
}

#[async_trait]
impl EventPublisher for PrometheusEventPublisher {
    async fn publish(&self, event: PublisherEvent) -> Result<()> {
        match event {
            PublisherEvent::ReadingPublished { .. } => self.messages_published.inc(),
            PublisherEvent::PublishFailed { .. } => self.publish_failures.inc(),
            PublisherEvent::PassCompleted { .. } => self.passes.inc(),
            PublisherEvent::PublishAcknowledged { .. } => self.acks.inc(),
            PublisherEvent::ConnectionLost { .. } => self.connection_lost.inc(),
            PublisherEvent::UsersLoaded { count, .. } => self.users.set(count as i64),
            PublisherEvent::StateChanged { to, .. } => {
                let running = to == LoopState::Running.to_string();
                self.running.set(i64::from(running));
            }
            PublisherEvent::MessageSent { .. }
            | PublisherEvent::BrokerConnected { .. }
            | PublisherEvent::BrokerDisconnected { .. } => {}
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

//! MQTT Broker Adapter
//!
//! Implements the `MessageBroker` port with `rumqttc`. The initial connect
//! polls the event loop until the broker's CONNACK arrives; after that the
//! event loop moves into a background pump task that turns packets into
//! [`PublisherEvent`]s and keeps reconnecting on failure.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rumqttc::{
    AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS, Transport,
};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, instrument, warn};

use crate::domain::events::{EventSender, PublisherEvent};
use crate::domain::ports::MessageBroker;
use crate::error::{Error, Result};

/// Default MQTT-over-TLS port.
pub const DEFAULT_TLS_PORT: u16 = 8883;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the MQTT broker connection
#[derive(Clone)]
pub struct MqttConfig {
    /// Broker host name
    pub host: String,

    /// Broker port
    pub port: u16,

    /// Username for broker authentication
    pub username: Option<String>,

    /// Password for broker authentication
    pub password: Option<String>,

    /// MQTT client identifier
    pub client_id: String,

    /// Use TLS with the platform's root certificates
    pub tls: bool,

    /// Delivery guarantee for published readings
    pub qos: QoS,

    /// Keep-alive interval
    pub keep_alive: Duration,

    /// How long to wait for the broker's CONNACK at startup
    pub connect_timeout: Duration,

    /// Delay between reconnect attempts after the connection drops
    pub reconnect_delay: Duration,

    /// How long a graceful disconnect may take before the pump is aborted
    pub shutdown_timeout: Duration,

    /// Capacity of the client's outgoing request queue
    pub request_capacity: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_TLS_PORT,
            username: None,
            password: None,
            client_id: format!("{}-{}", env!("CARGO_PKG_NAME"), uuid::Uuid::new_v4()),
            tls: true,
            qos: QoS::AtMostOnce,
            keep_alive: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            reconnect_delay: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(5),
            request_capacity: 1000,
        }
    }
}

impl MqttConfig {
    /// `host:port` of the broker.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn mqtt_options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(&self.client_id, &self.host, self.port);
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(true);

        if let Some(username) = &self.username {
            options.set_credentials(username, self.password.clone().unwrap_or_default());
        }

        if self.tls {
            options.set_transport(Transport::tls_with_default_config());
        }

        options
    }
}

impl std::fmt::Debug for MqttConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttConfig")
            .field("endpoint", &self.endpoint())
            .field("username", &self.username)
            .field("client_id", &self.client_id)
            .field("tls", &self.tls)
            .field("qos", &self.qos)
            .finish()
    }
}

/// Parse an MQTT QoS level.
pub fn parse_qos(level: u8) -> Result<QoS> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(Error::Config(format!(
            "Invalid MQTT QoS level {} (expected 0, 1 or 2)",
            other
        ))),
    }
}

// =============================================================================
// Broker
// =============================================================================

/// MQTT broker client with a background event pump.
pub struct MqttBroker {
    client: AsyncClient,
    qos: QoS,
    endpoint: String,
    shutdown_timeout: Duration,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl MqttBroker {
    /// Connect to the broker and wait for it to accept the session.
    ///
    /// Fails if the broker refuses the connection, the transport fails, or
    /// no CONNACK arrives within `connect_timeout`.
    #[instrument(skip(config, events), fields(endpoint = %config.endpoint()))]
    pub async fn connect(config: MqttConfig, events: EventSender) -> Result<Self> {
        let endpoint = config.endpoint();
        let (client, mut eventloop) =
            AsyncClient::new(config.mqtt_options(), config.request_capacity);

        let session_present = match timeout(config.connect_timeout, await_connack(&mut eventloop))
            .await
        {
            Ok(Ok(session_present)) => session_present,
            Ok(Err(e)) => {
                return Err(Error::BrokerConnection {
                    endpoint,
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(Error::BrokerTimeout {
                    endpoint,
                    timeout_secs: config.connect_timeout.as_secs(),
                })
            }
        };

        info!("Connected to MQTT broker at {}", endpoint);
        let _ = events.send(PublisherEvent::broker_connected(&endpoint, session_present));

        let pump = tokio::spawn(run_event_pump(
            eventloop,
            endpoint.clone(),
            events,
            config.reconnect_delay,
        ));

        Ok(Self {
            client,
            qos: config.qos,
            endpoint,
            shutdown_timeout: config.shutdown_timeout,
            pump: Mutex::new(Some(pump)),
        })
    }

    /// Broker endpoint this client is connected to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl std::fmt::Debug for MqttBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttBroker")
            .field("endpoint", &self.endpoint)
            .field("qos", &self.qos)
            .finish()
    }
}

#[async_trait]
impl MessageBroker for MqttBroker {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        self.client
            .try_publish(topic, self.qos, false, payload)
            .map_err(|e| Error::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn disconnect(&self) -> Result<()> {
        let pump = self.pump.lock().take();
        let Some(mut pump) = pump else {
            debug!("MQTT client already disconnected");
            return Ok(());
        };

        let graceful = timeout(self.shutdown_timeout, async {
            self.client
                .disconnect()
                .await
                .map_err(|e| Error::Internal(format!("Failed to request disconnect: {}", e)))?;
            (&mut pump)
                .await
                .map_err(|e| Error::Internal(format!("MQTT event pump failed: {}", e)))
        })
        .await;

        match graceful {
            Ok(Ok(())) => {
                info!("Disconnected from MQTT broker");
                Ok(())
            }
            Ok(Err(e)) => {
                pump.abort();
                Err(e)
            }
            Err(_) => {
                warn!(
                    "MQTT disconnect did not complete within {:?}, aborting event pump",
                    self.shutdown_timeout
                );
                pump.abort();
                Ok(())
            }
        }
    }
}

// =============================================================================
// Event Pump
// =============================================================================

/// Poll until the broker accepts the connection.
async fn await_connack(eventloop: &mut EventLoop) -> std::result::Result<bool, ConnectionError> {
    loop {
        if let Event::Incoming(Packet::ConnAck(ack)) = eventloop.poll().await? {
            return Ok(ack.session_present);
        }
    }
}

/// Drive the connection until a disconnect is written.
///
/// Connection errors are reported and followed by a fixed delay; the next
/// poll re-establishes the session.
async fn run_event_pump(
    mut eventloop: EventLoop,
    endpoint: String,
    events: EventSender,
    reconnect_delay: Duration,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                info!("Reconnected to MQTT broker at {}", endpoint);
                let _ = events.send(PublisherEvent::broker_connected(
                    &endpoint,
                    ack.session_present,
                ));
            }
            Ok(Event::Incoming(Packet::PubAck(ack))) => {
                let _ = events.send(PublisherEvent::publish_acknowledged(ack.pkid));
            }
            Ok(Event::Incoming(Packet::PubComp(comp))) => {
                let _ = events.send(PublisherEvent::publish_acknowledged(comp.pkid));
            }
            Ok(Event::Outgoing(Outgoing::Publish(pkid))) => {
                let _ = events.send(PublisherEvent::message_sent(pkid));
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                let _ = events.send(PublisherEvent::broker_disconnected(&endpoint));
                break;
            }
            Ok(_) => {}
            Err(e) => {
                error!("MQTT connection error: {}", e);
                let _ = events.send(PublisherEvent::connection_lost(&endpoint, e.to_string()));
                sleep(reconnect_delay).await;
            }
        }
    }

    debug!("MQTT event pump stopped");
}

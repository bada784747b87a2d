//! Vitals Publisher
//!
//! Publishes synthetic vital-sign readings for every known user to an MQTT
//! broker.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Vitals Publisher                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │   MongoDB    │───▶│ Publish Loop │───▶│  MQTT Broker │       │
//! │  │  (user ids)  │    │   (every 3s) │    │    (TLS)     │       │
//! │  └──────────────┘    └──────────────┘    └──────────────┘       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vitals_publisher::adapters::{
    parse_qos, CompositeEventPublisher, LoggingBroker, LoggingEventPublisher, MongoConfig,
    MongoUserRegistry, MqttBroker, MqttConfig, DEFAULT_TLS_PORT,
};
use vitals_publisher::domain::{event_channel, EventSender, MessageBroker};
use vitals_publisher::error::{Error, Result};
use vitals_publisher::metrics::PrometheusEventPublisher;
use vitals_publisher::publisher::{self, spawn_dispatcher, PublishLoopConfig};
use vitals_publisher::server::{run_http_server, HttpState};

/// How long queued events may take to drain at exit.
const EVENT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// CLI Arguments
// =============================================================================

/// Vitals Publisher - synthetic patient telemetry over MQTT
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// MongoDB connection string
    #[arg(long, env = "MONGO_URI", hide_env_values = true)]
    mongo_uri: String,

    /// Database holding the user collection
    #[arg(long, env = "MONGO_DATABASE", default_value = "UserData")]
    mongo_database: String,

    /// Collection of user documents
    #[arg(long, env = "MONGO_COLLECTION", default_value = "usercredentials")]
    mongo_collection: String,

    /// Accept MongoDB certificates that fail verification
    #[arg(long, env = "MONGO_ALLOW_INVALID_CERTS")]
    mongo_allow_invalid_certs: bool,

    /// MQTT broker host (required unless --dry-run)
    #[arg(long, env = "MQTT_HOST")]
    mqtt_host: Option<String>,

    /// MQTT broker port
    #[arg(long, env = "MQTT_PORT", default_value_t = DEFAULT_TLS_PORT)]
    mqtt_port: u16,

    /// MQTT username
    #[arg(long, env = "MQTT_USERNAME")]
    mqtt_username: Option<String>,

    /// MQTT password
    #[arg(long, env = "MQTT_PASSWORD", hide_env_values = true)]
    mqtt_password: Option<String>,

    /// MQTT client identifier (random when unset)
    #[arg(long, env = "MQTT_CLIENT_ID")]
    mqtt_client_id: Option<String>,

    /// MQTT QoS level for published readings (0, 1 or 2)
    #[arg(long, env = "MQTT_QOS", default_value = "0")]
    mqtt_qos: u8,

    /// Stop after this many passes
    #[arg(long, env = "MAX_PASSES")]
    max_passes: Option<u64>,

    /// Enable dry-run mode (log readings, no broker)
    #[arg(long, env = "DRY_RUN")]
    dry_run: bool,

    /// Metrics and health server bind address
    #[arg(long, env = "HTTP_ADDR", default_value = "0.0.0.0:8080")]
    http_addr: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn mongo_config(&self) -> MongoConfig {
        MongoConfig {
            uri: self.mongo_uri.clone(),
            database: self.mongo_database.clone(),
            collection: self.mongo_collection.clone(),
            allow_invalid_certificates: self.mongo_allow_invalid_certs,
            ..Default::default()
        }
    }

    /// Broker settings, or `None` in dry-run mode.
    fn mqtt_config(&self) -> Result<Option<MqttConfig>> {
        if self.dry_run {
            return Ok(None);
        }

        let host = self
            .mqtt_host
            .clone()
            .ok_or_else(|| Error::Config("--mqtt-host is required unless --dry-run".into()))?;

        let mut config = MqttConfig {
            host,
            port: self.mqtt_port,
            username: self.mqtt_username.clone(),
            password: self.mqtt_password.clone(),
            qos: parse_qos(self.mqtt_qos)?,
            ..Default::default()
        };
        if let Some(client_id) = &self.mqtt_client_id {
            config.client_id = client_id.clone();
        }

        Ok(Some(config))
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    info!("Starting Vitals Publisher");
    info!(
        "  MongoDB: {}/{}",
        args.mongo_database, args.mongo_collection
    );
    match &args.mqtt_host {
        Some(host) if !args.dry_run => info!("  MQTT broker: {}:{}", host, args.mqtt_port),
        _ => info!("  MQTT broker: none"),
    }
    info!("  Dry-run mode: {}", args.dry_run);
    if let Some(max_passes) = args.max_passes {
        info!("  Max passes: {}", max_passes);
    }

    let mqtt_config = args.mqtt_config()?;

    // Event pipeline: logs and Prometheus
    let metrics = Arc::new(PrometheusEventPublisher::new()?);
    let sink = CompositeEventPublisher::new()
        .with_publisher(LoggingEventPublisher::new())
        .with_publisher(Arc::clone(&metrics));
    let (events, receiver) = event_channel();
    let dispatcher = spawn_dispatcher(receiver, Arc::new(sink));

    // Snapshot the registry, then connect the broker
    let registry = match MongoUserRegistry::connect(args.mongo_config()).await {
        Ok(registry) => registry,
        Err(e) => {
            publisher::abort_startup(&events, &e);
            drain_events(events, dispatcher).await;
            return Err(e);
        }
    };

    let started = publisher::start::<_, Box<dyn MessageBroker>, _, _>(
        PublishLoopConfig {
            max_passes: args.max_passes,
        },
        &registry,
        |events| async move {
            let broker: Box<dyn MessageBroker> = match mqtt_config {
                Some(config) => Box::new(MqttBroker::connect(config, events).await?),
                None => Box::new(LoggingBroker::new()),
            };
            Ok(broker)
        },
        events.clone(),
    )
    .await;

    // The user snapshot is taken; the registry is no longer needed
    registry.close().await;

    let publish_loop = match started {
        Ok(publish_loop) => publish_loop,
        Err(e) => {
            drain_events(events, dispatcher).await;
            return Err(e);
        }
    };

    // Start metrics and health server
    let http_shutdown = CancellationToken::new();
    let http_state = HttpState::new(Arc::clone(&metrics), publish_loop.subscribe_state());
    let http_addr = args.http_addr.clone();
    let http_token = http_shutdown.clone();
    let http_server = tokio::spawn(async move {
        if let Err(e) = run_http_server(&http_addr, http_state, http_token).await {
            error!("HTTP server error: {}", e);
        }
    });

    // Interrupt handling
    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        signal_token.cancel();
    });

    let summary = publish_loop.run(shutdown).await;

    info!(
        "Published {} readings over {} passes ({} failed), stopped: {}",
        summary.published, summary.passes, summary.failed, summary.stop_reason
    );

    http_shutdown.cancel();
    if let Err(e) = http_server.await {
        warn!("HTTP server task failed: {}", e);
    }

    drain_events(events, dispatcher).await;

    info!("Vitals Publisher shutdown complete");
    Ok(())
}

/// Close our event sender and wait briefly for queued events to be logged.
async fn drain_events(events: EventSender, dispatcher: JoinHandle<u64>) {
    drop(events);
    match tokio::time::timeout(EVENT_DRAIN_TIMEOUT, dispatcher).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => warn!("Event dispatcher failed: {}", e),
        Err(_) => warn!("Timed out draining events"),
    }
}

// =============================================================================
// Signals
// =============================================================================

async fn wait_for_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for interrupt: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => info!("Received interrupt, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["rumqttc=warn", "mongodb=warn", "hyper=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

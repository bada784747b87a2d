//! Vitals Publisher Integration Tests
//!
//! Drives the startup phase and the publish loop end to end with in-memory
//! registry and broker adapters:
//! - Publish loop scenarios (ordering, pass limits, interrupts)
//! - Startup failures
//! - Event delivery through the dispatcher into logs and metrics

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use vitals_publisher::adapters::{InMemoryEventCollector, RecordingBroker, StaticUserRegistry};
use vitals_publisher::domain::{event_channel, LoopState, PublisherEvent, UserId, UserRegistry};
use vitals_publisher::error::{Error, Result};
use vitals_publisher::publisher::{self, spawn_dispatcher, PublishLoop, PublishLoopConfig};
use vitals_publisher::{Reading, StopReason};

/// Run startup against `registry` with a shared recording broker.
async fn start_recording(
    registry: &StaticUserRegistry,
    max_passes: Option<u64>,
) -> (PublishLoop<Arc<RecordingBroker>>, Arc<RecordingBroker>) {
    let broker = Arc::new(RecordingBroker::new());
    let (events, _receiver) = event_channel();

    let handed_over = Arc::clone(&broker);
    let publish_loop = publisher::start(
        PublishLoopConfig { max_passes },
        registry,
        move |_events| async move { Ok(handed_over) },
        events,
    )
    .await
    .unwrap();

    (publish_loop, broker)
}

// =============================================================================
// Publish Loop Scenarios
// =============================================================================

mod publish_loop_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_zero_users_keeps_running_until_interrupted() {
        let registry = StaticUserRegistry::empty();
        let (publish_loop, broker) = start_recording(&registry, None).await;
        let state = publish_loop.subscribe_state();

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(publish_loop.run(shutdown.clone()));

        // Passes at t=0, 3s and 6s
        tokio::time::sleep(Duration::from_secs(7)).await;
        assert_eq!(*state.borrow(), LoopState::Running);
        shutdown.cancel();

        let summary = handle.await.unwrap();
        assert_eq!(summary.passes, 3);
        assert_eq!(summary.published, 0);
        assert_eq!(summary.stop_reason, StopReason::Interrupted);
        assert!(broker.is_empty());
        assert_eq!(*state.borrow(), LoopState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_pass_follows_registry_order() {
        let registry = StaticUserRegistry::new(["u1", "u2"]);
        let (publish_loop, broker) = start_recording(&registry, Some(2)).await;

        let summary = publish_loop.run(CancellationToken::new()).await;

        assert_eq!(summary.passes, 2);
        assert_eq!(summary.stop_reason, StopReason::PassLimitReached);
        assert_eq!(
            broker.topics(),
            vec![
                "patient/health/u1",
                "patient/health/u2",
                "patient/health/u1",
                "patient/health/u2",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_reading_per_user_per_pass() {
        let registry = StaticUserRegistry::new(["a", "b", "c"]);
        let (publish_loop, broker) = start_recording(&registry, Some(4)).await;

        let summary = publish_loop.run(CancellationToken::new()).await;

        assert_eq!(summary.published, 12);
        assert_eq!(summary.failed, 0);

        for user in ["a", "b", "c"] {
            let messages = broker.messages_on(&format!("patient/health/{}", user));
            assert_eq!(messages.len(), 4);

            for message in messages {
                let reading: Reading = serde_json::from_slice(&message.payload).unwrap();
                assert_eq!(reading.user_id, user);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_during_sleep_stops_without_new_pass() {
        let registry = StaticUserRegistry::new(["u1", "u2"]);
        let (publish_loop, broker) = start_recording(&registry, None).await;
        let state = publish_loop.subscribe_state();

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(publish_loop.run(shutdown.clone()));

        tokio::time::sleep(Duration::from_secs(1)).await;
        shutdown.cancel();

        let summary = handle.await.unwrap();
        assert_eq!(summary.passes, 1);
        assert_eq!(summary.published, 2);
        assert_eq!(summary.stop_reason, StopReason::Interrupted);
        assert_eq!(broker.len(), 2);
        assert_eq!(broker.disconnect_count(), 1);
        assert_eq!(*state.borrow(), LoopState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_failure_does_not_stop_the_loop() {
        let registry = StaticUserRegistry::new(["u1", "u2"]);
        let broker = Arc::new(RecordingBroker::new().failing_on("patient/health/u1"));
        let (events, _receiver) = event_channel();

        let handed_over = Arc::clone(&broker);
        let publish_loop = publisher::start(
            PublishLoopConfig {
                max_passes: Some(3),
            },
            &registry,
            move |_events| async move { Ok(handed_over) },
            events,
        )
        .await
        .unwrap();

        let summary = publish_loop.run(CancellationToken::new()).await;

        assert_eq!(summary.passes, 3);
        assert_eq!(summary.published, 3);
        assert_eq!(summary.failed, 3);
        assert_eq!(broker.messages_on("patient/health/u2").len(), 3);
    }
}

// =============================================================================
// Startup Failures
// =============================================================================

mod startup_tests {
    use super::*;

    struct UnreachableRegistry;

    #[async_trait]
    impl UserRegistry for UnreachableRegistry {
        async fn fetch_user_ids(&self) -> Result<Vec<UserId>> {
            Err(Error::Internal("registry unreachable".into()))
        }
    }

    #[tokio::test]
    async fn test_broker_refusal_is_fatal() {
        let registry = StaticUserRegistry::new(["u1"]);
        let (events, mut receiver) = event_channel();

        let result = publisher::start::<_, RecordingBroker, _, _>(
            PublishLoopConfig::default(),
            &registry,
            |_events| async {
                Err(Error::BrokerConnection {
                    endpoint: "broker.invalid:8883".into(),
                    reason: "connection refused".into(),
                })
            },
            events,
        )
        .await;

        let err = result.unwrap_err();
        assert!(err.is_startup_failure());

        let mut final_state = None;
        while let Ok(event) = receiver.try_recv() {
            assert!(!matches!(event, PublisherEvent::ReadingPublished { .. }));
            if let PublisherEvent::StateChanged { to, .. } = event {
                final_state = Some(to);
            }
        }
        assert_eq!(final_state.as_deref(), Some("stopped"));
    }

    #[tokio::test]
    async fn test_registry_failure_skips_broker() {
        let connected = Arc::new(AtomicBool::new(false));
        let (events, _receiver) = event_channel();

        let flag = Arc::clone(&connected);
        let result = publisher::start::<_, RecordingBroker, _, _>(
            PublishLoopConfig::default(),
            &UnreachableRegistry,
            move |_events| async move {
                flag.store(true, Ordering::SeqCst);
                Ok(RecordingBroker::new())
            },
            events,
        )
        .await;

        assert!(result.is_err());
        assert!(!connected.load(Ordering::SeqCst));
    }
}

// =============================================================================
// Event Delivery
// =============================================================================

mod event_tests {
    use super::*;
    use vitals_publisher::metrics::PrometheusEventPublisher;

    #[tokio::test(start_paused = true)]
    async fn test_events_reach_collector_through_dispatcher() {
        let collector = Arc::new(InMemoryEventCollector::new());
        let (events, receiver) = event_channel();
        let dispatcher = spawn_dispatcher(receiver, collector.clone());

        let registry = StaticUserRegistry::new(["u1", "u2"]);
        let publish_loop = publisher::start(
            PublishLoopConfig {
                max_passes: Some(2),
            },
            &registry,
            |_events| async { Ok(RecordingBroker::new()) },
            events,
        )
        .await
        .unwrap();

        publish_loop.run(CancellationToken::new()).await;

        // Every sender is gone once the loop is consumed
        let forwarded = dispatcher.await.unwrap();
        assert_eq!(forwarded as usize, collector.len());

        assert_eq!(collector.events_of_type("UsersLoaded").len(), 1);
        assert_eq!(collector.events_of_type("ReadingPublished").len(), 4);
        assert_eq!(collector.events_of_type("PassCompleted").len(), 2);

        let transitions: Vec<(String, String)> = collector
            .events_of_type("StateChanged")
            .into_iter()
            .filter_map(|event| match event {
                PublisherEvent::StateChanged { from, to, .. } => Some((from, to)),
                _ => None,
            })
            .collect();
        assert_eq!(
            transitions,
            vec![
                ("starting".to_string(), "running".to_string()),
                ("running".to_string(), "stopping".to_string()),
                ("stopping".to_string(), "stopped".to_string()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_metrics_follow_the_loop() {
        let metrics = Arc::new(PrometheusEventPublisher::new().unwrap());
        let (events, receiver) = event_channel();
        let dispatcher = spawn_dispatcher(receiver, metrics.clone());

        let registry = StaticUserRegistry::new(["u1", "u2", "u3"]);
        let publish_loop = publisher::start(
            PublishLoopConfig {
                max_passes: Some(2),
            },
            &registry,
            |_events| async { Ok(RecordingBroker::new().failing_on("patient/health/u3")) },
            events,
        )
        .await
        .unwrap();

        publish_loop.run(CancellationToken::new()).await;
        dispatcher.await.unwrap();

        assert_eq!(metrics.users(), 3);
        assert_eq!(metrics.passes(), 2);
        assert_eq!(metrics.messages_published(), 4);
        assert_eq!(metrics.publish_failures(), 2);
        assert!(!metrics.is_running());
    }
}

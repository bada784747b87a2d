//! Dry-Run Broker Adapter
//!
//! Implements the `MessageBroker` port by logging each message instead of
//! sending it anywhere.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::info;

use crate::domain::ports::MessageBroker;
use crate::error::Result;

/// Broker that logs topics and payloads at info level.
#[derive(Debug, Default)]
pub struct LoggingBroker {
    logged: AtomicU64,
}

impl LoggingBroker {
    /// Create a new logging broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages logged so far.
    pub fn logged(&self) -> u64 {
        self.logged.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MessageBroker for LoggingBroker {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        let payload = String::from_utf8_lossy(&payload);
        info!(topic = %topic, payload = %payload, "[dry-run] Would publish reading");
        self.logged.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        info!(
            "[dry-run] Broker disconnect ({} messages logged)",
            self.logged()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    #[test]
    fn test_logging_broker_counts() {
        let broker = LoggingBroker::new();
        assert_ok!(broker.publish("patient/health/u1", br#"{"userId":"u1"}"#.to_vec()));
        assert_ok!(broker.publish("patient/health/u2", Vec::new()));

        assert_eq!(broker.logged(), 2);
        assert_ok!(tokio_test::block_on(broker.disconnect()));
    }
}

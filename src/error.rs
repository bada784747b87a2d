//! Error types for the vitals publisher

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the vitals publisher
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Startup Errors
    // =========================================================================
    /// Registry client could not be created or reached
    #[error("User registry connection error: {0}")]
    RegistryConnection(#[source] mongodb::error::Error),

    /// Registry query failed
    #[error("User registry query failed: {0}")]
    RegistryQuery(#[source] mongodb::error::Error),

    /// Broker refused the connection or the transport failed
    #[error("Broker connection to {endpoint} failed: {reason}")]
    BrokerConnection { endpoint: String, reason: String },

    /// Broker did not acknowledge the connection in time
    #[error("Broker at {endpoint} did not acknowledge connection within {timeout_secs}s")]
    BrokerTimeout { endpoint: String, timeout_secs: u64 },

    // =========================================================================
    // Steady-State Errors
    // =========================================================================
    /// A single publish could not be handed to the broker client
    #[error("Publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },

    /// Reading serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error belongs to the fatal startup category
    /// (registry or broker unreachable at startup).
    pub fn is_startup_failure(&self) -> bool {
        matches!(
            self,
            Error::RegistryConnection(_)
                | Error::RegistryQuery(_)
                | Error::BrokerConnection { .. }
                | Error::BrokerTimeout { .. }
        )
    }
}

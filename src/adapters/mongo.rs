//! MongoDB User Registry Adapter
//!
//! Implements the `UserRegistry` port against a MongoDB collection.
//! Only the `_id` field of each document is projected.

use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::{ClientOptions, Tls, TlsOptions};
use mongodb::Client;
use tracing::{debug, info, instrument, warn};

use crate::domain::ports::{UserId, UserRegistry};
use crate::error::{Error, Result};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the MongoDB registry
#[derive(Clone)]
pub struct MongoConfig {
    /// Connection string, credentials included
    pub uri: String,

    /// Database holding the user collection
    pub database: String,

    /// Collection of user documents
    pub collection: String,

    /// Accept certificates that fail verification
    pub allow_invalid_certificates: bool,

    /// How long to wait for a reachable server
    pub server_selection_timeout: Duration,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            uri: "mongodb://localhost:27017".to_string(),
            database: "UserData".to_string(),
            collection: "usercredentials".to_string(),
            allow_invalid_certificates: false,
            server_selection_timeout: Duration::from_secs(30),
        }
    }
}

// The URI carries credentials; keep it out of logs.
impl std::fmt::Debug for MongoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoConfig")
            .field("database", &self.database)
            .field("collection", &self.collection)
            .field("allow_invalid_certificates", &self.allow_invalid_certificates)
            .field("server_selection_timeout", &self.server_selection_timeout)
            .finish()
    }
}

// =============================================================================
// Registry
// =============================================================================

/// User registry backed by a MongoDB collection.
pub struct MongoUserRegistry {
    client: Client,
    config: MongoConfig,
}

impl MongoUserRegistry {
    /// Connect to MongoDB over TLS and verify the server answers a ping.
    #[instrument(skip(config), fields(database = %config.database))]
    pub async fn connect(config: MongoConfig) -> Result<Self> {
        let mut options = ClientOptions::parse(&config.uri)
            .await
            .map_err(Error::RegistryConnection)?;

        options.app_name = Some(env!("CARGO_PKG_NAME").to_string());
        options.server_selection_timeout = Some(config.server_selection_timeout);

        if config.allow_invalid_certificates {
            warn!("MongoDB certificate verification is disabled");
            let mut tls = TlsOptions::default();
            tls.allow_invalid_certificates = Some(true);
            options.tls = Some(Tls::Enabled(tls));
        } else if options.tls.is_none() {
            options.tls = Some(Tls::Enabled(TlsOptions::default()));
        }

        let client = Client::with_options(options).map_err(Error::RegistryConnection)?;

        client
            .database(&config.database)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(Error::RegistryConnection)?;

        info!("Connected to MongoDB database {}", config.database);

        Ok(Self { client, config })
    }

    /// Release the connection pool.
    pub async fn close(self) {
        debug!("Closing MongoDB client");
        self.client.shutdown().await;
    }
}

impl std::fmt::Debug for MongoUserRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoUserRegistry")
            .field("config", &self.config)
            .finish()
    }
}

#[async_trait]
impl UserRegistry for MongoUserRegistry {
    #[instrument(skip(self), fields(collection = %self.config.collection))]
    async fn fetch_user_ids(&self) -> Result<Vec<UserId>> {
        let collection = self
            .client
            .database(&self.config.database)
            .collection::<Document>(&self.config.collection);

        let mut cursor = collection
            .find(doc! {})
            .projection(doc! { "_id": 1 })
            .await
            .map_err(Error::RegistryQuery)?;

        let mut user_ids = Vec::new();
        while let Some(document) = cursor.try_next().await.map_err(Error::RegistryQuery)? {
            match user_id_from_document(&document) {
                Some(user_id) => user_ids.push(user_id),
                None => warn!("Skipping user document without _id"),
            }
        }

        Ok(user_ids)
    }
}

/// Extract the user identifier from a projected document.
///
/// ObjectIds render as lowercase hex, strings verbatim, anything else in
/// its BSON display form.
pub fn user_id_from_document(document: &Document) -> Option<UserId> {
    let id = match document.get("_id")? {
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::String(s) => s.clone(),
        other => other.to_string(),
    };
    Some(UserId::new(id))
}

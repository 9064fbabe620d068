//! Document store connection and gateway primitives

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use mongodb::bson::{doc, Bson};
use mongodb::options::{ClientOptions, ServerAddress};
use mongodb::{Client, Collection};
use serde::{Deserialize, Serialize};

use crate::record::{candidate_filter, dimension_update, CandidateRecord};

/// Gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store host (the tunnel's local endpoint in remote mode)
    pub host: String,
    /// Store port
    pub port: u16,
    /// Database holding the records
    pub database: String,
    /// Collection holding the records
    pub collection: String,
    /// Bound on connect and the reachability probe
    pub connect_timeout: Duration,
}

impl StoreConfig {
    /// Default store host for direct connections
    pub const DEFAULT_HOST: &'static str = "127.0.0.1";
    /// Default store port
    pub const DEFAULT_PORT: u16 = 27017;
    /// Default database name
    pub const DEFAULT_DATABASE: &'static str = "rednote";
    /// Default collection name
    pub const DEFAULT_COLLECTION: &'static str = "posts";
    /// Default probe/connect bound
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Create a configuration for `host:port` with default names and bounds
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            database: Self::DEFAULT_DATABASE.to_string(),
            collection: Self::DEFAULT_COLLECTION.to_string(),
            connect_timeout: Self::DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// With database and collection names
    #[must_use]
    pub fn with_namespace(mut self, database: impl Into<String>, collection: impl Into<String>) -> Self {
        self.database = database.into();
        self.collection = collection.into();
        self
    }

    /// Store address as `host:port`
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Store failures
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Store unreachable; fatal to the run
    #[error("document store unreachable at {address}: {source}")]
    Connect {
        /// Address the connection was attempted against
        address: String,
        /// Driver failure
        #[source]
        source: mongodb::error::Error,
    },

    /// Query, cursor, or update failure
    #[error("store operation failed: {0}")]
    Query(#[from] mongodb::error::Error),

    /// The record vanished between selection and update
    #[error("record {id} not found")]
    NotFound {
        /// Key of the vanished record
        id: Bson,
    },
}

/// Query/cursor/update seam between the orchestrator and the store
#[async_trait]
pub trait RecordGateway: Send + Sync {
    /// Count records matching the candidate predicate
    async fn count_candidates(&self) -> Result<u64, StoreError>;

    /// Open the candidate cursor
    ///
    /// Lazy and finite, bound to the predicate at open time; concurrent
    /// writer changes are not guaranteed visible mid-iteration, and the
    /// cursor resumes only from the start.
    async fn candidates(
        &self,
    ) -> Result<BoxStream<'static, Result<CandidateRecord, StoreError>>, StoreError>;

    /// Apply a field-level set of exactly the derived attributes
    ///
    /// Idempotent: re-applying the same dimensions is observationally a
    /// no-op.
    ///
    /// # Errors
    /// [`StoreError::NotFound`] when the record was deleted concurrently.
    async fn update_dimensions(&self, id: &Bson, width: u32, height: u32)
        -> Result<(), StoreError>;
}

/// Live connection handle to the document store
///
/// Exclusively owned by one orchestrator run.
#[derive(Debug, Clone)]
pub struct RecordStore {
    collection: Collection<CandidateRecord>,
}

impl RecordStore {
    /// Connect to the store and verify reachability
    ///
    /// The probe is bounded by `connect_timeout` so an unreachable server
    /// fails fast instead of silently queuing operations.
    ///
    /// # Errors
    /// [`StoreError::Connect`] when the server cannot be reached within the
    /// bound.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let address = config.address();
        let options = ClientOptions::builder()
            .hosts(vec![ServerAddress::Tcp {
                host: config.host.clone(),
                port: Some(config.port),
            }])
            .direct_connection(true)
            .app_name("coverfix".to_string())
            .connect_timeout(config.connect_timeout)
            .server_selection_timeout(config.connect_timeout)
            .build();

        let client = Client::with_options(options).map_err(|source| StoreError::Connect {
            address: address.clone(),
            source,
        })?;

        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| StoreError::Connect {
                address: address.clone(),
                source,
            })?;
        tracing::info!(%address, database = %config.database, "document store reachable");

        let collection = client
            .database(&config.database)
            .collection(&config.collection);
        Ok(Self { collection })
    }
}

#[async_trait]
impl RecordGateway for RecordStore {
    async fn count_candidates(&self) -> Result<u64, StoreError> {
        Ok(self.collection.count_documents(candidate_filter()).await?)
    }

    async fn candidates(
        &self,
    ) -> Result<BoxStream<'static, Result<CandidateRecord, StoreError>>, StoreError> {
        let cursor = self.collection.find(candidate_filter()).await?;
        Ok(cursor.map(|record| record.map_err(StoreError::from)).boxed())
    }

    async fn update_dimensions(
        &self,
        id: &Bson,
        width: u32,
        height: u32,
    ) -> Result<(), StoreError> {
        let result = self
            .collection
            .update_one(doc! { "_id": id.clone() }, dimension_update(width, height))
            .await?;
        if result.matched_count == 0 {
            return Err(StoreError::NotFound { id: id.clone() });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn config_defaults() {
        let config = StoreConfig::new("127.0.0.1", StoreConfig::DEFAULT_PORT);
        assert_eq!(config.database, "rednote");
        assert_eq!(config.collection, "posts");
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.address(), "127.0.0.1:27017");
    }

    #[test]
    fn config_namespace_override() {
        let config =
            StoreConfig::new("127.0.0.1", 27018).with_namespace("staging", "posts_shadow");
        assert_eq!(config.database, "staging");
        assert_eq!(config.collection, "posts_shadow");
    }
}

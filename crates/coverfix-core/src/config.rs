//! Backfill run configuration
//!
//! One immutable value covers both tunnel and local connection parameters;
//! it is assembled once by the caller and passed into the run. No
//! module-level state.

use std::time::Duration;

use coverfix_media::FetcherConfig;
use coverfix_store::StoreConfig;
use coverfix_tunnel::TunnelConfig;
use serde::{Deserialize, Serialize};

use crate::policy::SkipPolicy;

/// How the document store is reached
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ConnectMode {
    /// Through an SSH forwarding session
    Remote(TunnelConfig),
    /// Directly, without a tunnel
    Local {
        /// Store host
        host: String,
        /// Store port
        port: u16,
    },
}

impl ConnectMode {
    /// Direct connection to the default local store endpoint
    #[must_use]
    pub fn local_default() -> Self {
        Self::Local {
            host: StoreConfig::DEFAULT_HOST.to_string(),
            port: StoreConfig::DEFAULT_PORT,
        }
    }
}

/// Immutable configuration for one backfill run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackfillConfig {
    /// How to reach the store
    pub mode: ConnectMode,
    /// Database holding the records
    pub database: String,
    /// Collection holding the records
    pub collection: String,
    /// Fetcher settings: hard timeout and client identification
    pub fetcher: FetcherConfig,
    /// Skip rules
    pub policy: SkipPolicy,
    /// Fixed delay applied after each record that attempted a fetch
    pub pacing: Duration,
}

impl BackfillConfig {
    /// Default inter-record pacing delay
    pub const DEFAULT_PACING: Duration = Duration::from_millis(200);

    /// Create a configuration with defaults for everything but the mode
    #[must_use]
    pub fn new(mode: ConnectMode) -> Self {
        Self {
            mode,
            database: StoreConfig::DEFAULT_DATABASE.to_string(),
            collection: StoreConfig::DEFAULT_COLLECTION.to_string(),
            fetcher: FetcherConfig::default(),
            policy: SkipPolicy::default(),
            pacing: Self::DEFAULT_PACING,
        }
    }

    /// With database and collection names
    #[must_use]
    pub fn with_namespace(
        mut self,
        database: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        self.database = database.into();
        self.collection = collection.into();
        self
    }

    /// Store configuration for the endpoint the run resolved
    #[must_use]
    pub fn store_config(&self, host: impl Into<String>, port: u16) -> StoreConfig {
        StoreConfig::new(host, port).with_namespace(self.database.clone(), self.collection.clone())
    }
}

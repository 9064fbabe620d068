//! Coverfix backfill orchestrator
//!
//! The central coordinating piece of the pipeline:
//! - [`config`]: one immutable configuration value for a whole run
//! - [`policy`]: the skip rules applied to each candidate cover
//! - [`report`]: run identity, lifecycle states, and outcome counters
//! - [`orchestrator`]: the sequential repair loop with failure isolation
//! - [`error`]: the fatal error taxonomy
//!
//! [`run_backfill`] ties them together: establish the tunnel when remote
//! mode is selected, connect the store through it (or directly), drive the
//! loop, and tear the tunnel down on every exit path.

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod policy;
pub mod report;

use coverfix_media::ResourceFetcher;
use coverfix_store::RecordStore;
use coverfix_tunnel::TunnelSession;

pub use config::{BackfillConfig, ConnectMode};
pub use error::RunError;
pub use orchestrator::{BackfillOrchestrator, RecordOutcome};
pub use policy::{CoverDisposition, SkipPolicy};
pub use report::{RunId, RunReport, RunState};

/// Run one backfill to completion
///
/// Connection failures abort before any record is touched. In remote mode
/// the tunnel session is closed on success and failure alike.
///
/// # Errors
/// [`RunError`] for tunnel establishment, store connection, or mid-run
/// cursor failures. Per-record failures are counted in the returned
/// [`RunReport`] instead.
pub async fn run_backfill(config: BackfillConfig) -> Result<RunReport, RunError> {
    let fetcher = ResourceFetcher::new(&config.fetcher)?;

    match &config.mode {
        ConnectMode::Remote(tunnel) => {
            tracing::debug!(state = %RunState::Connecting, ssh_host = %tunnel.ssh_host, "connecting through ssh tunnel");
            let session = TunnelSession::open(tunnel).await?;
            let endpoint = session.local_addr();
            let result = drive(&config, fetcher, &endpoint.ip().to_string(), endpoint.port()).await;
            session.close().await;
            result
        }
        ConnectMode::Local { host, port } => {
            tracing::debug!(state = %RunState::Connecting, %host, port, "connecting directly");
            drive(&config, fetcher, host, *port).await
        }
    }
}

async fn drive(
    config: &BackfillConfig,
    fetcher: ResourceFetcher,
    host: &str,
    port: u16,
) -> Result<RunReport, RunError> {
    let store = RecordStore::connect(&config.store_config(host, port)).await?;
    let mut orchestrator =
        BackfillOrchestrator::new(store, fetcher, config.policy.clone(), config.pacing);
    orchestrator.run().await
}

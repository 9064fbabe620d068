//! Fatal error taxonomy for a backfill run
//!
//! Only failures that make the run as a whole impossible live here.
//! Per-record failures (download, decode, vanished record) are carried as
//! explicit record outcomes and never escape the loop boundary.

use coverfix_media::FetchError;
use coverfix_store::StoreError;
use coverfix_tunnel::TunnelError;

/// Failures that abort a run
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// Tunnel establishment failed: key, authentication, or connectivity
    #[error("tunnel failed: {0}")]
    Tunnel(#[from] TunnelError),

    /// The store is unreachable, or the cursor/update channel broke mid-run
    #[error("store failed: {0}")]
    Store(#[from] StoreError),

    /// The HTTP client could not be constructed
    #[error("fetcher construction failed: {0}")]
    Fetcher(#[from] FetchError),
}

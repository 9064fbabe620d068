//! Coverfix secure tunnel provider
//!
//! Establishes an encrypted SSH forwarding session mapping a local
//! ephemeral port to a service bound on the remote side:
//! - [`keys`]: private key loading over an ordered algorithm registry
//! - [`session`]: the scoped forwarding session itself
//!
//! The session is fatal-on-failure: without connectivity the pipeline has
//! no partial progress to make.

pub mod keys;
pub mod session;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use keys::{load_identity, KeyAlgorithm, KeyAlgorithmRegistry, KeyLoadError};
pub use session::{TunnelError, TunnelSession};

/// Tunnel configuration
///
/// Immutable once assembled; passed by value into the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelConfig {
    /// Remote SSH host
    pub ssh_host: String,
    /// Remote SSH port
    pub ssh_port: u16,
    /// Authenticating user
    pub ssh_user: String,
    /// Private key file; a leading `~/` expands against the home directory
    pub key_path: PathBuf,
    /// Address the forwarded service binds on, as seen from the SSH host
    pub remote_bind_host: String,
    /// Port of the forwarded service
    pub remote_bind_port: u16,
    /// Ordered key algorithms to attempt when loading the identity
    #[serde(default)]
    pub key_registry: KeyAlgorithmRegistry,
}

impl TunnelConfig {
    /// Default SSH port
    pub const DEFAULT_SSH_PORT: u16 = 22;
    /// Default private key location
    pub const DEFAULT_KEY_PATH: &'static str = "~/.ssh/id_ed25519";
    /// Default remote bind host for the forwarded service
    pub const DEFAULT_REMOTE_BIND_HOST: &'static str = "127.0.0.1";
    /// Default remote bind port (document store)
    pub const DEFAULT_REMOTE_BIND_PORT: u16 = 27017;

    /// Create a configuration for `ssh_user@ssh_host` with defaults for
    /// everything else
    #[must_use]
    pub fn new(ssh_host: impl Into<String>, ssh_user: impl Into<String>) -> Self {
        Self {
            ssh_host: ssh_host.into(),
            ssh_port: Self::DEFAULT_SSH_PORT,
            ssh_user: ssh_user.into(),
            key_path: PathBuf::from(Self::DEFAULT_KEY_PATH),
            remote_bind_host: Self::DEFAULT_REMOTE_BIND_HOST.to_string(),
            remote_bind_port: Self::DEFAULT_REMOTE_BIND_PORT,
            key_registry: KeyAlgorithmRegistry::default(),
        }
    }

    /// With SSH port
    #[must_use]
    pub fn with_ssh_port(mut self, port: u16) -> Self {
        self.ssh_port = port;
        self
    }

    /// With private key path
    #[must_use]
    pub fn with_key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_path = path.into();
        self
    }

    /// With remote bind address
    #[must_use]
    pub fn with_remote_bind(mut self, host: impl Into<String>, port: u16) -> Self {
        self.remote_bind_host = host.into();
        self.remote_bind_port = port;
        self
    }
}

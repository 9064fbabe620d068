//! Scoped SSH forwarding session
//!
//! Maps `127.0.0.1:<ephemeral>` to `remote_bind_host:remote_bind_port`
//! through an authenticated SSH connection. Each accepted local connection
//! gets its own `direct-tcpip` channel with bytes copied bidirectionally.
//!
//! The session is a scoped resource: call [`TunnelSession::close`] on every
//! exit path; `Drop` aborts the accept task as a backstop for interrupted
//! runs.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use russh::client::{self, AuthResult, Handle};
use russh::keys::PrivateKeyWithHashAlg;
use russh::Disconnect;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::keys::{load_identity, KeyLoadError};
use crate::TunnelConfig;

/// Tunnel establishment failures, all fatal to a run
#[derive(Debug, thiserror::Error)]
pub enum TunnelError {
    /// No usable credential
    #[error(transparent)]
    KeyLoad(#[from] KeyLoadError),

    /// The remote host rejected the offered key
    #[error("ssh authentication rejected for user {user}")]
    Auth {
        /// User the authentication was attempted for
        user: String,
    },

    /// The remote endpoint is unreachable or the handshake failed
    #[error("ssh connection failed: {0}")]
    Connect(#[from] russh::Error),

    /// The local forwarding endpoint could not be bound
    #[error("cannot bind local forwarding endpoint: {0}")]
    Bind(#[from] std::io::Error),
}

#[derive(Debug)]
struct ForwardingHandler;

impl client::Handler for ForwardingHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        tracing::debug!(algorithm = %server_public_key.algorithm(), "accepting server host key");
        Ok(true)
    }
}

/// Authenticated forwarding session with a bound local ephemeral port
pub struct TunnelSession {
    handle: Arc<Handle<ForwardingHandler>>,
    local_addr: SocketAddr,
    accept_task: JoinHandle<()>,
}

impl TunnelSession {
    /// Establish the session: connect, authenticate, bind the local port,
    /// and start forwarding
    ///
    /// # Errors
    /// [`TunnelError::KeyLoad`] without a usable credential,
    /// [`TunnelError::Connect`] when the remote is unreachable,
    /// [`TunnelError::Auth`] when the key is rejected.
    pub async fn open(config: &TunnelConfig) -> Result<Self, TunnelError> {
        let key = load_identity(&config.key_path, &config.key_registry)?;

        let ssh_config = Arc::new(client::Config {
            keepalive_interval: Some(Duration::from_secs(30)),
            ..client::Config::default()
        });

        tracing::info!(
            host = %config.ssh_host,
            port = config.ssh_port,
            user = %config.ssh_user,
            "establishing ssh tunnel"
        );
        let mut handle = client::connect(
            ssh_config,
            (config.ssh_host.as_str(), config.ssh_port),
            ForwardingHandler,
        )
        .await?;

        let rsa_hash = handle.best_supported_rsa_hash().await?.flatten();
        let auth = handle
            .authenticate_publickey(
                config.ssh_user.clone(),
                PrivateKeyWithHashAlg::new(Arc::new(key), rsa_hash),
            )
            .await?;
        if !matches!(auth, AuthResult::Success) {
            return Err(TunnelError::Auth {
                user: config.ssh_user.clone(),
            });
        }

        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?;
        let local_addr = listener.local_addr()?;

        let handle = Arc::new(handle);
        let accept_task = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&handle),
            config.remote_bind_host.clone(),
            config.remote_bind_port,
        ));

        tracing::info!(
            %local_addr,
            remote_host = %config.remote_bind_host,
            remote_port = config.remote_bind_port,
            "ssh tunnel established"
        );
        Ok(Self {
            handle,
            local_addr,
            accept_task,
        })
    }

    /// The local ephemeral endpoint clients should connect to
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Tear down the forwarding channel and release the local port
    pub async fn close(self) {
        self.accept_task.abort();
        if let Err(err) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            tracing::debug!(%err, "ssh disconnect raced session shutdown");
        }
        tracing::info!("ssh tunnel closed");
    }
}

impl Drop for TunnelSession {
    fn drop(&mut self) {
        // Backstop for interrupted runs; close() already aborted it on the
        // orderly paths.
        self.accept_task.abort();
    }
}

async fn accept_loop(
    listener: TcpListener,
    handle: Arc<Handle<ForwardingHandler>>,
    remote_host: String,
    remote_port: u16,
) {
    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(err) => {
                tracing::debug!(%err, "local forwarding endpoint closed");
                break;
            }
        };
        let handle = Arc::clone(&handle);
        let remote_host = remote_host.clone();
        tokio::spawn(async move {
            if let Err(err) = forward(socket, peer, &handle, &remote_host, remote_port).await {
                tracing::debug!(%err, %peer, "forwarded connection ended with error");
            }
        });
    }
}

async fn forward(
    mut socket: TcpStream,
    peer: SocketAddr,
    handle: &Handle<ForwardingHandler>,
    remote_host: &str,
    remote_port: u16,
) -> Result<(), russh::Error> {
    let channel = handle
        .channel_open_direct_tcpip(
            remote_host,
            u32::from(remote_port),
            &peer.ip().to_string(),
            u32::from(peer.port()),
        )
        .await?;
    let mut stream = channel.into_stream();
    let _ = tokio::io::copy_bidirectional(&mut socket, &mut stream).await;
    Ok(())
}

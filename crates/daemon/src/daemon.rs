//! Listener loop.
//!
//! One task per accepted connection; the ssh handshake, authentication,
//! and session dispatch all run inside [`SessionHandler`]. Connections
//! share nothing mutable except the configuration.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use russh::server::{self, Config as SshConfig};
use tokio::net::{TcpListener, TcpStream};

use crate::config::DaemonConfig;
use crate::error::DaemonError;
use crate::session::SessionHandler;

/// Runs the daemon until the listener fails (or, in one-shot mode, until
/// the first connection has been served).
pub async fn run_daemon(config: DaemonConfig) -> Result<(), DaemonError> {
    let config = Arc::new(config);
    let ssh_config = Arc::new(SshConfig {
        keys: vec![config.host_key.clone()],
        auth_rejection_time: Duration::from_secs(3),
        auth_rejection_time_initial: Some(Duration::ZERO),
        inactivity_timeout: Some(Duration::from_secs(3600)),
        ..SshConfig::default()
    });

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| DaemonError::Bind { addr, source })?;
    tracing::info!(%addr, "listening for scp sessions");

    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(error) => {
                tracing::warn!(%error, "failed to accept incoming connection");
                continue;
            }
        };
        tracing::debug!(%peer, "connection accepted");

        let handler = SessionHandler::new(Arc::clone(&config), Some(peer));
        let ssh_config = Arc::clone(&ssh_config);
        if config.one_shot {
            serve_connection(ssh_config, socket, handler, peer).await;
            return Ok(());
        }
        tokio::spawn(serve_connection(ssh_config, socket, handler, peer));
    }
}

async fn serve_connection(
    config: Arc<SshConfig>,
    socket: TcpStream,
    handler: SessionHandler,
    peer: SocketAddr,
) {
    match server::run_stream(config, socket, handler).await {
        Ok(session) => {
            if let Err(error) = session.await {
                tracing::debug!(%peer, %error, "session ended with an error");
            }
        }
        Err(error) => tracing::warn!(%peer, %error, "ssh handshake failed"),
    }
}

//! Common error type for daemon startup and session handling.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Errors that stop the daemon or a session outright.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// A configuration value could not be used.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// The listener socket could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address the daemon tried to listen on.
        addr: SocketAddr,
        /// Underlying bind failure.
        source: io::Error,
    },
    /// The host key could not be loaded or generated.
    #[error("host key error: {0}")]
    HostKey(#[from] russh::keys::Error),
    /// ssh transport failure.
    #[error(transparent)]
    Ssh(#[from] russh::Error),
    /// Other I/O failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}

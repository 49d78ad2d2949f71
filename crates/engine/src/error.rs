//! Common error types for the engine crate.

use std::io;

use thiserror::Error;

use scpd_protocol::ProtocolError;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that abort a transfer outright.
///
/// Recoverable per-entry failures never surface here; the engines translate
/// those into `\x01`-prefixed reports on the channel and keep going.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Channel or filesystem I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The peer violated the wire protocol.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// The peer answered a record with a fatal status.
    #[error("client aborted the transfer: {0}")]
    ClientAbort(String),
    /// A sink request arrived without a target operand.
    #[error("sink request carries no target")]
    MissingTarget,
}

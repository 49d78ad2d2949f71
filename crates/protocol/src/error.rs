//! Common error type for the protocol crate.

use std::io;

use thiserror::Error;

use crate::record::MAX_RECORD_LEN;

/// Errors raised while framing or parsing the scp wire vocabulary.
///
/// Everything except [`ProtocolError::Io`] is a protocol violation by the
/// peer; the engines answer those with a fatal status byte before shutting
/// the session down.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Underlying channel I/O failed.
    #[error("channel I/O error: {0}")]
    Io(#[from] io::Error),
    /// A control record or status message exceeded the framing bound.
    #[error("control record exceeds {MAX_RECORD_LEN} bytes")]
    RecordTooLong,
    /// The channel closed in the middle of a record or status message.
    #[error("channel closed mid-record")]
    TruncatedRecord,
    /// A record line did not match its declared shape.
    #[error("malformed control record: {reason}")]
    MalformedRecord {
        /// Short description of the field that failed to parse.
        reason: &'static str,
    },
    /// The leading byte selected no known record kind.
    #[error("unknown record tag {tag:#04x}")]
    UnknownTag {
        /// The offending tag byte.
        tag: u8,
    },
    /// A status byte outside the `{0x00, 0x01, 0x02}` alphabet.
    #[error("invalid status byte {status:#04x}")]
    InvalidStatus {
        /// The offending status byte.
        status: u8,
    },
    /// A record name was empty or contained `/` or `\n`.
    #[error("invalid name in control record")]
    InvalidName,
}

impl ProtocolError {
    /// Returns `true` when the error is a peer-side protocol violation
    /// rather than a transport failure.
    #[must_use]
    pub fn is_violation(&self) -> bool {
        !matches!(self, Self::Io(_))
    }
}

#![deny(unsafe_code)]

//! Wire protocol for legacy scp sessions.
//!
//! The scp data stream interleaves two byte-level vocabularies over one
//! session channel:
//!
//! - **Control records**: ASCII lines terminated by `\n`, one of four kinds
//!   selected by the leading tag byte (`T`, `C`, `D`, `E`). See
//!   [`ControlRecord`].
//! - **Status bytes**: single-byte acknowledgements (`0x00` ok, `0x01`
//!   warning, `0x02` fatal), where the non-zero forms are followed by a
//!   newline-terminated message. See [`ClientStatus`].
//!
//! This crate frames and parses both vocabularies without interpreting their
//! semantics; the transfer engines drive the record/ack ordering. All reads
//! are bounded by [`MAX_RECORD_LEN`] so a misbehaving peer cannot force
//! unbounded buffering.

pub mod ack;
pub mod error;
pub mod record;

pub use ack::{
    read_client_status, write_fatal, write_ok, write_warning, ClientStatus, STATUS_FATAL,
    STATUS_OK, STATUS_WARNING,
};
pub use error::ProtocolError;
pub use record::{read_record, ControlRecord, MAX_RECORD_LEN, MODE_MASK};

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

#![deny(unsafe_code)]

//! Transfer engines for the scp session protocol.
//!
//! A session runs exactly one engine over its channel:
//!
//! - the **source** engine walks local files named by the request and streams
//!   them to the client ([`source::run_source`]);
//! - the **sink** engine receives the client's record stream and materialises
//!   it under the shared root ([`sink::run_sink`]).
//!
//! Both engines speak through [`scpd_protocol`] and consult the
//! [`path_gate`] before touching the filesystem, so no client-supplied name
//! can address anything outside the shared root. The engines own their
//! channel exclusively for the duration of the transfer and report a final
//! [`ExitStatus`] for the transport to deliver.

pub mod error;
pub mod exit_status;
mod meta;
pub mod path_gate;
pub mod request;
pub mod sink;
pub mod source;

pub use error::{EngineError, EngineResult};
pub use exit_status::ExitStatus;
pub use request::{TransferMode, TransferRequest};

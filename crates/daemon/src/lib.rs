#![deny(unsafe_code)]

//! ssh-facing daemon for the single-directory scp server.
//!
//! The daemon accepts ssh connections, authenticates the one configured
//! principal (password or authorized public key), and honours exactly one
//! kind of session request: an `exec` of the legacy `scp` remote command.
//! The dispatcher decodes that command into a [`scpd_engine::TransferRequest`]
//! and hands the session channel to the matching engine; everything else —
//! shells, subsystems, arbitrary commands — is refused.
//!
//! Layout mirrors the runtime flow: [`config`] establishes the immutable
//! [`DaemonConfig`]; [`daemon`] owns the accept loop; [`session`] adapts
//! ssh channels onto the engines; [`command`] parses exec payloads;
//! [`auth`] checks credentials; [`cli`] is the binary entry point.

pub mod auth;
pub mod cli;
pub mod command;
pub mod config;
pub mod daemon;
pub mod error;
mod exit;
mod session;

pub use config::{DaemonConfig, Settings};
pub use daemon::run_daemon;
pub use error::DaemonError;

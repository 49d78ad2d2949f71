//! Session adapter: ssh channels onto the transfer engines.
//!
//! One handler serves one authenticated connection. Session channels are
//! parked until their exec request arrives; the exec payload picks the
//! engine, the channel's byte stream becomes the engine's channel, and the
//! engine's outcome is reported through the `exit-status` request. Shell
//! requests are refused, `env` requests acknowledged and ignored.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use russh::keys::PublicKey;
use russh::server::{Auth, Handle, Handler, Msg, Session};
use russh::{Channel, ChannelId, CryptoVec};
use tokio::io::AsyncWriteExt;

use scpd_engine::{sink, source, TransferMode, TransferRequest};

use crate::auth;
use crate::command::{self, CommandError};
use crate::config::DaemonConfig;
use crate::error::DaemonError;
use crate::exit;

const REFUSE_EXEC: &[u8] = b"Only scp is supported\n";
const REFUSE_SHELL: &[u8] = b"Opening a shell is not supported by this server\n";

/// Per-connection ssh handler.
pub(crate) struct SessionHandler {
    config: Arc<DaemonConfig>,
    peer: Option<SocketAddr>,
    channels: HashMap<ChannelId, Channel<Msg>>,
}

impl SessionHandler {
    pub(crate) fn new(config: Arc<DaemonConfig>, peer: Option<SocketAddr>) -> Self {
        Self {
            config,
            peer,
            channels: HashMap::new(),
        }
    }

    fn check_public_key(&self, user: &str, key: &PublicKey) -> Auth {
        if user == self.config.username
            && self
                .config
                .authorized_keys
                .iter()
                .any(|authorized| authorized == key)
        {
            Auth::Accept
        } else {
            reject()
        }
    }
}

fn reject() -> Auth {
    Auth::Reject {
        proceed_with_methods: None,
        partial_success: false,
    }
}

impl Handler for SessionHandler {
    type Error = DaemonError;

    async fn auth_password(&mut self, user: &str, password: &str) -> Result<Auth, Self::Error> {
        if user == self.config.username && auth::verify_password(&self.config.password, password) {
            tracing::info!(user, peer = ?self.peer, "password accepted");
            Ok(Auth::Accept)
        } else {
            tracing::info!(user, peer = ?self.peer, "password rejected");
            Ok(reject())
        }
    }

    async fn auth_publickey_offered(
        &mut self,
        user: &str,
        key: &PublicKey,
    ) -> Result<Auth, Self::Error> {
        Ok(self.check_public_key(user, key))
    }

    async fn auth_publickey(&mut self, user: &str, key: &PublicKey) -> Result<Auth, Self::Error> {
        let auth = self.check_public_key(user, key);
        if matches!(auth, Auth::Accept) {
            tracing::info!(user, peer = ?self.peer, "public key accepted");
        }
        Ok(auth)
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        self.channels.insert(channel.id(), channel);
        Ok(true)
    }

    async fn exec_request(
        &mut self,
        channel_id: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let handle = session.handle();
        let Some(channel) = self.channels.remove(&channel_id) else {
            tracing::debug!(?channel_id, "exec request for an unknown channel");
            let _ = session.channel_failure(channel_id);
            return Ok(());
        };

        match command::parse_request(data) {
            Ok(request) => {
                tracing::info!(peer = ?self.peer, ?request, "starting transfer");
                let _ = session.channel_success(channel_id);
                let config = Arc::clone(&self.config);
                tokio::spawn(run_transfer(channel, handle, channel_id, config, request));
            }
            Err(CommandError::UnsupportedCommand) => {
                tracing::info!(peer = ?self.peer, "refusing non-scp exec request");
                let _ = session.channel_failure(channel_id);
                tokio::spawn(async move {
                    let mut stream = channel.into_stream();
                    let _ = stream.write_all(REFUSE_EXEC).await;
                    let _ = stream.flush().await;
                    let _ = handle.close(channel_id).await;
                });
            }
            Err(CommandError::AmbiguousTarget) => {
                tracing::info!(peer = ?self.peer, "refusing ambiguous sink target");
                let _ = session.channel_success(channel_id);
                tokio::spawn(async move {
                    let mut stream = channel.into_stream();
                    let _ =
                        scpd_protocol::write_warning(&mut stream, "scp: ambiguous target").await;
                    exit::report(&handle, channel_id, 1).await;
                });
            }
            Err(error) => {
                tracing::info!(peer = ?self.peer, %error, "refusing malformed scp command");
                let _ = session.channel_failure(channel_id);
                drop(channel);
                tokio::spawn(async move {
                    exit::report(&handle, channel_id, 1).await;
                });
            }
        }
        Ok(())
    }

    async fn shell_request(
        &mut self,
        channel_id: ChannelId,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        tracing::info!(peer = ?self.peer, "refusing shell request");
        let _ = session.data(channel_id, CryptoVec::from_slice(REFUSE_SHELL));
        let _ = session.channel_failure(channel_id);
        Ok(())
    }

    async fn env_request(
        &mut self,
        channel_id: ChannelId,
        name: &str,
        _value: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        // Accepted but ignored; no environment reaches an engine.
        tracing::debug!(name, "ignoring env request");
        let _ = session.channel_success(channel_id);
        Ok(())
    }
}

/// Runs the selected engine over the channel's byte stream and reports the
/// outcome. The stream stays alive until after the exit status is sent so
/// the close ordering on the wire is deterministic.
async fn run_transfer(
    channel: Channel<Msg>,
    handle: Handle,
    channel_id: ChannelId,
    config: Arc<DaemonConfig>,
    request: TransferRequest,
) {
    let mut stream = channel.into_stream();
    let outcome = match request.mode {
        TransferMode::Source => {
            source::run_source(&mut stream, &config.share_root, &request).await
        }
        TransferMode::Sink => sink::run_sink(&mut stream, &config.share_root, &request).await,
    };
    let status = match outcome {
        Ok(status) => status.code(),
        Err(error) => {
            tracing::warn!(targets = ?request.targets, %error, "transfer aborted");
            1
        }
    };
    exit::report(&handle, channel_id, status).await;
    drop(stream);
}

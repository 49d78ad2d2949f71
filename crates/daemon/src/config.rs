//! Daemon configuration.
//!
//! [`Settings`] carries the raw values from flags and environment;
//! [`Settings::into_config`] turns them into the immutable [`DaemonConfig`]
//! every session shares: the canonical shared root, the sole permitted
//! principal and its credentials, and the server's host key. Nothing here
//! mutates after startup.

use std::env;
use std::fs;
use std::path::PathBuf;

use rand::distributions::Alphanumeric;
use rand::Rng;
use russh::keys::{load_secret_key, Algorithm, PrivateKey, PublicKey};

use crate::auth;
use crate::error::DaemonError;

/// Default listen port.
pub const DEFAULT_PORT: u16 = 2222;
/// Default principal name.
pub const DEFAULT_USERNAME: &str = "scpuser";
/// Length of a generated password.
const GENERATED_PASSWORD_LEN: usize = 15;

/// Raw configuration surface, before validation.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    /// Directory to share; the working directory when unset.
    pub share_dir: Option<PathBuf>,
    /// TCP port to listen on; [`DEFAULT_PORT`] when unset.
    pub port: Option<u16>,
    /// Sole permitted principal; [`DEFAULT_USERNAME`] when unset.
    pub username: Option<String>,
    /// Password for the principal; generated and logged once when unset.
    pub password: Option<String>,
    /// Host key file; an ephemeral key is generated when unset.
    pub host_key_path: Option<PathBuf>,
    /// Authorized keys file for the principal; password-only when unset.
    pub authorized_keys_path: Option<PathBuf>,
    /// Serve exactly one connection, then exit.
    pub one_shot: bool,
}

/// Immutable per-process configuration shared by all sessions.
#[derive(Debug)]
pub struct DaemonConfig {
    /// Canonical absolute directory the server exposes.
    pub share_root: PathBuf,
    /// TCP port to bind.
    pub port: u16,
    /// Sole permitted principal.
    pub username: String,
    /// Password for the principal.
    pub password: String,
    /// Host key identifying this server.
    pub host_key: PrivateKey,
    /// Public keys accepted for the principal.
    pub authorized_keys: Vec<PublicKey>,
    /// Serve exactly one connection, then exit.
    pub one_shot: bool,
}

impl Settings {
    /// Validates the settings and establishes the process configuration.
    ///
    /// Canonicalises the shared root, loads or generates the host key, and
    /// generates (and logs, once) a password when none was supplied.
    pub fn into_config(self) -> Result<DaemonConfig, DaemonError> {
        let share_dir = match self.share_dir {
            Some(dir) => dir,
            None => env::current_dir()?,
        };
        let share_root = share_dir.canonicalize().map_err(|error| {
            DaemonError::Config(format!(
                "shared directory {} is not usable: {error}",
                share_dir.display()
            ))
        })?;
        if !share_root.is_dir() {
            return Err(DaemonError::Config(format!(
                "shared directory {} is not a directory",
                share_root.display()
            )));
        }
        tracing::info!(root = %share_root.display(), "sharing files");

        let username = self.username.unwrap_or_else(|| DEFAULT_USERNAME.to_string());
        tracing::info!(user = %username, "allowing logins");

        let password = match self.password {
            Some(password) => password,
            None => {
                let password = generate_password();
                tracing::info!(user = %username, %password, "generated password");
                password
            }
        };

        let host_key = match self.host_key_path {
            Some(path) => load_secret_key(&path, None)?,
            None => {
                tracing::info!("generating ephemeral host key");
                PrivateKey::random(&mut rand::rngs::OsRng, Algorithm::Ed25519)
                    .map_err(russh::keys::Error::from)?
            }
        };

        let authorized_keys = match self.authorized_keys_path {
            Some(path) => match fs::read_to_string(&path) {
                Ok(contents) => {
                    let keys = auth::parse_authorized_keys(&contents);
                    tracing::info!(count = keys.len(), file = %path.display(), "loaded authorized keys");
                    keys
                }
                Err(error) => {
                    tracing::warn!(file = %path.display(), %error, "ignoring unreadable authorized keys file");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        Ok(DaemonConfig {
            share_root,
            port: self.port.unwrap_or(DEFAULT_PORT),
            username,
            password,
            host_key,
            authorized_keys,
            one_shot: self.one_shot,
        })
    }
}

/// Random alphanumeric password for the configured principal.
fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_PASSWORD_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_passwords_are_alphanumeric_and_sized() {
        let password = generate_password();
        assert_eq!(password.len(), GENERATED_PASSWORD_LEN);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn generated_passwords_differ() {
        assert_ne!(generate_password(), generate_password());
    }

    #[test]
    fn defaults_fill_in() {
        let root = tempfile::tempdir().unwrap();
        let config = Settings {
            share_dir: Some(root.path().to_path_buf()),
            ..Settings::default()
        }
        .into_config()
        .unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.username, DEFAULT_USERNAME);
        assert_eq!(config.password.len(), GENERATED_PASSWORD_LEN);
        assert!(config.authorized_keys.is_empty());
        assert!(!config.one_shot);
        assert!(config.share_root.is_absolute());
    }

    #[test]
    fn missing_share_dir_is_a_config_error() {
        let result = Settings {
            share_dir: Some(PathBuf::from("/definitely/not/here")),
            ..Settings::default()
        }
        .into_config();
        assert!(matches!(result, Err(DaemonError::Config(_))));
    }
}

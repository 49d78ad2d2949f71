//! Binary entry point.
//!
//! Flags mirror the legacy environment surface, and every flag falls back
//! to its `SCPD_*` variable so the server can be configured either way.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{value_parser, Arg, ArgAction, Command};
use tracing_subscriber::EnvFilter;

use crate::config::{Settings, DEFAULT_PORT, DEFAULT_USERNAME};
use crate::daemon::run_daemon;

/// Runs the daemon CLI and returns the process exit code.
pub fn run<I, S>(arguments: I) -> i32
where
    I: IntoIterator<Item = S>,
    S: Into<OsString> + Clone,
{
    let matches = match build_command().try_get_matches_from(arguments) {
        Ok(matches) => matches,
        Err(error) => {
            // --help and --version land here too; clap knows the code.
            let _ = error.print();
            return error.exit_code();
        }
    };

    init_tracing();

    let settings = Settings {
        share_dir: matches.get_one::<PathBuf>("share-dir").cloned(),
        port: matches.get_one::<u16>("port").copied(),
        username: matches.get_one::<String>("user").cloned(),
        password: matches.get_one::<String>("password").cloned(),
        host_key_path: matches.get_one::<PathBuf>("host-key").cloned(),
        authorized_keys_path: matches.get_one::<PathBuf>("authorized-keys").cloned(),
        one_shot: matches.get_flag("one-shot"),
    };

    let config = match settings.into_config() {
        Ok(config) => config,
        Err(error) => {
            tracing::error!(%error, "refusing to start");
            return 1;
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(error) => {
            tracing::error!(%error, "failed to start the async runtime");
            return 1;
        }
    };

    match runtime.block_on(run_daemon(config)) {
        Ok(()) => 0,
        Err(error) => {
            tracing::error!(%error, "daemon failed");
            1
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_command() -> Command {
    Command::new("scpd")
        .about("Serve a single directory tree to scp clients over ssh")
        .arg(
            Arg::new("share-dir")
                .long("share-dir")
                .env("SCPD_DIR")
                .value_name("DIR")
                .value_parser(value_parser!(PathBuf))
                .help("Directory to share (defaults to the working directory)"),
        )
        .arg(
            Arg::new("port")
                .long("port")
                .env("SCPD_PORT")
                .value_name("PORT")
                .value_parser(value_parser!(u16))
                .help(format!("TCP port to listen on (defaults to {DEFAULT_PORT})")),
        )
        .arg(
            Arg::new("user")
                .long("user")
                .env("SCPD_USER")
                .value_name("NAME")
                .help(format!(
                    "Sole permitted login (defaults to {DEFAULT_USERNAME})"
                )),
        )
        .arg(
            Arg::new("password")
                .long("password")
                .env("SCPD_PASS")
                .value_name("PASSWORD")
                .help("Password for the login (generated and logged once when unset)"),
        )
        .arg(
            Arg::new("host-key")
                .long("host-key")
                .env("SCPD_HOST_KEY")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("Host key file (an ephemeral key is generated when unset)"),
        )
        .arg(
            Arg::new("authorized-keys")
                .long("authorized-keys")
                .env("SCPD_AUTHORIZED_KEYS")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("Authorized keys file for the login (password-only when unset)"),
        )
        .arg(
            Arg::new("one-shot")
                .long("one-shot")
                .action(ArgAction::SetTrue)
                .hide(true)
                .help("Serve exactly one connection, then exit"),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_definition_is_consistent() {
        build_command().debug_assert();
    }

    #[test]
    fn flags_parse_into_settings() {
        let matches = build_command()
            .try_get_matches_from([
                "scpd",
                "--share-dir",
                "/srv/share",
                "--port",
                "2022",
                "--user",
                "alice",
                "--one-shot",
            ])
            .unwrap();
        assert_eq!(
            matches.get_one::<PathBuf>("share-dir"),
            Some(&PathBuf::from("/srv/share"))
        );
        assert_eq!(matches.get_one::<u16>("port"), Some(&2022));
        assert_eq!(matches.get_one::<String>("user").unwrap(), "alice");
        assert!(matches.get_flag("one-shot"));
    }

    #[test]
    fn invalid_port_is_rejected() {
        assert!(build_command()
            .try_get_matches_from(["scpd", "--port", "not-a-port"])
            .is_err());
    }
}

//! Exec payload dispatch.
//!
//! The transport hands over the exec command already stripped of its
//! length prefix. The payload is word-split POSIX-style (quotes and
//! backslash escapes honoured), anything from a `;` or `&&` separator on
//! is discarded, and the remaining tokens must form a well-formed `scp`
//! remote command: mode flag, options, targets.

use thiserror::Error;

use scpd_engine::{TransferMode, TransferRequest};

/// Reasons an exec payload is refused before any engine runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// The command is not `scp` (or the payload is empty).
    #[error("only scp is supported")]
    UnsupportedCommand,
    /// The payload could not be word-split (unbalanced quoting).
    #[error("exec payload is not parseable")]
    Unparsable,
    /// Neither `-f` nor `-t` was supplied.
    #[error("missing -f or -t")]
    MissingMode,
    /// Both `-f` and `-t` were supplied.
    #[error("both -f and -t supplied")]
    ConflictingModes,
    /// A sink request named more than one target.
    #[error("ambiguous target")]
    AmbiguousTarget,
    /// No target operand was supplied.
    #[error("missing target operand")]
    MissingTarget,
}

/// Parses and validates an exec payload into a [`TransferRequest`].
pub fn parse_request(payload: &[u8]) -> Result<TransferRequest, CommandError> {
    let text = String::from_utf8_lossy(payload);
    let tokens = shlex::split(&text).ok_or(CommandError::Unparsable)?;

    // Chained command fragments are never executed; everything from the
    // first separator on is dropped before mode selection.
    let mut tokens = tokens
        .into_iter()
        .take_while(|token| token != ";" && token != "&&");

    match tokens.next() {
        Some(program) if program == "scp" => {}
        _ => return Err(CommandError::UnsupportedCommand),
    }

    let mut saw_source = false;
    let mut saw_sink = false;
    let mut target_is_directory = false;
    let mut recursive = false;
    let mut preserve_times = false;
    let mut targets = Vec::new();
    let mut parsing_flags = true;

    for token in tokens {
        if parsing_flags {
            match token.as_str() {
                "-f" => saw_source = true,
                "-t" => saw_sink = true,
                "-d" => target_is_directory = true,
                "-r" => recursive = true,
                // Verbosity is a client-side affair; accept and ignore.
                "-v" => {}
                "-p" => preserve_times = true,
                "--" => parsing_flags = false,
                _ => {
                    parsing_flags = false;
                    targets.push(token);
                }
            }
        } else {
            targets.push(token);
        }
    }

    let mode = match (saw_source, saw_sink) {
        (true, false) => TransferMode::Source,
        (false, true) => TransferMode::Sink,
        (true, true) => return Err(CommandError::ConflictingModes),
        (false, false) => return Err(CommandError::MissingMode),
    };

    match mode {
        TransferMode::Sink if targets.len() > 1 => return Err(CommandError::AmbiguousTarget),
        _ if targets.is_empty() => return Err(CommandError::MissingTarget),
        _ => {}
    }

    Ok(TransferRequest {
        mode,
        target_is_directory,
        recursive,
        preserve_times,
        targets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(payload: &str) -> Result<TransferRequest, CommandError> {
        parse_request(payload.as_bytes())
    }

    #[test]
    fn parses_a_plain_source_command() {
        let request = parse("scp -f hello.txt").unwrap();
        assert_eq!(request.mode, TransferMode::Source);
        assert_eq!(request.targets, vec!["hello.txt"]);
        assert!(!request.recursive);
        assert!(!request.preserve_times);
        assert!(!request.target_is_directory);
    }

    #[test]
    fn parses_all_option_flags() {
        let request = parse("scp -r -p -d -v -t dest").unwrap();
        assert_eq!(request.mode, TransferMode::Sink);
        assert!(request.recursive);
        assert!(request.preserve_times);
        assert!(request.target_is_directory);
        assert_eq!(request.targets, vec!["dest"]);
    }

    #[test]
    fn source_accepts_multiple_targets_in_order() {
        let request = parse("scp -f a b c").unwrap();
        assert_eq!(request.targets, vec!["a", "b", "c"]);
    }

    #[test]
    fn sink_with_two_targets_is_ambiguous() {
        assert_eq!(parse("scp -t a b"), Err(CommandError::AmbiguousTarget));
    }

    #[test]
    fn non_scp_commands_are_refused() {
        assert_eq!(parse("bash -c id"), Err(CommandError::UnsupportedCommand));
        assert_eq!(parse(""), Err(CommandError::UnsupportedCommand));
    }

    #[test]
    fn both_modes_are_refused() {
        assert_eq!(parse("scp -f -t x"), Err(CommandError::ConflictingModes));
    }

    #[test]
    fn missing_mode_is_refused() {
        assert_eq!(parse("scp x"), Err(CommandError::MissingMode));
    }

    #[test]
    fn missing_target_is_refused() {
        assert_eq!(parse("scp -f"), Err(CommandError::MissingTarget));
        assert_eq!(parse("scp -t"), Err(CommandError::MissingTarget));
    }

    #[test]
    fn double_dash_ends_flag_parsing() {
        let request = parse("scp -f -- -r").unwrap();
        assert_eq!(request.targets, vec!["-r"]);
        assert!(!request.recursive);
    }

    #[test]
    fn first_non_flag_token_ends_flag_parsing() {
        let request = parse("scp -f name -r").unwrap();
        assert_eq!(request.targets, vec!["name", "-r"]);
        assert!(!request.recursive);
    }

    #[test]
    fn quoting_keeps_spaces_in_targets() {
        let request = parse("scp -f 'two words.txt' \"and more\"").unwrap();
        assert_eq!(request.targets, vec!["two words.txt", "and more"]);
    }

    #[test]
    fn unbalanced_quotes_are_unparsable() {
        assert_eq!(parse("scp -f 'oops"), Err(CommandError::Unparsable));
    }

    #[test]
    fn chained_fragments_are_discarded() {
        let request = parse("scp -f a ; rm -rf /").unwrap();
        assert_eq!(request.targets, vec!["a"]);
        let request = parse("scp -f a && touch /tmp/x").unwrap();
        assert_eq!(request.targets, vec!["a"]);
    }

    #[test]
    fn chained_fragment_cannot_supply_the_mode() {
        assert_eq!(
            parse("scp a ; scp -f b"),
            Err(CommandError::MissingMode)
        );
    }
}

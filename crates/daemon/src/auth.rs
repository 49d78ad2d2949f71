//! Credential checks for the single configured principal.

use russh::keys::{parse_public_key_base64, PublicKey};

/// Compares an offered password against the configured one without leaking
/// where they diverge through timing.
#[must_use]
pub fn verify_password(expected: &str, offered: &str) -> bool {
    let expected = expected.as_bytes();
    let offered = offered.as_bytes();
    let mut diff = u8::from(expected.len() != offered.len());
    for (index, &byte) in expected.iter().enumerate() {
        diff |= byte ^ offered.get(index).copied().unwrap_or(0);
    }
    diff == 0
}

/// Parses an OpenSSH `authorized_keys` body: one key per line, `#` comments
/// and blank lines skipped, unparsable lines logged and ignored.
#[must_use]
pub fn parse_authorized_keys(contents: &str) -> Vec<PublicKey> {
    let mut keys = Vec::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        // OpenSSH format: "<algorithm> <base64-key> [comment]".
        let mut fields = line.split_whitespace();
        let (Some(_algorithm), Some(encoded)) = (fields.next(), fields.next()) else {
            tracing::warn!(line, "ignoring malformed authorized keys line");
            continue;
        };
        match parse_public_key_base64(encoded) {
            Ok(key) => keys.push(key),
            Err(error) => {
                tracing::warn!(%error, "ignoring unparsable public key");
            }
        }
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_passwords_verify() {
        assert!(verify_password("hunter2", "hunter2"));
    }

    #[test]
    fn unequal_passwords_fail() {
        assert!(!verify_password("hunter2", "hunter3"));
        assert!(!verify_password("hunter2", "hunter"));
        assert!(!verify_password("hunter2", ""));
        assert!(!verify_password("", "hunter2"));
    }

    #[test]
    fn empty_passwords_match() {
        assert!(verify_password("", ""));
    }

    #[test]
    fn comments_and_blanks_are_skipped() {
        let contents = "# heading\n\n   \n# another comment\n";
        assert!(parse_authorized_keys(contents).is_empty());
    }

    #[test]
    fn garbage_lines_are_ignored() {
        let contents = "not-a-key\nssh-ed25519 %%%not-base64%%% comment\n";
        assert!(parse_authorized_keys(contents).is_empty());
    }

    #[test]
    fn valid_key_lines_parse() {
        // A real ed25519 public key line (generated once for the tests).
        let contents =
            "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIKNxu6+0vuKJ1OXcHWf96WDU5Ju8oT/IR2o0dQOPU7gV test@example\n";
        let keys = parse_authorized_keys(contents);
        assert_eq!(keys.len(), 1);
    }
}

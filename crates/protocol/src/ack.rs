//! Status bytes exchanged between the records.
//!
//! Every record (and every file payload) is answered with a single status
//! byte. `0x00` acknowledges; `0x01` and `0x02` carry a newline-terminated
//! message, where `0x01` is recoverable and `0x02` ends the session. The
//! same `\x01`-prefixed form doubles as the side channel the server uses to
//! report recoverable failures to the client.

use std::io;

use tokio::io::{AsyncBufRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ProtocolError;
use crate::record::read_bounded_line;
use crate::ProtocolResult;

/// Everything is fine; keep going.
pub const STATUS_OK: u8 = 0x00;
/// Recoverable failure; a message follows.
pub const STATUS_WARNING: u8 = 0x01;
/// Fatal failure; a message follows and the session ends.
pub const STATUS_FATAL: u8 = 0x02;

/// A classified status byte read from the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientStatus {
    /// The peer acknowledged the last record or payload.
    Ok,
    /// The peer reported a recoverable failure.
    Warning(String),
    /// The peer reported a fatal failure; stop sending and close.
    Fatal(String),
}

impl ClientStatus {
    /// Returns `true` for the plain acknowledgement.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// Reads and classifies exactly one status from the peer.
///
/// For the warning and fatal forms the trailing message is consumed up to
/// its newline, bounded like a control record.
pub async fn read_client_status<R>(reader: &mut R) -> ProtocolResult<ClientStatus>
where
    R: AsyncBufRead + Unpin,
{
    let mut status = [0u8; 1];
    reader.read_exact(&mut status).await?;
    match status[0] {
        STATUS_OK => Ok(ClientStatus::Ok),
        status @ (STATUS_WARNING | STATUS_FATAL) => {
            let line = read_bounded_line(reader)
                .await?
                .ok_or(ProtocolError::TruncatedRecord)?;
            let message = String::from_utf8_lossy(&line).into_owned();
            if status == STATUS_WARNING {
                Ok(ClientStatus::Warning(message))
            } else {
                Ok(ClientStatus::Fatal(message))
            }
        }
        status => Err(ProtocolError::InvalidStatus { status }),
    }
}

/// Writes the plain acknowledgement byte.
pub async fn write_ok<W>(writer: &mut W) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&[STATUS_OK]).await?;
    writer.flush().await
}

/// Writes a recoverable `\x01<message>\n` report.
pub async fn write_warning<W>(writer: &mut W, message: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    write_status(writer, STATUS_WARNING, message).await
}

/// Writes a fatal `\x02<message>\n` report.
pub async fn write_fatal<W>(writer: &mut W, message: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    write_status(writer, STATUS_FATAL, message).await
}

async fn write_status<W>(writer: &mut W, status: u8, message: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = Vec::with_capacity(message.len() + 2);
    line.push(status);
    line.extend_from_slice(message.as_bytes());
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn classifies_plain_ack() {
        let wire: &[u8] = &[STATUS_OK];
        let mut reader = BufReader::new(wire);
        assert_eq!(
            read_client_status(&mut reader).await.unwrap(),
            ClientStatus::Ok
        );
    }

    #[tokio::test]
    async fn classifies_warning_with_message() {
        let wire: &[u8] = b"\x01scp: lost one\n";
        let mut reader = BufReader::new(wire);
        assert_eq!(
            read_client_status(&mut reader).await.unwrap(),
            ClientStatus::Warning("scp: lost one".to_string())
        );
    }

    #[tokio::test]
    async fn classifies_fatal_with_message() {
        let wire: &[u8] = b"\x02scp: goodbye\n";
        let mut reader = BufReader::new(wire);
        assert_eq!(
            read_client_status(&mut reader).await.unwrap(),
            ClientStatus::Fatal("scp: goodbye".to_string())
        );
    }

    #[tokio::test]
    async fn rejects_unknown_status_byte() {
        let wire: &[u8] = &[0x07];
        let mut reader = BufReader::new(wire);
        assert!(matches!(
            read_client_status(&mut reader).await,
            Err(ProtocolError::InvalidStatus { status: 0x07 })
        ));
    }

    #[tokio::test]
    async fn warning_without_newline_is_truncated() {
        let wire: &[u8] = b"\x01half a message";
        let mut reader = BufReader::new(wire);
        assert!(matches!(
            read_client_status(&mut reader).await,
            Err(ProtocolError::TruncatedRecord)
        ));
    }

    #[tokio::test]
    async fn writers_emit_the_documented_framing() {
        let mut wire = Vec::new();
        write_ok(&mut wire).await.unwrap();
        write_warning(&mut wire, "scp: f: No such file or directory")
            .await
            .unwrap();
        write_fatal(&mut wire, "scp: Protocol Error").await.unwrap();
        assert_eq!(
            wire,
            b"\x00\x01scp: f: No such file or directory\n\x02scp: Protocol Error\n"
        );
    }
}

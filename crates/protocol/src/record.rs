//! Control record encoding and decoding.
//!
//! One record is one ASCII line terminated by a single `\n`:
//!
//! | kind | format |
//! |------|--------|
//! | times | `T<mtime_sec> 0 <atime_sec> 0` |
//! | file header | `C<octal-mode> <decimal-size> <name>` |
//! | directory enter | `D<octal-mode> 0 <name>` |
//! | directory leave | `E` |
//!
//! The octal mode carries the nine permission bits with a leading zero
//! (`0644`). Names are bare leaf names; `/` and `\n` are refused on both
//! encode and decode so a record can never smuggle a path.

use std::str;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::error::ProtocolError;
use crate::ProtocolResult;

/// Hard cap on one record line, terminating newline included.
pub const MAX_RECORD_LEN: usize = 256;

/// Permission bits carried in `C` and `D` records.
pub const MODE_MASK: u32 = 0o777;

/// One parsed control record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlRecord {
    /// Timestamps for the entry announced by the next `C` or `D` record.
    Times {
        /// Modification time, seconds since the Unix epoch.
        mtime_sec: i64,
        /// Access time, seconds since the Unix epoch.
        atime_sec: i64,
    },
    /// A regular file; exactly `size` payload bytes follow the ack.
    FileHeader {
        /// Permission bits (nine-bit mask).
        mode: u32,
        /// Payload length in bytes.
        size: u64,
        /// Leaf name of the file.
        name: String,
    },
    /// Descend into a directory.
    DirEnter {
        /// Permission bits (nine-bit mask).
        mode: u32,
        /// Leaf name of the directory.
        name: String,
    },
    /// Leave the current directory.
    DirLeave,
}

impl ControlRecord {
    /// Encodes the record into its wire line, newline included.
    ///
    /// Fails with [`ProtocolError::InvalidName`] for names carrying `/` or
    /// `\n`, and with [`ProtocolError::RecordTooLong`] when the encoded line
    /// would not fit the framing bound.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        let line = match self {
            Self::Times {
                mtime_sec,
                atime_sec,
            } => format!("T{mtime_sec} 0 {atime_sec} 0\n"),
            Self::FileHeader { mode, size, name } => {
                validate_name(name)?;
                format!("C{:04o} {} {}\n", mode & MODE_MASK, size, name)
            }
            Self::DirEnter { mode, name } => {
                validate_name(name)?;
                format!("D{:04o} 0 {}\n", mode & MODE_MASK, name)
            }
            Self::DirLeave => "E\n".to_string(),
        };
        if line.len() > MAX_RECORD_LEN {
            return Err(ProtocolError::RecordTooLong);
        }
        Ok(line.into_bytes())
    }

    /// Parses one record line with the terminating newline already stripped.
    pub fn parse(line: &[u8]) -> ProtocolResult<Self> {
        let (&tag, rest) = line.split_first().ok_or(ProtocolError::MalformedRecord {
            reason: "empty record",
        })?;
        match tag {
            b'T' => parse_times(rest),
            b'C' => {
                let (mode, size, name) = parse_entry(rest)?;
                Ok(Self::FileHeader { mode, size, name })
            }
            b'D' => {
                // The size field is present on the wire but carries no meaning
                // for directories.
                let (mode, _, name) = parse_entry(rest)?;
                Ok(Self::DirEnter { mode, name })
            }
            b'E' => {
                if rest.is_empty() {
                    Ok(Self::DirLeave)
                } else {
                    Err(ProtocolError::MalformedRecord {
                        reason: "unexpected bytes after E",
                    })
                }
            }
            tag => Err(ProtocolError::UnknownTag { tag }),
        }
    }
}

/// Reads exactly one control record from `reader`.
///
/// Returns `Ok(None)` on a clean end of stream before the first byte, which
/// is how the peer signals that no more entries follow. An end of stream in
/// the middle of a record is [`ProtocolError::TruncatedRecord`].
pub async fn read_record<R>(reader: &mut R) -> ProtocolResult<Option<ControlRecord>>
where
    R: AsyncBufRead + Unpin,
{
    match read_bounded_line(reader).await? {
        None => Ok(None),
        Some(line) => ControlRecord::parse(&line).map(Some),
    }
}

/// Reads one `\n`-terminated line of at most [`MAX_RECORD_LEN`] bytes,
/// newline stripped. `Ok(None)` means the stream ended before any byte.
pub(crate) async fn read_bounded_line<R>(reader: &mut R) -> ProtocolResult<Option<Vec<u8>>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let mut bounded = reader.take(MAX_RECORD_LEN as u64);
    let read = bounded.read_until(b'\n', &mut line).await?;
    if read == 0 {
        return Ok(None);
    }
    if line.last() == Some(&b'\n') {
        line.pop();
        return Ok(Some(line));
    }
    if read == MAX_RECORD_LEN {
        Err(ProtocolError::RecordTooLong)
    } else {
        Err(ProtocolError::TruncatedRecord)
    }
}

fn validate_name(name: &str) -> ProtocolResult<()> {
    if name.is_empty() || name.contains('/') || name.contains('\n') {
        return Err(ProtocolError::InvalidName);
    }
    Ok(())
}

fn parse_times(rest: &[u8]) -> ProtocolResult<ControlRecord> {
    let text = str::from_utf8(rest).map_err(|_| ProtocolError::MalformedRecord {
        reason: "times record is not ASCII",
    })?;
    let mut fields = text.split_ascii_whitespace();
    let mtime_sec = fields
        .next()
        .and_then(|field| field.parse::<i64>().ok())
        .ok_or(ProtocolError::MalformedRecord {
            reason: "bad mtime field",
        })?;
    // The second field is a sub-second count the protocol fixes at zero;
    // anything past the fourth field is ignored.
    let _ = fields.next();
    let atime_sec = fields
        .next()
        .and_then(|field| field.parse::<i64>().ok())
        .ok_or(ProtocolError::MalformedRecord {
            reason: "bad atime field",
        })?;
    Ok(ControlRecord::Times {
        mtime_sec,
        atime_sec,
    })
}

fn parse_entry(rest: &[u8]) -> ProtocolResult<(u32, u64, String)> {
    let text = str::from_utf8(rest).map_err(|_| ProtocolError::MalformedRecord {
        reason: "record is not valid UTF-8",
    })?;
    let mut fields = text.splitn(3, ' ');
    let mode_field = fields.next().unwrap_or("");
    let size_field = fields.next().ok_or(ProtocolError::MalformedRecord {
        reason: "missing size field",
    })?;
    let name = fields.next().ok_or(ProtocolError::MalformedRecord {
        reason: "missing name field",
    })?;
    let mode =
        u32::from_str_radix(mode_field, 8).map_err(|_| ProtocolError::MalformedRecord {
            reason: "bad mode field",
        })?;
    let size = size_field
        .parse::<u64>()
        .map_err(|_| ProtocolError::MalformedRecord {
            reason: "bad size field",
        })?;
    validate_name(name)?;
    Ok((mode, size, name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[test]
    fn encodes_file_header_with_leading_zero_mode() {
        let record = ControlRecord::FileHeader {
            mode: 0o644,
            size: 3,
            name: "hello.txt".to_string(),
        };
        assert_eq!(record.encode().unwrap(), b"C0644 3 hello.txt\n");
    }

    #[test]
    fn encodes_dir_enter_with_zero_size() {
        let record = ControlRecord::DirEnter {
            mode: 0o755,
            name: "d".to_string(),
        };
        assert_eq!(record.encode().unwrap(), b"D0755 0 d\n");
    }

    #[test]
    fn encode_masks_mode_to_permission_bits() {
        let record = ControlRecord::FileHeader {
            mode: 0o100644,
            size: 0,
            name: "f".to_string(),
        };
        assert_eq!(record.encode().unwrap(), b"C0644 0 f\n");
    }

    #[test]
    fn encode_refuses_names_with_separator() {
        let record = ControlRecord::FileHeader {
            mode: 0o644,
            size: 0,
            name: "a/b".to_string(),
        };
        assert!(matches!(record.encode(), Err(ProtocolError::InvalidName)));
    }

    #[test]
    fn encode_refuses_oversized_names() {
        let record = ControlRecord::FileHeader {
            mode: 0o644,
            size: 0,
            name: "x".repeat(MAX_RECORD_LEN),
        };
        assert!(matches!(record.encode(), Err(ProtocolError::RecordTooLong)));
    }

    #[test]
    fn parses_times_record_ignoring_trailing_fields() {
        let record = ControlRecord::parse(b"T1700000000 0 1700000100 0 extra").unwrap();
        assert_eq!(
            record,
            ControlRecord::Times {
                mtime_sec: 1_700_000_000,
                atime_sec: 1_700_000_100,
            }
        );
    }

    #[test]
    fn parses_negative_times() {
        let record = ControlRecord::parse(b"T-5 0 -10 0").unwrap();
        assert_eq!(
            record,
            ControlRecord::Times {
                mtime_sec: -5,
                atime_sec: -10,
            }
        );
    }

    #[test]
    fn parses_file_header_with_spaces_in_name() {
        let record = ControlRecord::parse(b"C0600 12 two words.txt").unwrap();
        assert_eq!(
            record,
            ControlRecord::FileHeader {
                mode: 0o600,
                size: 12,
                name: "two words.txt".to_string(),
            }
        );
    }

    #[test]
    fn rejects_unknown_tag() {
        assert!(matches!(
            ControlRecord::parse(b"Z0644 0 x"),
            Err(ProtocolError::UnknownTag { tag: b'Z' })
        ));
    }

    #[test]
    fn rejects_dir_leave_with_payload() {
        assert!(matches!(
            ControlRecord::parse(b"Etrailing"),
            Err(ProtocolError::MalformedRecord { .. })
        ));
    }

    #[test]
    fn rejects_header_with_missing_fields() {
        assert!(matches!(
            ControlRecord::parse(b"C0644"),
            Err(ProtocolError::MalformedRecord { .. })
        ));
    }

    #[test]
    fn rejects_name_with_separator() {
        assert!(matches!(
            ControlRecord::parse(b"C0644 0 a/b"),
            Err(ProtocolError::InvalidName)
        ));
    }

    #[tokio::test]
    async fn reads_one_record_per_call() {
        let wire: &[u8] = b"D0755 0 d\nE\n";
        let mut reader = BufReader::new(wire);
        assert_eq!(
            read_record(&mut reader).await.unwrap(),
            Some(ControlRecord::DirEnter {
                mode: 0o755,
                name: "d".to_string(),
            })
        );
        assert_eq!(
            read_record(&mut reader).await.unwrap(),
            Some(ControlRecord::DirLeave)
        );
        assert_eq!(read_record(&mut reader).await.unwrap(), None);
    }

    #[tokio::test]
    async fn truncated_record_is_an_error() {
        let wire: &[u8] = b"C0644 3 hel";
        let mut reader = BufReader::new(wire);
        assert!(matches!(
            read_record(&mut reader).await,
            Err(ProtocolError::TruncatedRecord)
        ));
    }

    #[tokio::test]
    async fn oversized_record_is_an_error() {
        let mut wire = vec![b'C'];
        wire.extend(std::iter::repeat(b'x').take(MAX_RECORD_LEN));
        wire.push(b'\n');
        let mut reader = BufReader::new(wire.as_slice());
        assert!(matches!(
            read_record(&mut reader).await,
            Err(ProtocolError::RecordTooLong)
        ));
    }

    #[tokio::test]
    async fn record_at_the_bound_is_accepted() {
        // Tag + mode + size + name + newline at exactly MAX_RECORD_LEN bytes.
        let name = "x".repeat(MAX_RECORD_LEN - "C0644 0 \n".len() - 1);
        let line = format!("C0644 0 {name}\n");
        assert_eq!(line.len(), MAX_RECORD_LEN);
        let mut reader = BufReader::new(line.as_bytes());
        let record = read_record(&mut reader).await.unwrap().unwrap();
        assert_eq!(
            record,
            ControlRecord::FileHeader {
                mode: 0o644,
                size: 0,
                name,
            }
        );
    }
}

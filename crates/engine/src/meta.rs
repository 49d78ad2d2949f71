//! Small helpers shared by the two engines.

use std::fs::Metadata;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use filetime::FileTime;

use scpd_protocol::{ControlRecord, MODE_MASK};

/// Nine-bit permission mask of a local entry, as carried on the wire.
pub(crate) fn mode_bits(metadata: &Metadata) -> u32 {
    metadata.permissions().mode() & MODE_MASK
}

/// Times record for a local entry, one-second resolution.
pub(crate) fn times_record(metadata: &Metadata) -> ControlRecord {
    ControlRecord::Times {
        mtime_sec: FileTime::from_last_modification_time(metadata).unix_seconds(),
        atime_sec: FileTime::from_last_access_time(metadata).unix_seconds(),
    }
}

/// Leaf name of a path as it appears in record headers.
pub(crate) fn leaf_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| ".".to_string())
}

/// Client-facing reason text for an I/O failure.
///
/// The raw `io::Error` rendering appends an ` (os error N)` suffix that the
/// legacy program never showed; strip it.
pub(crate) fn reason(error: &io::Error) -> String {
    let text = error.to_string();
    match text.find(" (os error") {
        Some(index) => text[..index].to_string(),
        None => text,
    }
}

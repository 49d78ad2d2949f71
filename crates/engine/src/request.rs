//! Decoded transfer request.

/// Which side of the protocol this server plays for the session.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransferMode {
    /// `-f`: the server streams files out of the shared tree.
    Source,
    /// `-t`: the server receives files into the shared tree.
    Sink,
}

/// The validated exec payload, as handed to an engine.
///
/// Invariants established by the dispatcher: exactly one mode is set; a
/// sink request carries exactly one target; a source request carries at
/// least one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferRequest {
    /// Source or sink.
    pub mode: TransferMode,
    /// `-d`: the target names a directory.
    pub target_is_directory: bool,
    /// `-r`: descend into directories.
    pub recursive: bool,
    /// `-p`: carry and apply timestamps.
    pub preserve_times: bool,
    /// Target operands in request order.
    pub targets: Vec<String>,
}

//! Final session status delivered through the transport.

/// Outcome of a transfer, reported as the session's exit status.
///
/// The protocol distinguishes only success from failure; the low byte of
/// the transport's `exit-status` request carries [`ExitStatus::code`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExitStatus {
    /// The transfer completed cleanly.
    Success,
    /// The transfer hit a recoverable or fatal error.
    Failure,
}

impl ExitStatus {
    /// Numeric status byte for the transport request.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
        }
    }
}

//! Connection lifecycle types

use std::fmt;

/// Why a connection was torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer sent a close frame or ended the stream
    PeerClosed,
    ReadError,
    /// No pong within the read deadline
    ReadTimeout,
    WriteError,
    WriteTimeout,
    /// Inbound data frame exceeded the configured maximum
    FrameTooLarge,
    /// Administrative removal through the manager
    Removed,
    /// A reader or writer task panicked
    TaskFailed,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PeerClosed => "peer_closed",
            Self::ReadError => "read_error",
            Self::ReadTimeout => "read_timeout",
            Self::WriteError => "write_error",
            Self::WriteTimeout => "write_timeout",
            Self::FrameTooLarge => "frame_too_large",
            Self::Removed => "removed",
            Self::TaskFailed => "task_failed",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

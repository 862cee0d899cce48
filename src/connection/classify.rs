//! Failure classification.
//!
//! Networked I/O fails in a handful of expected ways: the peer went away,
//! the peer reset the connection, or a write could not complete. Those are
//! transient and only cost the one connection. Anything else is reported.
//!
//! Classification looks at [`io::ErrorKind`] first. Errors that only carry
//! text (a handler's own [`HandlerError::Failed`], or an `io::Error` of kind
//! `Other`) fall back to substring matching.

use crate::connection::HandlerError;
use std::fmt;
use std::io;

/// The closed set of failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    ConnectionClosed,
    ConnectionReset,
    WriteFailed,
    Other,
}

impl FailureKind {
    /// Closed, reset, and failed writes are expected on a network.
    pub fn is_transient(self) -> bool {
        !self.is_reportable()
    }

    /// Only unclassified failures reach the operator.
    pub fn is_reportable(self) -> bool {
        self == FailureKind::Other
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::ConnectionClosed => "connection-closed",
            FailureKind::ConnectionReset => "connection-reset",
            FailureKind::WriteFailed => "write-failed",
            FailureKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// Classifies a handler failure.
pub fn classify(err: &HandlerError) -> FailureKind {
    match err {
        HandlerError::Closed => FailureKind::ConnectionClosed,
        HandlerError::Io(e) => classify_io(e),
        HandlerError::Failed(message) => classify_message(message),
    }
}

/// Classifies an I/O error by kind, falling back to its message.
pub fn classify_io(err: &io::Error) -> FailureKind {
    match err.kind() {
        io::ErrorKind::UnexpectedEof
        | io::ErrorKind::NotConnected
        | io::ErrorKind::ConnectionAborted => FailureKind::ConnectionClosed,
        io::ErrorKind::ConnectionReset => FailureKind::ConnectionReset,
        io::ErrorKind::BrokenPipe | io::ErrorKind::WriteZero => FailureKind::WriteFailed,
        _ => classify_message(&err.to_string()),
    }
}

/// Classifies a failure from its text alone.
pub fn classify_message(message: &str) -> FailureKind {
    let message = message.to_ascii_lowercase();
    if message.contains("reset by peer") {
        FailureKind::ConnectionReset
    } else if message.contains("unable to write to socket") {
        FailureKind::WriteFailed
    } else if message.contains("closed") {
        FailureKind::ConnectionClosed
    } else {
        FailureKind::Other
    }
}

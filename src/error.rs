//! Server Error Types
//!
//! Every failure the core can surface to its caller is a [`ServerError`].
//! The variants line up with the three phases of a server's life:
//!
//! ```text
//! configure ──> ConfigError          (bad socket kind / protocol, never retried)
//!     │
//! listen ─────> Setup { stage, .. }  (OS refused create/bind/listen, fatal)
//!     │
//! run ────────> Unclassified / Io    (reportable fault, server is stopped)
//! ```
//!
//! Transient I/O failures (peer closed, reset, write failed) never show up
//! here: they are classified inside the loop and only close the offending
//! connection.

use crate::config::ConfigError;
use crate::connection::RegistryError;
use crate::server::LoopState;
use mio::Token;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// The step of listening-socket setup that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStage {
    /// `socket(2)`
    Create,
    /// `setsockopt(SO_REUSEADDR)`
    ReuseAddress,
    /// `bind(2)`
    Bind,
    /// `listen(2)`
    Listen,
    /// Registering the listener with the readiness poll
    Register,
}

impl fmt::Display for SetupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SetupStage::Create => "create",
            SetupStage::ReuseAddress => "reuse-address",
            SetupStage::Bind => "bind",
            SetupStage::Listen => "listen",
            SetupStage::Register => "register",
        };
        f.write_str(name)
    }
}

/// Errors returned by the server core.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Invalid configuration, raised before any socket exists
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The OS refused one of the listening-socket setup steps
    #[error("listening socket setup failed at {stage}: {source}")]
    Setup {
        stage: SetupStage,
        #[source]
        source: io::Error,
    },

    /// A lifecycle operation was called in the wrong state
    #[error("invalid loop state: expected {expected:?}, found {actual:?}")]
    InvalidState {
        expected: LoopState,
        actual: LoopState,
    },

    /// The connection registry rejected an insertion
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// A handler failure that could not be classified as transient
    #[error("unclassified failure on connection {token:?} ({peer}): {message}")]
    Unclassified {
        token: Token,
        peer: SocketAddr,
        message: String,
    },

    /// Poll or accept failed with a non-transient error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The signal handler could not be installed
    #[error("failed to install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),
}

impl ServerError {
    /// Wraps an OS error from the given setup stage.
    pub fn setup(stage: SetupStage, source: io::Error) -> Self {
        ServerError::Setup { stage, source }
    }
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

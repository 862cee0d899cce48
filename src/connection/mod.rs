//! Connection Management Module
//!
//! Everything the event loop knows about an accepted client lives here.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      EventLoop (server)                     │
//! └──────────────┬───────────────────────────────┬──────────────┘
//!                │ accept / evict / close        │ dispatch
//!                ▼                               ▼
//! ┌─────────────────────────────┐   ┌───────────────────────────┐
//! │     ConnectionRegistry      │   │     Handler::process      │
//! │                             │   │                           │
//! │  Token ──> ConnectionRecord │──>│  Ok(true)  keep open      │
//! │            (socket,         │   │  Ok(false) close          │
//! │             connected_at,   │   │  Err(e)    classify()     │
//! │             state)          │   └─────────────┬─────────────┘
//! └─────────────────────────────┘                 │
//!                                                 ▼
//!                                   ┌───────────────────────────┐
//!                                   │        FailureKind        │
//!                                   │ Closed / Reset / Write    │
//!                                   │   -> close connection     │
//!                                   │ Other -> report           │
//!                                   └───────────────────────────┘
//! ```
//!
//! ## Ownership
//!
//! A client socket is owned by exactly one [`ConnectionRecord`], and the
//! record is owned by the [`ConnectionRegistry`]. Closing a connection
//! removes the record and consumes it, so a socket cannot be closed twice
//! or used after it is closed.

pub mod classify;
pub mod handler;
pub mod record;
pub mod registry;
pub mod stats;

// Re-export commonly used types
pub use classify::{classify, classify_io, classify_message, FailureKind};
pub use handler::{EchoHandler, EchoState, Handler, HandlerError};
pub use record::ConnectionRecord;
pub use registry::{ConnectionRegistry, RegistryError, LISTENER_TOKEN, WAKER_TOKEN};
pub use stats::ConnectionStats;

/// Connects a loopback client and returns the accepted (non-blocking)
/// server side, its peer address, and the client side.
#[cfg(test)]
pub(crate) fn loopback_pair() -> (
    mio::net::TcpStream,
    std::net::SocketAddr,
    std::net::TcpStream,
) {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let client = std::net::TcpStream::connect(listener.local_addr().unwrap()).unwrap();
    let (server, peer) = listener.accept().unwrap();
    server.set_nonblocking(true).unwrap();
    (mio::net::TcpStream::from_std(server), peer, client)
}

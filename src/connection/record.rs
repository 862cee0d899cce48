//! A single accepted client.

use mio::net::TcpStream;
use mio::{Registry, Token};
use std::fmt;
use std::net::{Shutdown, SocketAddr};
use std::time::{Duration, SystemTime};
use tracing::trace;

/// One accepted client connection.
///
/// The record owns the client socket, the wall-clock time it was accepted,
/// and an opaque state slot `S` that belongs to the handler. The event loop
/// never looks inside the state.
pub struct ConnectionRecord<S> {
    /// Poll token; doubles as the registry key
    token: Token,

    /// The client socket (non-blocking)
    stream: TcpStream,

    /// Client's address (for logging)
    peer_addr: SocketAddr,

    /// Set once, at accept time
    connected_at: SystemTime,

    /// Handler-owned per-connection state
    state: S,
}

impl<S: Default> ConnectionRecord<S> {
    pub fn new(
        token: Token,
        stream: TcpStream,
        peer_addr: SocketAddr,
        connected_at: SystemTime,
    ) -> Self {
        Self {
            token,
            stream,
            peer_addr,
            connected_at,
            state: S::default(),
        }
    }
}

impl<S> ConnectionRecord<S> {
    pub fn token(&self) -> Token {
        self.token
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn connected_at(&self) -> SystemTime {
        self.connected_at
    }

    /// Time since accept, as seen at `now`.
    ///
    /// A wall clock that stepped backwards yields zero.
    pub fn elapsed(&self, now: SystemTime) -> Duration {
        now.duration_since(self.connected_at).unwrap_or_default()
    }

    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut S {
        &mut self.state
    }

    /// Borrows the socket and the state at the same time.
    pub fn parts_mut(&mut self) -> (&mut TcpStream, &mut S) {
        (&mut self.stream, &mut self.state)
    }

    /// Deregisters and shuts down the socket, then drops it.
    ///
    /// Consumes the record, so each socket is closed exactly once.
    pub(crate) fn close(mut self, registry: &Registry) {
        if let Err(e) = registry.deregister(&mut self.stream) {
            trace!(token = self.token.0, error = %e, "Deregister on close failed");
        }
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            trace!(token = self.token.0, error = %e, "Shutdown on close failed");
        }
    }
}

impl<S> fmt::Debug for ConnectionRecord<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRecord")
            .field("token", &self.token)
            .field("peer_addr", &self.peer_addr)
            .field("connected_at", &self.connected_at)
            .finish_non_exhaustive()
    }
}

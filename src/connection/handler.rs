//! Connection Handler Contract
//!
//! The event loop knows nothing about the bytes on the wire. For each ready
//! connection it calls [`Handler::process`] once, and the handler does one
//! read/processing cycle and reports back:
//!
//! ```text
//!   Ok(true)   keep the connection open
//!   Ok(false)  close it
//!   Err(e)     classify e; transient kinds close the connection,
//!              anything else is reported
//! ```
//!
//! The handler owns the per-connection state slot (`Handler::State`) and may
//! change it freely; the loop never looks inside.
//!
//! Client sockets are non-blocking. A handler may be invoked on a socket
//! that has nothing to read (spurious readiness) or that the peer has
//! already closed, and must turn either case into a return value rather
//! than a panic.
//!
//! ## Buffer Management
//!
//! [`EchoHandler`] keeps a `BytesMut` per connection. Whatever could not be
//! written back this cycle stays in the buffer and is retried on the next
//! readiness event.

use crate::connection::ConnectionRecord;
use bytes::{Buf, BytesMut};
use std::io::{self, Read, Write};
use thiserror::Error;
use tracing::trace;

/// Maximum unflushed data per connection (64 KB)
const MAX_BUFFER_SIZE: usize = 64 * 1024;

/// Bytes read per dispatch
const READ_CHUNK_SIZE: usize = 4096;

/// Errors a handler can hand back to the loop.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// I/O error on the client socket
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The peer is gone
    #[error("connection closed")]
    Closed,

    /// Handler-specific failure
    #[error("{0}")]
    Failed(String),
}

/// Per-connection processing, supplied by the application.
pub trait Handler {
    /// Opaque per-connection state, created empty at accept time.
    type State: Default;

    /// Performs one read/processing cycle for `conn`.
    fn process(&mut self, conn: &mut ConnectionRecord<Self::State>) -> Result<bool, HandlerError>;
}

/// Per-connection state of the [`EchoHandler`].
#[derive(Debug, Default)]
pub struct EchoState {
    /// Bytes read but not yet written back
    pub buffer: BytesMut,
    /// Total bytes read from the client
    pub bytes_read: u64,
    /// Total bytes written back
    pub bytes_written: u64,
}

/// Writes back whatever each client sends.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoHandler;

impl EchoHandler {
    pub fn new() -> Self {
        Self
    }
}

impl Handler for EchoHandler {
    type State = EchoState;

    fn process(&mut self, conn: &mut ConnectionRecord<EchoState>) -> Result<bool, HandlerError> {
        let peer = conn.peer_addr();
        let (stream, state) = conn.parts_mut();

        if state.buffer.len() >= MAX_BUFFER_SIZE {
            return Err(HandlerError::Failed(format!(
                "buffer size limit exceeded ({} bytes)",
                state.buffer.len()
            )));
        }

        let mut chunk = [0u8; READ_CHUNK_SIZE];
        match stream.read(&mut chunk) {
            Ok(0) => {
                trace!(client = %peer, "Client closed connection");
                return Ok(false);
            }
            Ok(n) => {
                state.buffer.extend_from_slice(&chunk[..n]);
                state.bytes_read += n as u64;
                trace!(client = %peer, bytes = n, "Read data");
            }
            Err(e) if is_retryable(&e) => {}
            Err(e) => return Err(e.into()),
        }

        flush(stream, state)?;
        Ok(true)
    }
}

/// Writes as much of the buffer as the socket will take right now.
fn flush<W: Write>(stream: &mut W, state: &mut EchoState) -> Result<(), HandlerError> {
    while !state.buffer.is_empty() {
        match stream.write(&state.buffer) {
            Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
            Ok(n) => {
                state.buffer.advance(n);
                state.bytes_written += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn is_retryable(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

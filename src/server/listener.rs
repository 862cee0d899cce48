//! Listening socket setup.
//!
//! The listener is created with socket2 so the configured socket kind and
//! transport protocol reach `socket(2)` unchanged, and so `SO_REUSEADDR` is
//! set before `bind(2)`. Any failure here is fatal and is not retried.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult, SetupStage};
use socket2::{Domain, Socket};
use std::net::TcpListener;
use tracing::debug;

/// Creates, binds, and starts a non-blocking listener for `config`.
///
/// Steps, in order: create socket, enable address reuse, bind to all
/// interfaces on the configured port, listen.
pub fn bind_listener(config: &ServerConfig) -> ServerResult<TcpListener> {
    let addr = config.bind_address();

    let socket = Socket::new(
        Domain::for_address(addr),
        config.socket_kind.socket_type(),
        config.protocol.socket_protocol(),
    )
    .map_err(|e| ServerError::setup(SetupStage::Create, e))?;

    socket
        .set_reuse_address(true)
        .map_err(|e| ServerError::setup(SetupStage::ReuseAddress, e))?;

    socket
        .bind(&addr.into())
        .map_err(|e| ServerError::setup(SetupStage::Bind, e))?;

    socket
        .listen(config.backlog)
        .map_err(|e| ServerError::setup(SetupStage::Listen, e))?;

    socket
        .set_nonblocking(true)
        .map_err(|e| ServerError::setup(SetupStage::Register, e))?;

    debug!(
        address = %addr,
        socket_kind = %config.socket_kind,
        protocol = %config.protocol,
        backlog = config.backlog,
        "Listening socket ready"
    );

    Ok(socket.into())
}

//! Server configuration types.
//!
//! Socket kind and transport protocol come from a small closed set. Any
//! string outside that set is rejected immediately with a [`ConfigError`],
//! so a typo on the command line fails before a socket is ever created.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while building a [`ServerConfig`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Socket kind outside the supported set
    #[error("unknown socket kind: {0:?} (supported: stream)")]
    UnknownSocketKind(String),

    /// Transport protocol outside the supported set
    #[error("unknown transport protocol: {0:?} (supported: ip, tcp, udp)")]
    UnknownProtocol(String),

    /// Fault policy outside the supported set
    #[error("unknown fault policy: {0:?} (supported: stop-server, close-connection)")]
    UnknownFaultPolicy(String),
}

/// The kind of socket the server listens on.
///
/// Only stream sockets are supported today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SocketKind {
    #[default]
    Stream,
}

impl SocketKind {
    /// The socket2 type used to create the listening socket.
    pub fn socket_type(self) -> socket2::Type {
        match self {
            SocketKind::Stream => socket2::Type::STREAM,
        }
    }
}

impl FromStr for SocketKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stream" => Ok(SocketKind::Stream),
            _ => Err(ConfigError::UnknownSocketKind(s.to_string())),
        }
    }
}

impl fmt::Display for SocketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocketKind::Stream => f.write_str("stream"),
        }
    }
}

/// Transport protocol identifier passed to `socket(2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportProtocol {
    /// Let the OS pick the default protocol for the socket kind
    Ip,
    #[default]
    Tcp,
    Udp,
}

impl TransportProtocol {
    /// The socket2 protocol, or `None` for the kind's default.
    pub fn socket_protocol(self) -> Option<socket2::Protocol> {
        match self {
            TransportProtocol::Ip => None,
            TransportProtocol::Tcp => Some(socket2::Protocol::TCP),
            TransportProtocol::Udp => Some(socket2::Protocol::UDP),
        }
    }
}

impl FromStr for TransportProtocol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ip" => Ok(TransportProtocol::Ip),
            "tcp" => Ok(TransportProtocol::Tcp),
            "udp" => Ok(TransportProtocol::Udp),
            _ => Err(ConfigError::UnknownProtocol(s.to_string())),
        }
    }
}

impl fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportProtocol::Ip => "ip",
            TransportProtocol::Tcp => "tcp",
            TransportProtocol::Udp => "udp",
        };
        f.write_str(name)
    }
}

/// What the loop does when a handler fails with an unclassified error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FaultPolicy {
    /// Report the failure and stop the whole server.
    #[default]
    StopServer,
    /// Report the failure, close only the offending connection, keep serving.
    CloseConnection,
}

impl FromStr for FaultPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stop-server" => Ok(FaultPolicy::StopServer),
            "close-connection" => Ok(FaultPolicy::CloseConnection),
            _ => Err(ConfigError::UnknownFaultPolicy(s.to_string())),
        }
    }
}

impl fmt::Display for FaultPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultPolicy::StopServer => f.write_str("stop-server"),
            FaultPolicy::CloseConnection => f.write_str("close-connection"),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on; 0 lets the OS choose
    pub port: u16,

    /// Socket kind for the listening socket
    pub socket_kind: SocketKind,

    /// Transport protocol for the listening socket
    pub protocol: TransportProtocol,

    /// Connections older than this (measured from accept) are evicted
    pub idle_timeout: Duration,

    /// Upper bound on a single readiness wait
    pub poll_timeout: Duration,

    /// Throttle sleep at the top of each iteration
    pub tick_interval: Duration,

    /// Throttle sleep when no clients are connected
    pub idle_tick_interval: Duration,

    /// Listen backlog
    pub backlog: i32,

    /// Capacity of the readiness event buffer
    pub events_capacity: usize,

    /// Reaction to unclassified handler failures
    pub fault_policy: FaultPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: crate::DEFAULT_PORT,
            socket_kind: SocketKind::Stream,
            protocol: TransportProtocol::Tcp,
            idle_timeout: crate::DEFAULT_IDLE_TIMEOUT,
            poll_timeout: Duration::from_secs(1),
            tick_interval: Duration::from_millis(1),
            idle_tick_interval: Duration::from_millis(50),
            backlog: 128,
            events_capacity: 1024,
            fault_policy: FaultPolicy::StopServer,
        }
    }
}

impl ServerConfig {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }

    /// Sets the socket kind from its name.
    pub fn set_socket_kind(&mut self, kind: &str) -> Result<(), ConfigError> {
        self.socket_kind = kind.parse()?;
        Ok(())
    }

    /// Sets the transport protocol from its name.
    pub fn set_transport_protocol(&mut self, name: &str) -> Result<(), ConfigError> {
        self.protocol = name.parse()?;
        Ok(())
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Sets both throttle intervals.
    pub fn with_tick_intervals(mut self, active: Duration, idle: Duration) -> Self {
        self.tick_interval = active;
        self.idle_tick_interval = idle;
        self
    }

    pub fn with_fault_policy(mut self, policy: FaultPolicy) -> Self {
        self.fault_policy = policy;
        self
    }

    /// The address the listener binds to: all interfaces, configured port.
    pub fn bind_address(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port))
    }
}

//! Server Configuration Module
//!
//! Everything the event loop needs to know before it opens a socket.
//! A [`ServerConfig`] is assembled up front, validated as it is built,
//! and then moved into the [`EventLoop`](crate::server::EventLoop), after
//! which it can only be read.
//!
//! ## Example
//!
//! ```
//! use sockloop::config::ServerConfig;
//! use std::time::Duration;
//!
//! let mut config = ServerConfig::default()
//!     .with_port(9000)
//!     .with_idle_timeout(Duration::from_secs(30));
//! config.set_socket_kind("stream").unwrap();
//! config.set_transport_protocol("tcp").unwrap();
//!
//! assert!(config.set_transport_protocol("sctp").is_err());
//! ```

pub mod server;

// Re-export commonly used types
pub use server::{ConfigError, FaultPolicy, ServerConfig, SocketKind, TransportProtocol};

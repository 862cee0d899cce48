//! # sockloop - A Lightweight Single-Threaded TCP Connection Server
//!
//! sockloop owns a listening socket, watches it and every connected client
//! with a single readiness poll, evicts connections that have been open too
//! long, and hands readable clients to a [`Handler`] you supply. There is
//! no async runtime and no worker pool: one thread does everything.
//!
//! ## Features
//!
//! - **One Poll Per Tick**: listener and clients share one bounded readiness wait
//! - **Bounded Accept Rate**: at most one new connection per iteration
//! - **Idle Eviction**: connections are closed a fixed time after accept
//! - **Classified Failures**: closed/reset/write failures are absorbed,
//!   everything else is reported
//! - **Signal Shutdown**: SIGINT/SIGTERM wake the loop and close every socket
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              sockloop                                   │
//! │                                                                         │
//! │  ┌─────────────┐    ┌──────────────────────────┐    ┌──────────────┐    │
//! │  │  Listener   │───>│        EventLoop         │───>│   Handler    │    │
//! │  │  (socket2)  │    │ throttle/evict/poll/     │    │ (yours)      │    │
//! │  └─────────────┘    │ accept/dispatch          │    └──────┬───────┘    │
//! │                     └───────┬───────────▲──────┘           │            │
//! │                             │           │           Result<bool, _>     │
//! │                             ▼           │                  │            │
//! │  ┌─────────────────────────────────┐    │          ┌───────▼───────┐    │
//! │  │       ConnectionRegistry        │    │          │  classify()   │    │
//! │  │  Token -> ConnectionRecord      │    │          └───────────────┘    │
//! │  └─────────────────────────────────┘    │                               │
//! │                                         │                               │
//! │  ┌─────────────────────────────────┐    │                               │
//! │  │  ShutdownController (ctrlc)     │────┘ wake                          │
//! │  └─────────────────────────────────┘                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use sockloop::config::ServerConfig;
//! use sockloop::connection::EchoHandler;
//! use sockloop::metrics::TimerMetrics;
//! use sockloop::server::EventLoop;
//!
//! fn main() -> Result<(), sockloop::ServerError> {
//!     let mut config = ServerConfig::new(7000);
//!     config.set_transport_protocol("tcp")?;
//!
//!     let mut server = EventLoop::new(config, EchoHandler::new(), TimerMetrics::new())?;
//!     server.shutdown_controller().install_signal_handler()?;
//!     server.start_listening()?;
//!     server.run()?;
//!
//!     server.metrics().log_metrics();
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`config`]: Server configuration and its validation
//! - [`connection`]: Connection records, registry, handler contract, failure classification
//! - [`server`]: The event loop, listener setup, and shutdown path
//! - [`metrics`]: Named timers for the serve lifecycle and each dispatch
//!
//! ## Design Highlights
//!
//! ### Single Owner
//!
//! The event loop owns the listener and the registry outright. Nothing else
//! mutates them, so there are no locks. The signal handler only sets a
//! flag and wakes the loop.
//!
//! ### Eviction From Accept Time
//!
//! A connection's age is measured from the moment it was accepted, not from
//! its last activity. A busy connection is closed at the same moment as an
//! idle one accepted at the same time.
//!
//! ### Fault Policy
//!
//! By default an unclassified handler failure stops the whole server. Set
//! [`FaultPolicy::CloseConnection`] to confine it to the offending
//! connection instead.

pub mod config;
pub mod connection;
pub mod error;
pub mod metrics;
pub mod server;

// Re-export commonly used types for convenience
pub use config::{FaultPolicy, ServerConfig, SocketKind, TransportProtocol};
pub use connection::{ConnectionRecord, EchoHandler, Handler, HandlerError};
pub use error::{ServerError, ServerResult};
pub use metrics::TimerMetrics;
pub use server::{EventLoop, LoopState, ShutdownHandle};

use std::time::Duration;

/// The default port sockloop listens on
pub const DEFAULT_PORT: u16 = 8080;

/// Connections are evicted this long after accept
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(600);

/// Version of sockloop
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Server Module
//!
//! The single-threaded accept/poll/evict/dispatch loop and the pieces it
//! owns: the listening socket and the shutdown path.
//!
//! ## Event Loop Iteration
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ 1. throttle     sleep tick (longer when no clients)          │
//! │                 └─ returns early on shutdown                 │
//! │ 2. evict        close clients older than idle_timeout        │
//! │ 3. poll         listener + every client, bounded wait        │
//! │ 4. accept       at most ONE new connection                   │
//! │ 5. dispatch     Handler::process for every ready client      │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │ repeat until shutdown
//!                                ▼
//!                   stop(): close clients, close listener
//! ```
//!
//! ## Lifecycle
//!
//! ```text
//! Idle ──start_listening()──> Listening ──run()──> Running ──stop()──> Stopped
//! ```

pub mod event_loop;
pub mod listener;
pub mod shutdown;

// Re-export commonly used types
pub use event_loop::{EventLoop, LoopState, TickReport, DISPATCH_TIMER, SERVE_TIMER};
pub use listener::bind_listener;
pub use shutdown::{ShutdownController, ShutdownHandle};

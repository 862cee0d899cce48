//! Shutdown Path
//!
//! SIGINT and SIGTERM arrive on a thread owned by `ctrlc`. The handler only
//! flips a flag and wakes the loop; the loop itself does the closing, so
//! the registry is never touched from two threads.
//!
//! ```text
//! signal ──> ShutdownHandle::trigger()
//!               ├─ requested = true
//!               ├─ condvar.notify_all()   (wakes the throttle sleep)
//!               └─ waker.wake()           (wakes the readiness poll)
//!
//! EventLoop sees the flag ──> stop(): close clients, close listener
//! ```
//!
//! The shutdown is abrupt: handlers are not given a chance to flush
//! application state. Sockets are closed cleanly and the process exits.

use crate::connection::WAKER_TOKEN;
use crate::error::ServerResult;
use mio::{Registry, Waker};
use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Default)]
struct ShutdownState {
    requested: Mutex<bool>,
    changed: Condvar,
}

impl ShutdownState {
    fn lock(&self) -> MutexGuard<'_, bool> {
        self.requested.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A cloneable, thread-safe trigger for stopping the loop.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    state: Arc<ShutdownState>,
    waker: Arc<Waker>,
}

impl ShutdownHandle {
    /// Requests shutdown and wakes the loop wherever it is waiting.
    pub fn trigger(&self) {
        {
            let mut requested = self.state.lock();
            *requested = true;
            self.state.changed.notify_all();
        }
        if let Err(e) = self.waker.wake() {
            warn!(error = %e, "Failed to wake event loop for shutdown");
        }
    }

    pub fn is_triggered(&self) -> bool {
        *self.state.lock()
    }
}

/// Owns the shutdown flag and the poll waker for one event loop.
#[derive(Debug)]
pub struct ShutdownController {
    handle: ShutdownHandle,
}

impl ShutdownController {
    /// Creates a controller whose waker is registered with `registry`.
    pub fn new(registry: &Registry) -> io::Result<Self> {
        let waker = Waker::new(registry, WAKER_TOKEN)?;
        Ok(Self {
            handle: ShutdownHandle {
                state: Arc::new(ShutdownState::default()),
                waker: Arc::new(waker),
            },
        })
    }

    pub fn handle(&self) -> ShutdownHandle {
        self.handle.clone()
    }

    pub fn is_requested(&self) -> bool {
        self.handle.is_triggered()
    }

    /// Sleeps for `pause` unless shutdown is requested first.
    ///
    /// Returns `true` if shutdown has been requested.
    pub fn throttle(&self, pause: Duration) -> bool {
        let guard = self.handle.state.lock();
        let (guard, _) = self
            .handle
            .state
            .changed
            .wait_timeout_while(guard, pause, |requested| !*requested)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }

    /// Routes SIGINT and SIGTERM to this controller.
    ///
    /// Can be called once per process.
    pub fn install_signal_handler(&self) -> ServerResult<()> {
        let handle = self.handle();
        ctrlc::set_handler(move || {
            info!("Shutdown signal received, stopping server...");
            handle.trigger();
        })?;
        Ok(())
    }
}

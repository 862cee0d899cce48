//! Connection counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics for connection handling.
///
/// Updated by the event loop; shared behind an `Arc` so other threads can
/// read them while the loop runs.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently registered connections
    pub active_connections: AtomicU64,
    /// Total connections closed, for any reason
    pub connections_closed: AtomicU64,
    /// Connections closed by idle eviction
    pub connections_evicted: AtomicU64,
    /// Total handler invocations
    pub dispatches: AtomicU64,
    /// Failures classified as transient
    pub transient_failures: AtomicU64,
    /// Failures reported to the operator
    pub reported_failures: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn connection_evicted(&self) {
        self.connections_evicted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dispatched(&self) {
        self.dispatches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn transient_failure(&self) {
        self.transient_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reported_failure(&self) {
        self.reported_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn accepted(&self) -> u64 {
        self.connections_accepted.load(Ordering::Relaxed)
    }

    pub fn active(&self) -> u64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    pub fn closed(&self) -> u64 {
        self.connections_closed.load(Ordering::Relaxed)
    }

    pub fn evicted(&self) -> u64 {
        self.connections_evicted.load(Ordering::Relaxed)
    }
}

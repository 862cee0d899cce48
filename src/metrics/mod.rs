//! Metrics Module
//!
//! A small named-timer sink. The event loop times the whole serve lifecycle
//! and every handler dispatch; the binary flushes the totals to the log
//! once at exit.
//!
//! ## Lifecycle
//!
//! ```text
//! TimerMetrics::new()  ── created at server startup, injected into the loop
//!        │
//!        ▼
//! start_timer / end_timer  ── accumulate {count, total, min, max}
//!        │
//!        ├── reset()        ── on demand
//!        ▼
//! log_metrics()        ── flushed at shutdown
//! ```

pub mod timer;

pub use timer::{TimerMetrics, TimerStats};

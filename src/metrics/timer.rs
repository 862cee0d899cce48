//! Named timer accumulation.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::info;

/// Accumulated statistics for one timer name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerStats {
    /// Number of completed start/end pairs
    pub count: u64,
    /// Sum of all measured durations
    pub total: Duration,
    /// Shortest measured duration
    pub min: Duration,
    /// Longest measured duration
    pub max: Duration,
}

impl TimerStats {
    fn first(elapsed: Duration) -> Self {
        Self {
            count: 1,
            total: elapsed,
            min: elapsed,
            max: elapsed,
        }
    }

    fn record(&mut self, elapsed: Duration) {
        self.count += 1;
        self.total += elapsed;
        self.min = self.min.min(elapsed);
        self.max = self.max.max(elapsed);
    }

    /// Mean duration, `total / count`.
    pub fn avg(&self) -> Duration {
        if self.count == 0 {
            return Duration::ZERO;
        }
        let nanos = self.total.as_nanos() / u128::from(self.count);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

/// A set of named timers.
///
/// Not thread-safe; it is owned by the event loop, which runs on one thread.
#[derive(Debug, Default)]
pub struct TimerMetrics {
    /// Timers that have been started but not yet ended
    running: BTreeMap<String, Instant>,

    /// Completed measurements per name
    stats: BTreeMap<String, TimerStats>,
}

impl TimerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts (or restarts) the timer called `name`.
    pub fn start_timer(&mut self, name: &str) {
        self.running.insert(name.to_string(), Instant::now());
    }

    /// Stops the timer called `name` and folds the measurement into its stats.
    ///
    /// Ending a timer that was never started returns [`Duration::ZERO`] and
    /// changes nothing.
    pub fn end_timer(&mut self, name: &str) -> Duration {
        let Some(started) = self.running.remove(name) else {
            return Duration::ZERO;
        };
        let elapsed = started.elapsed();

        match self.stats.get_mut(name) {
            Some(stats) => stats.record(elapsed),
            None => {
                self.stats.insert(name.to_string(), TimerStats::first(elapsed));
            }
        }

        elapsed
    }

    /// Statistics for `name`, if at least one pair has completed.
    pub fn stats(&self, name: &str) -> Option<TimerStats> {
        self.stats.get(name).copied()
    }

    /// Whether `name` is currently running.
    pub fn is_running(&self, name: &str) -> bool {
        self.running.contains_key(name)
    }

    /// Names with recorded statistics, in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stats.keys().map(String::as_str)
    }

    /// Drops every running timer and all accumulated statistics.
    pub fn reset(&mut self) {
        self.running.clear();
        self.stats.clear();
    }

    /// Logs one line per timer.
    pub fn log_metrics(&self) {
        for (name, stats) in &self.stats {
            info!(
                timer = %name,
                count = stats.count,
                total_ms = stats.total.as_secs_f64() * 1000.0,
                min_ms = stats.min.as_secs_f64() * 1000.0,
                max_ms = stats.max.as_secs_f64() * 1000.0,
                avg_ms = stats.avg().as_secs_f64() * 1000.0,
                "Timer summary"
            );
        }
    }
}

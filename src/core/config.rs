//! # Global runtime configuration.
//!
//! Provides [`RuntimeConfig`], the centralized settings for a [`Runtime`](crate::Runtime),
//! and [`TaskTimeouts`], the subset every [`Task`](crate::Task) carries.
//!
//! Config is used in two ways:
//! 1. **Runtime creation**: `Runtime::builder(config).build()`
//! 2. **Task defaults**: tasks built through the runtime inherit [`RuntimeConfig::task_timeouts`].
//!
//! ## Sentinel values
//! - `scheduler_max_wait = 0s` → clamped to one second (the scheduler never busy-loops)
//! - `bus_capacity = 0` → clamped to 1

use std::time::Duration;

/// Bounded waits used by [`Task::cleanup`](crate::Task::cleanup) and the start handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TaskTimeouts {
    /// Join bound for thread-mode tasks (`10s`).
    pub thread_join: Duration,
    /// Join bound for process-mode tasks after the force-kill (`30s`).
    pub process_join: Duration,
}

impl Default for TaskTimeouts {
    fn default() -> Self {
        Self {
            thread_join: Duration::from_secs(10),
            process_join: Duration::from_secs(30),
        }
    }
}

/// Global configuration for the runtime.
///
/// ## Field semantics
/// - `watchdog_interval`: reconciliation period of the runtime's internal watchdog
/// - `thread_join_timeout` / `process_join_timeout`: cleanup join bounds
/// - `listener_stop_timeout`: how long a remote `listener_stop` waits for acknowledgement
/// - `watchdog_shutdown_timeout`: how long `loop_stop` waits for the loop to acknowledge
/// - `scheduler_max_wait`: the longest the scheduler sleeps between passes
/// - `bus_capacity`: event bus ring buffer size (min 1; clamped by Bus)
///
/// ## Notes
/// All fields are public. Prefer the helper accessors to avoid sprinkling
/// sentinel checks across the codebase.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Interval of the internal watchdog that supervises the scheduler.
    pub watchdog_interval: Duration,

    /// Bounded join applied when cleaning up a thread-mode task.
    pub thread_join_timeout: Duration,

    /// Bounded join applied when cleaning up a process-mode task.
    pub process_join_timeout: Duration,

    /// Wait applied by `Queue::listener_stop(remote = true)`.
    pub listener_stop_timeout: Duration,

    /// Wait applied by `Watchdog::loop_stop` for the shutdown acknowledgement.
    pub watchdog_shutdown_timeout: Duration,

    /// Upper bound of a single scheduler sleep.
    pub scheduler_max_wait: Duration,

    /// Capacity of the event bus broadcast channel ring buffer.
    pub bus_capacity: usize,
}

impl RuntimeConfig {
    /// Returns the join bounds handed to every task built by the runtime.
    #[inline]
    pub fn task_timeouts(&self) -> TaskTimeouts {
        TaskTimeouts {
            thread_join: self.thread_join_timeout,
            process_join: self.process_join_timeout,
        }
    }

    /// Returns the scheduler's maximum sleep, never below one second.
    #[inline]
    pub fn scheduler_max_wait(&self) -> Duration {
        self.scheduler_max_wait.max(Duration::from_secs(1))
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for RuntimeConfig {
    /// Default configuration:
    ///
    /// - `watchdog_interval = 10s`
    /// - `thread_join_timeout = 10s`, `process_join_timeout = 30s`
    /// - `listener_stop_timeout = 5s`, `watchdog_shutdown_timeout = 5s`
    /// - `scheduler_max_wait = 1h`
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        let timeouts = TaskTimeouts::default();
        Self {
            watchdog_interval: Duration::from_secs(10),
            thread_join_timeout: timeouts.thread_join,
            process_join_timeout: timeouts.process_join,
            listener_stop_timeout: Duration::from_secs(5),
            watchdog_shutdown_timeout: Duration::from_secs(5),
            scheduler_max_wait: Duration::from_secs(3600),
            bus_capacity: 1024,
        }
    }
}

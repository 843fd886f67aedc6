//! # Runtime events emitted by tasks, queues, the watchdog and the scheduler.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Task lifecycle**: execution flow of a single [`Task`](crate::Task)
//! - **Supervision**: watchdog registrations, restarts and shutdown
//! - **Scheduling**: jobs added, fired and cancelled
//! - **Messaging**: queue listener start/exit
//!
//! The [`Event`] struct carries additional metadata such as timestamps, task id,
//! watchdog label, job key and reasons.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use taskwarden::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::TaskRestarted)
//!     .with_task("worker-1")
//!     .with_label("ingest")
//!     .with_reason("not alive");
//!
//! assert_eq!(ev.kind, EventKind::TaskRestarted);
//! assert_eq!(ev.task.as_deref(), Some("worker-1"));
//! assert_eq!(ev.label.as_deref(), Some("ingest"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `task`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `task`: subscriber name
    /// - `reason`: reason string ("full", "closed")
    SubscriberOverflow,

    // === Runtime events ===
    /// Shutdown requested (OS signal observed or `Runtime::shutdown` called).
    ShutdownRequested,

    // === Task lifecycle events ===
    /// The execution wrapper entered the target.
    ///
    /// Sets:
    /// - `task`: task id
    /// - `reason`: `"thread"` or `"process"`
    TaskStarting,

    /// The target returned normally; status is `Completed`.
    ///
    /// Sets:
    /// - `task`: task id
    TaskCompleted,

    /// The target raised, panicked or exited non-zero; status is `Error`.
    ///
    /// Sets:
    /// - `task`: task id
    /// - `reason`: `"<exception_name>: <exception_desc>"`
    TaskFailed,

    /// `Task::stop` was called.
    ///
    /// Sets:
    /// - `task`: task id
    TaskStopRequested,

    /// `Task::cleanup` could not join the execution unit in time.
    ///
    /// Sets:
    /// - `task`: task id
    /// - `reason`: bound that was exceeded
    TaskDetached,

    // === Supervision events ===
    /// A task was registered with a watchdog.
    ///
    /// Sets:
    /// - `task`: task id
    /// - `label`: watchdog label
    WatchdogRegistered,

    /// A task was moved to the watchdog's stop work-list.
    ///
    /// Sets:
    /// - `label`: watchdog label
    WatchdogDeregistered,

    /// The watchdog found a watched task down and restarted it.
    ///
    /// Sets:
    /// - `task`: task id
    /// - `label`: watchdog label
    /// - `reason`: what was observed (status or "not alive")
    TaskRestarted,

    /// Reconciling one label panicked; the loop carries on.
    ///
    /// Sets:
    /// - `label`: watchdog label
    /// - `reason`: panic message
    WatchdogFault,

    /// The watchdog loop stopped every task and acknowledged shutdown.
    WatchdogShutdown,

    // === Scheduling events ===
    /// A job was inserted into the scheduler.
    ///
    /// Sets:
    /// - `task`: task id
    /// - `job`: job key (`"{due}__{name}"`)
    JobScheduled,

    /// A due job's task was started.
    ///
    /// Sets:
    /// - `task`: task id
    /// - `job`: job key that fired
    JobFired,

    /// Jobs were removed by `Scheduler::cancel`.
    ///
    /// Sets:
    /// - `task`: job name
    /// - `reason`: number of removed jobs
    JobCancelled,

    // === Messaging events ===
    /// A queue listener entered its loop.
    ///
    /// Sets:
    /// - `label`: queue id
    ListenerStarted,

    /// A queue listener left its loop.
    ///
    /// Sets:
    /// - `label`: queue id
    /// - `reason`: error text when the loop failed
    ListenerStopped,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Task id (or subscriber name), if applicable.
    pub task: Option<Arc<str>>,
    /// Watchdog label or queue id, if applicable.
    pub label: Option<Arc<str>>,
    /// Scheduler job key, if applicable.
    pub job: Option<Arc<str>>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            task: None,
            label: None,
            job: None,
            reason: None,
        }
    }

    /// Sets the task id.
    #[inline]
    pub fn with_task(mut self, task: impl AsRef<str>) -> Self {
        self.task = Some(Arc::from(task.as_ref()));
        self
    }

    /// Sets the watchdog label / queue id.
    #[inline]
    pub fn with_label(mut self, label: impl AsRef<str>) -> Self {
        self.label = Some(Arc::from(label.as_ref()));
        self
    }

    /// Sets the scheduler job key.
    #[inline]
    pub fn with_job(mut self, job: impl AsRef<str>) -> Self {
        self.job = Some(Arc::from(job.as_ref()));
        self
    }

    /// Sets the reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl AsRef<str>) -> Self {
        self.reason = Some(Arc::from(reason.as_ref()));
        self
    }

    /// Subscriber panicked while handling an event.
    pub(crate) fn subscriber_panicked(name: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_task(name)
            .with_reason(info)
    }

    /// Subscriber dropped an event.
    pub(crate) fn subscriber_overflow(name: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_task(name)
            .with_reason(reason)
    }

    /// True for the kinds that describe a failure.
    pub fn is_failure(&self) -> bool {
        matches!(
            self.kind,
            EventKind::TaskFailed
                | EventKind::WatchdogFault
                | EventKind::SubscriberPanicked
                | EventKind::SubscriberOverflow
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_increase() {
        let a = Event::new(EventKind::JobFired);
        let b = Event::new(EventKind::JobFired);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn builders_fill_fields() {
        let ev = Event::new(EventKind::JobScheduled)
            .with_task("report")
            .with_job("1700000000__report");

        assert_eq!(ev.job.as_deref(), Some("1700000000__report"));
        assert!(ev.label.is_none());
        assert!(!ev.is_failure());
        assert!(Event::subscriber_overflow("x", "full").is_failure());
    }
}

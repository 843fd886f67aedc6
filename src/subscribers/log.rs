//! # Logging subscriber.
//!
//! [`LogWriter`] renders runtime events as `tracing` records under the
//! `taskwarden::events` target. Install a `tracing` subscriber (for instance with
//! `logger_init` under the `logging` feature) to see them.
//!
//! ## Output format
//! ```text
//! INFO  taskwarden::events: task starting task=worker mode=thread
//! WARN  taskwarden::events: task failed task=worker reason="RuntimeError: boom"
//! WARN  taskwarden::events: task restarted task=worker label=ingest reason="not alive"
//! INFO  taskwarden::events: job fired task=report job=1700000000__report
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

const TARGET: &str = "taskwarden::events";

/// Subscriber that forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogWriter;

impl LogWriter {
    /// Creates the subscriber.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let task = e.task.as_deref().unwrap_or("-");
        let label = e.label.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");

        match e.kind {
            EventKind::TaskStarting => {
                tracing::info!(target: TARGET, task, mode = reason, "task starting")
            }
            EventKind::TaskCompleted => tracing::info!(target: TARGET, task, "task completed"),
            EventKind::TaskFailed => tracing::warn!(target: TARGET, task, reason, "task failed"),
            EventKind::TaskStopRequested => {
                tracing::debug!(target: TARGET, task, "task stop requested")
            }
            EventKind::TaskDetached => {
                tracing::warn!(target: TARGET, task, reason, "task detached")
            }
            EventKind::WatchdogRegistered => {
                tracing::info!(target: TARGET, task, label, "watchdog registered")
            }
            EventKind::WatchdogDeregistered => {
                tracing::info!(target: TARGET, label, "watchdog deregistered")
            }
            EventKind::TaskRestarted => {
                tracing::warn!(target: TARGET, task, label, reason, "task restarted")
            }
            EventKind::WatchdogFault => {
                tracing::error!(target: TARGET, label, reason, "watchdog fault")
            }
            EventKind::WatchdogShutdown => tracing::info!(target: TARGET, "watchdog shut down"),
            EventKind::JobScheduled => {
                let job = e.job.as_deref().unwrap_or("-");
                tracing::debug!(target: TARGET, task, job, "job scheduled")
            }
            EventKind::JobFired => {
                let job = e.job.as_deref().unwrap_or("-");
                tracing::info!(target: TARGET, task, job, "job fired")
            }
            EventKind::JobCancelled => {
                tracing::info!(target: TARGET, task, removed = reason, "jobs cancelled")
            }
            EventKind::ListenerStarted => {
                tracing::debug!(target: TARGET, queue = label, "listener started")
            }
            EventKind::ListenerStopped => {
                tracing::debug!(target: TARGET, queue = label, reason, "listener stopped")
            }
            EventKind::ShutdownRequested => tracing::info!(target: TARGET, "shutdown requested"),
            EventKind::SubscriberPanicked | EventKind::SubscriberOverflow => {
                tracing::warn!(target: TARGET, subscriber = task, reason, kind = ?e.kind, "subscriber trouble")
            }
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}

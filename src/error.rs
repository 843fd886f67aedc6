//! Error types used by the taskwarden runtime, its tasks and its queues.
//!
//! This module defines three enums:
//!
//! - [`RuntimeError`]: configuration and supervision errors (watchdog, scheduler, runtime).
//! - [`TaskError`]: errors raised by a task's target; captured into the task record.
//! - [`QueueError`]: message protocol errors raised by [`Queue`](crate::Queue) operations.
//!
//! All of them provide `as_label` (stable snake_case, for logs/metrics) and `as_message`.
//! A [`QueueError`] converts into a [`TaskError`] so a task hosting a listener ends
//! in `Error` with the handler's own exception name and message.

use std::time::Duration;
use thiserror::Error;

/// # Errors produced by the runtime itself.
///
/// Configuration problems are reported at the call site that introduced them;
/// supervision problems (unknown labels, slow shutdowns) are reported by the
/// watchdog and scheduler operations.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// A loop interval or schedule interval of zero (or otherwise unusable).
    #[error("invalid interval {interval:?}: {reason}")]
    InvalidInterval {
        /// The rejected interval.
        interval: Duration,
        /// Why it was rejected.
        reason: String,
    },

    /// A time-of-day string that is not `HH:MM`.
    #[error("invalid time of day {time:?}: expected HH:MM")]
    InvalidTime {
        /// The rejected input.
        time: String,
    },

    /// A label (or job name) that is empty or already in use.
    #[error("invalid label {label:?}: {reason}")]
    InvalidLabel {
        /// The rejected label.
        label: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A label or job name that is not known to the component.
    #[error("{what} not found: {label:?}")]
    NotFound {
        /// Component kind (`"watchdog label"`, `"scheduled job"`).
        what: &'static str,
        /// The unknown label.
        label: String,
    },

    /// A loop did not acknowledge shutdown in time; the caller proceeds anyway.
    #[error("shutdown timeout {timeout:?} exceeded; still alive: {alive:?}")]
    ShutdownTimeout {
        /// The configured wait.
        timeout: Duration,
        /// Labels of tasks still alive when the wait expired.
        alive: Vec<String>,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use taskwarden::RuntimeError;
    ///
    /// let err = RuntimeError::InvalidTime { time: "25:99".into() };
    /// assert_eq!(err.as_label(), "runtime_invalid_time");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::InvalidInterval { .. } => "runtime_invalid_interval",
            RuntimeError::InvalidTime { .. } => "runtime_invalid_time",
            RuntimeError::InvalidLabel { .. } => "runtime_invalid_label",
            RuntimeError::NotFound { .. } => "runtime_not_found",
            RuntimeError::ShutdownTimeout { .. } => "runtime_shutdown_timeout",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            RuntimeError::InvalidInterval { interval, reason } => {
                format!("interval {interval:?} rejected: {reason}")
            }
            RuntimeError::InvalidTime { time } => format!("time {time:?} is not HH:MM"),
            RuntimeError::InvalidLabel { label, reason } => {
                format!("label {label:?} rejected: {reason}")
            }
            RuntimeError::NotFound { what, label } => format!("unknown {what} {label:?}"),
            RuntimeError::ShutdownTimeout { timeout, alive } => {
                format!("shutdown not acknowledged after {timeout:?}; alive={alive:?}")
            }
        }
    }
}

/// # Errors produced by task execution.
///
/// A task's target returns these; the execution wrapper never lets them escape
/// and records them instead (see [`TaskError::exception_name`]).
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// Named failure raised by the target, e.g. `Raised { name: "RuntimeError", message: "boom" }`.
    #[error("{name}: {message}")]
    Raised {
        /// Exception kind recorded as `exception_name`.
        name: String,
        /// Free-form description recorded as `exception_desc`.
        message: String,
    },

    /// Generic execution failure.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Non-recoverable failure.
    #[error("fatal error: {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },

    /// The target panicked.
    #[error("panicked: {message}")]
    Panicked {
        /// Panic payload rendered as text.
        message: String,
        /// Backtrace captured at the panic site, when one was recorded.
        backtrace: Option<String>,
    },

    /// A process-mode child exited unsuccessfully.
    #[error("child exited with {}", describe_exit(.code))]
    Exit {
        /// Exit code (`None` when terminated by a signal).
        code: Option<i32>,
        /// Captured standard error of the child.
        stderr: String,
    },

    /// A process-mode child could not be spawned or awaited.
    #[error("spawn failed: {error}")]
    Spawn {
        /// The underlying I/O error message.
        error: String,
    },

    /// The target observed cancellation and gave up.
    #[error("context cancelled")]
    Canceled,
}

impl TaskError {
    /// Shorthand for [`TaskError::Raised`].
    ///
    /// # Example
    /// ```
    /// use taskwarden::TaskError;
    ///
    /// let err = TaskError::raise("RuntimeError", "boom");
    /// assert_eq!(err.exception_name(), "RuntimeError");
    /// assert_eq!(err.to_string(), "RuntimeError: boom");
    /// ```
    pub fn raise(name: impl Into<String>, message: impl Into<String>) -> Self {
        TaskError::Raised {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Raised { .. } => "task_raised",
            TaskError::Fail { .. } => "task_failed",
            TaskError::Fatal { .. } => "task_fatal",
            TaskError::Panicked { .. } => "task_panicked",
            TaskError::Exit { .. } => "task_exit_status",
            TaskError::Spawn { .. } => "task_spawn_failed",
            TaskError::Canceled => "task_canceled",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            TaskError::Raised { message, .. } => message.clone(),
            TaskError::Fail { error } => format!("error: {error}"),
            TaskError::Fatal { error } => format!("fatal: {error}"),
            TaskError::Panicked { message, .. } => message.clone(),
            TaskError::Exit { code, .. } => match code {
                Some(code) => format!("exit code: {code}"),
                None => "terminated by signal".to_string(),
            },
            TaskError::Spawn { error } => format!("spawn: {error}"),
            TaskError::Canceled => "context cancelled".to_string(),
        }
    }

    /// Exception kind written into the task record's `exception_name`.
    pub fn exception_name(&self) -> &str {
        match self {
            TaskError::Raised { name, .. } => name,
            TaskError::Fail { .. } => "Fail",
            TaskError::Fatal { .. } => "Fatal",
            TaskError::Panicked { .. } => "Panic",
            TaskError::Exit { .. } => "ExitStatus",
            TaskError::Spawn { .. } => "SpawnError",
            TaskError::Canceled => "Canceled",
        }
    }

    /// Extra diagnostic text written into the record's `exception_stack`, if any.
    pub fn trace(&self) -> Option<&str> {
        match self {
            TaskError::Exit { stderr, .. } if !stderr.is_empty() => Some(stderr),
            TaskError::Panicked {
                backtrace: Some(trace),
                ..
            } => Some(trace),
            _ => None,
        }
    }
}

/// # Errors produced by queue operations and the listener loop.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// Nothing arrived within the timeout (or the queue was empty for `try_get`).
    #[error("queue empty")]
    Empty,

    /// An encoded frame could not be decoded.
    #[error("invalid frame format: {reason}")]
    InvalidFormat {
        /// Decoder error text.
        reason: String,
    },

    /// `get` received a frame that is not `DATA`.
    #[error("unexpected {kind} frame")]
    UnexpectedFrame {
        /// Wire name of the received frame kind.
        kind: &'static str,
    },

    /// The listener's keepalive elapsed without any frame.
    #[error("listener keepalive {keepalive:?} exceeded")]
    KeepaliveExceeded {
        /// The configured keepalive.
        keepalive: Duration,
    },

    /// `query` was called without a response queue.
    #[error("response queue not found")]
    QueueNotFound,

    /// A `QUERY` frame without a response queue reached the listener.
    #[error("query {message_id} carries no response queue")]
    MissingResponseQueue {
        /// Identifier of the offending frame.
        message_id: String,
    },

    /// The frame could not be delivered because the queue is gone.
    #[error("queue closed")]
    Closed,

    /// The message handler failed; the listener stops.
    #[error(transparent)]
    Handler(TaskError),
}

impl QueueError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            QueueError::Empty => "queue_empty",
            QueueError::InvalidFormat { .. } => "queue_invalid_format",
            QueueError::UnexpectedFrame { .. } => "queue_unexpected_frame",
            QueueError::KeepaliveExceeded { .. } => "queue_keepalive_exceeded",
            QueueError::QueueNotFound => "queue_not_found",
            QueueError::MissingResponseQueue { .. } => "queue_missing_response_queue",
            QueueError::Closed => "queue_closed",
            QueueError::Handler(_) => "queue_handler_failed",
        }
    }

    /// Exception kind used when the error ends up in a task record.
    fn exception_name(&self) -> &'static str {
        match self {
            QueueError::Empty => "QueueEmpty",
            QueueError::InvalidFormat { .. } => "InvalidFormat",
            QueueError::UnexpectedFrame { .. } => "UnexpectedFrame",
            QueueError::KeepaliveExceeded { .. } => "KeepaliveExceeded",
            QueueError::QueueNotFound => "QueueNotFound",
            QueueError::MissingResponseQueue { .. } => "MissingResponseQueue",
            QueueError::Closed => "QueueClosed",
            QueueError::Handler(_) => "HandlerError",
        }
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {code}"),
        None => "signal".to_string(),
    }
}

impl From<QueueError> for TaskError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Handler(inner) => inner,
            other => TaskError::Raised {
                name: other.exception_name().to_string(),
                message: other.to_string(),
            },
        }
    }
}

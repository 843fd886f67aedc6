//! Observable state of a task: status, result fields and execution mode.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TaskError;

/// Where a task's target executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecMode {
    /// A tokio task inside the owning process.
    Thread,
    /// A child OS process.
    Process,
}

impl fmt::Display for ExecMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExecMode::Thread => "thread",
            ExecMode::Process => "process",
        })
    }
}

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    #[serde(rename = "Not Started")]
    NotStarted,
    Running,
    Error,
    Completed,
}

impl TaskStatus {
    /// `Completed` or `Error`.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Error)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskStatus::NotStarted => "Not Started",
            TaskStatus::Running => "Running",
            TaskStatus::Error => "Error",
            TaskStatus::Completed => "Completed",
        })
    }
}

/// Result fields, populated only when the task reaches a terminal status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub return_value: Option<Value>,
    pub exception_name: Option<String>,
    pub exception_desc: Option<String>,
    pub exception_stack: Option<String>,
}

impl TaskResult {
    pub(crate) fn returned(value: Value) -> Self {
        Self {
            return_value: Some(value),
            ..Self::default()
        }
    }

    pub(crate) fn failed(err: &TaskError) -> Self {
        Self {
            return_value: None,
            exception_name: Some(err.exception_name().to_string()),
            exception_desc: Some(err.as_message()),
            exception_stack: Some(
                err.trace()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{err:?}")),
            ),
        }
    }
}

/// Snapshot of a task's status and result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub status: TaskStatus,
    pub result: TaskResult,
    /// Child pid for process-mode runs; `None` when running in the owning process.
    pub pid: Option<u32>,
}

impl TaskRecord {
    pub(crate) fn running() -> Self {
        Self {
            status: TaskStatus::Running,
            result: TaskResult::default(),
            pid: None,
        }
    }
}

impl Default for TaskRecord {
    fn default() -> Self {
        Self {
            status: TaskStatus::NotStarted,
            result: TaskResult::default(),
            pid: None,
        }
    }
}

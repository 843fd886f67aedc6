use std::sync::Arc;

use serde_json::Value;

use crate::core::TaskTimeouts;
use crate::events::Bus;
use crate::tasks::task::{StopHook, Target};
use crate::tasks::{CommandSpec, ExecMode, Kwargs, Runnable, Stoppable, Task, TaskRef};

/// Builder for [`Task`] with fluent API.
///
/// An empty id is replaced by a generated UUID. The execution mode follows the
/// target unless set explicitly with [`TaskBuilder::mode`].
#[derive(Clone)]
pub struct TaskBuilder {
    id: String,
    target: Option<Target>,
    mode: Option<ExecMode>,
    kwargs: Kwargs,
    stop_hook: Option<StopHook>,
    restart: bool,
    timeouts: Option<TaskTimeouts>,
    bus: Option<Bus>,
}

impl TaskBuilder {
    /// Creates a new builder with the given task id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            target: None,
            mode: None,
            kwargs: Kwargs::new(),
            stop_hook: None,
            restart: false,
            timeouts: None,
            bus: None,
        }
    }

    /// Runs an in-process target (thread mode).
    pub fn runnable(mut self, target: Arc<dyn Runnable>) -> Self {
        self.target = Some(Target::Runnable(target));
        self
    }

    /// Runs a child process (process mode).
    pub fn command(mut self, spec: CommandSpec) -> Self {
        self.target = Some(Target::Command(spec));
        self
    }

    /// Forces the execution mode.
    pub fn mode(mut self, mode: ExecMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Replaces the keyword arguments.
    pub fn kwargs(mut self, kwargs: Kwargs) -> Self {
        self.kwargs = kwargs;
        self
    }

    /// Adds one keyword argument.
    pub fn kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(key.into(), value.into());
        self
    }

    /// Sets the stop hook and the arguments it is called with.
    pub fn stop_with(mut self, stoppable: Arc<dyn Stoppable>, kwargs: Kwargs) -> Self {
        self.stop_hook = Some(StopHook { stoppable, kwargs });
        self
    }

    pub fn restart(mut self, restart: bool) -> Self {
        self.restart = restart;
        self
    }

    /// Overrides the cleanup join bounds.
    pub fn timeouts(mut self, timeouts: TaskTimeouts) -> Self {
        self.timeouts = Some(timeouts);
        self
    }

    /// Applies `timeouts` unless the caller already chose some.
    pub(crate) fn default_timeouts(mut self, timeouts: TaskTimeouts) -> Self {
        self.timeouts.get_or_insert(timeouts);
        self
    }

    pub(crate) fn bus(mut self, bus: Bus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Builds the task as a shared handle.
    pub fn build(self) -> TaskRef {
        let id = if self.id.is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            self.id
        };
        let mode = self
            .mode
            .or_else(|| self.target.as_ref().map(Target::native_mode))
            .unwrap_or(ExecMode::Thread);

        Arc::new(Task::new(
            id,
            self.target,
            mode,
            self.kwargs,
            self.stop_hook,
            self.restart,
            self.timeouts.unwrap_or_default(),
            self.bus,
        ))
    }
}

impl Task {
    /// Creates a builder for constructing a task with fluent API.
    pub fn builder(id: impl Into<String>) -> TaskBuilder {
        TaskBuilder::new(id)
    }
}

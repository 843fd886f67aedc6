//! # Tasks: targets, execution and observable state.
//!
//! This module provides the task-related types:
//! - [`Task`] / [`TaskRef`] - the supervised unit of work and its shared handle
//! - [`TaskBuilder`] - fluent construction (id, target, kwargs, stop hook, mode)
//! - [`Runnable`], [`Stoppable`] and their closure adapters [`RunnableFn`], [`StopFn`]
//! - [`CommandSpec`] - child process description for process mode
//! - [`TaskStatus`], [`TaskResult`], [`TaskRecord`], [`ExecMode`] - observable state

mod builder;
mod command;
mod record;
mod runnable;
mod task;
mod wrapper;

pub use builder::TaskBuilder;
pub use command::CommandSpec;
pub use record::{ExecMode, TaskRecord, TaskResult, TaskStatus};
pub use runnable::{Kwargs, Runnable, RunnableFn, StopFn, Stoppable};
pub use task::{Target, Task, TaskRef};
pub(crate) use wrapper::panic_message;

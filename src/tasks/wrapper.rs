//! # Execution wrapper.
//!
//! Every run of a [`Task`](crate::Task) goes through [`Execution::run`]. The wrapper
//! is what makes status and result observable by the task's owner regardless of
//! execution mode:
//!
//! ```text
//! Task::start()
//!   └─► record = Running, spawn(Execution::run)
//!          ├─► started.set()                  (start handshake)
//!          ├─► publish TaskStarting
//!          ├─► target
//!          │     ├─ Runnable  → run(ctx, kwargs) under catch_unwind
//!          │     └─ Command   → child process (pid stored in the record)
//!          ├─► record = Completed{return_value} | Error{exception_*}
//!          ├─► publish TaskCompleted | TaskFailed
//!          └─► finished.set()                 (completion event)
//! ```
//!
//! ## Rules
//! - Errors and panics of the target never escape; they are recorded.
//! - The record is written before `finished` is set.
//! - A run detached by `cleanup()` that finishes after a newer run started leaves
//!   the record and `finished` alone.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::sync::Arc;
use std::sync::Once;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use serde_json::Value;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;
use crate::events::{self, Bus, Event, EventKind};
use crate::shared::Signal;
use crate::tasks::command::run_command;
use crate::tasks::{ExecMode, Kwargs, Target, TaskRecord, TaskResult, TaskStatus};

/// Everything one run needs, detached from the owning `Task`.
pub(crate) struct Execution {
    pub(crate) id: Arc<str>,
    pub(crate) mode: ExecMode,
    pub(crate) target: Target,
    pub(crate) kwargs: Kwargs,
    pub(crate) record: Arc<watch::Sender<TaskRecord>>,
    /// Run number of this execution.
    pub(crate) epoch: u64,
    /// Run number of the task's newest execution.
    pub(crate) current: Arc<AtomicU64>,
    pub(crate) started: Signal,
    pub(crate) finished: Signal,
    pub(crate) token: CancellationToken,
    pub(crate) kill: CancellationToken,
    pub(crate) bus: Option<Bus>,
}

impl Execution {
    pub(crate) async fn run(self) {
        self.started.set();
        events::emit(
            &self.bus,
            Event::new(EventKind::TaskStarting)
                .with_task(&*self.id)
                .with_reason(self.mode.to_string()),
        );
        tracing::debug!(task = %self.id, mode = %self.mode, "running target");

        let outcome = match &self.target {
            Target::Runnable(target) => {
                install_panic_trace_hook();
                let fut = target.run(self.token.clone(), self.kwargs.clone());
                match std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                    Ok(res) => res,
                    Err(panic) => Err(TaskError::Panicked {
                        message: panic_message(&*panic),
                        backtrace: take_panic_trace(),
                    }),
                }
            }
            Target::Command(spec) => {
                let record = Arc::clone(&self.record);
                run_command(
                    spec,
                    &self.kwargs,
                    self.token.clone(),
                    self.kill.clone(),
                    move |pid| record.send_modify(|r| r.pid = Some(pid)),
                )
                .await
            }
        };

        if self.current.load(Ordering::SeqCst) != self.epoch {
            tracing::debug!(task = %self.id, epoch = self.epoch, "stale run finished; record untouched");
            return;
        }
        self.finish(outcome);
        self.finished.set();
    }

    fn finish(&self, outcome: Result<Value, TaskError>) {
        match outcome {
            Ok(value) => {
                tracing::debug!(task = %self.id, "task finished ok");
                self.record.send_modify(|r| {
                    r.status = TaskStatus::Completed;
                    r.result = TaskResult::returned(value);
                });
                events::emit(
                    &self.bus,
                    Event::new(EventKind::TaskCompleted).with_task(&*self.id),
                );
            }
            Err(err) => {
                tracing::debug!(task = %self.id, error = %err, "task failed");
                self.record.send_modify(|r| {
                    r.status = TaskStatus::Error;
                    r.result = TaskResult::failed(&err);
                });
                events::emit(
                    &self.bus,
                    Event::new(EventKind::TaskFailed)
                        .with_task(&*self.id)
                        .with_reason(format!("{}: {}", err.exception_name(), err.as_message())),
                );
            }
        }
    }
}

thread_local! {
    /// Backtrace of the last panic on this thread, taken by the next `catch_unwind` site.
    static PANIC_TRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Chains a hook in front of the current panic hook that records a backtrace.
///
/// A panic is caught on the thread that polled the target, so the trace is read
/// back from the same thread-local right after `catch_unwind`.
fn install_panic_trace_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let trace = Backtrace::force_capture().to_string();
            PANIC_TRACE.with(|slot| *slot.borrow_mut() = Some(trace));
            previous(info);
        }));
    });
}

fn take_panic_trace() -> Option<String> {
    PANIC_TRACE.with(|slot| slot.borrow_mut().take())
}

/// Renders a panic payload as text.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

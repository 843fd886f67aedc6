//! # Supervised unit of work.
//!
//! A [`Task`] owns a target, its keyword arguments, an optional stop hook and the
//! handle of its current run. It is shared as [`TaskRef`] (`Arc<Task>`) between the
//! caller, a [`Watchdog`](crate::Watchdog) and a [`Scheduler`](crate::Scheduler).
//!
//! ## Lifecycle
//! ```text
//!             start()                 target returns
//! NotStarted ─────────► Running ─────────────────────► Completed
//!                          │      target fails/panics
//!                          └─────────────────────────► Error
//!
//! cleanup(): join (bounded) ─► release handle ─► ready for start() again
//! ```
//!
//! ## Rules
//! - `start()` is idempotent while the current run is alive.
//! - `start()` without a usable target (none, or one that does not match the
//!   execution mode) is a logged no-op; check `is_alive()`/`status()`.
//! - `stop()` marks the task not runnable, then calls the stop hook if one was
//!   supplied, otherwise cancels the run's token (`SIGTERM` for process mode).
//! - `cleanup()` force-kills a process that is still alive; a thread-mode run that
//!   outlives its join bound is detached and left to finish on its own. Only the
//!   newest run writes the record.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::TaskTimeouts;
use crate::error::TaskError;
use crate::events::{self, Bus, Event, EventKind};
use crate::shared::Signal;
use crate::tasks::wrapper::Execution;
use crate::tasks::{
    CommandSpec, ExecMode, Kwargs, Runnable, Stoppable, TaskRecord, TaskResult, TaskStatus,
};

/// Shared handle to a task.
pub type TaskRef = Arc<Task>;

/// What a task executes.
#[derive(Clone)]
pub enum Target {
    /// In-process target, runs in thread mode.
    Runnable(Arc<dyn Runnable>),
    /// Child process, runs in process mode.
    Command(CommandSpec),
}

impl Target {
    /// The execution mode this target can run in.
    pub fn native_mode(&self) -> ExecMode {
        match self {
            Target::Runnable(_) => ExecMode::Thread,
            Target::Command(_) => ExecMode::Process,
        }
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Runnable(_) => f.write_str("Runnable(..)"),
            Target::Command(spec) => f.debug_tuple("Command").field(spec).finish(),
        }
    }
}

/// Stop hook plus the arguments it is called with.
#[derive(Clone)]
pub(crate) struct StopHook {
    pub(crate) stoppable: Arc<dyn Stoppable>,
    pub(crate) kwargs: Kwargs,
}

/// Handle of the current run.
struct RunHandle {
    join: JoinHandle<()>,
    token: CancellationToken,
    kill: CancellationToken,
}

/// Supervised unit of work. Build one with [`TaskBuilder`](crate::TaskBuilder).
pub struct Task {
    id: Arc<str>,
    target: Option<Target>,
    mode: ExecMode,
    kwargs: Kwargs,
    stop_hook: Option<StopHook>,
    restart: bool,
    runnable: AtomicBool,
    epoch: Arc<AtomicU64>,
    record: Arc<watch::Sender<TaskRecord>>,
    started: Signal,
    finished: Signal,
    run: Mutex<Option<RunHandle>>,
    timeouts: TaskTimeouts,
    bus: Option<Bus>,
}

impl Task {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: String,
        target: Option<Target>,
        mode: ExecMode,
        kwargs: Kwargs,
        stop_hook: Option<StopHook>,
        restart: bool,
        timeouts: TaskTimeouts,
        bus: Option<Bus>,
    ) -> Self {
        let (record, _rx) = watch::channel(TaskRecord::default());
        Self {
            id: Arc::from(id),
            target,
            mode,
            kwargs,
            stop_hook,
            restart,
            runnable: AtomicBool::new(false),
            epoch: Arc::new(AtomicU64::new(0)),
            record: Arc::new(record),
            started: Signal::new(),
            finished: Signal::new(),
            run: Mutex::new(None),
            timeouts,
            bus,
        }
    }

    /// Task id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Execution mode.
    pub fn mode(&self) -> ExecMode {
        self.mode
    }

    /// Restart flag supplied at construction.
    pub fn restart(&self) -> bool {
        self.restart
    }

    /// Keyword arguments passed to the target.
    pub fn kwargs(&self) -> &Kwargs {
        &self.kwargs
    }

    /// Desired-running indicator: set by `start()`, cleared by `stop()`.
    pub fn is_runnable(&self) -> bool {
        self.runnable.load(Ordering::SeqCst)
    }

    /// Current status.
    pub fn status(&self) -> TaskStatus {
        self.record.borrow().status
    }

    /// Current result fields (empty until a terminal status).
    pub fn result(&self) -> TaskResult {
        self.record.borrow().result.clone()
    }

    /// Full snapshot of status, result and pid.
    pub fn record(&self) -> TaskRecord {
        self.record.borrow().clone()
    }

    /// Receiver that observes every record change.
    pub fn subscribe(&self) -> watch::Receiver<TaskRecord> {
        self.record.subscribe()
    }

    /// True iff a run handle exists and its execution unit has not finished.
    pub fn is_alive(&self) -> bool {
        self.run
            .lock()
            .as_ref()
            .is_some_and(|run| !run.join.is_finished())
    }

    /// Waits until the current run has entered its target.
    pub async fn wait_started(&self, timeout: Duration) -> bool {
        self.started.wait_timeout(timeout).await
    }

    /// Waits until the current run has written its terminal record.
    pub async fn wait_finished(&self, timeout: Duration) -> bool {
        self.finished.wait_timeout(timeout).await
    }

    /// Launches the target unless a run is already alive.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(&self) {
        let Some(target) = self.target.clone() else {
            tracing::warn!(task = %self.id, "start ignored: no target");
            return;
        };
        if target.native_mode() != self.mode {
            tracing::warn!(
                task = %self.id,
                mode = %self.mode,
                target_mode = %target.native_mode(),
                "start ignored: target cannot run in this mode"
            );
            return;
        }

        let mut slot = self.run.lock();
        if slot.as_ref().is_some_and(|run| !run.join.is_finished()) {
            tracing::debug!(task = %self.id, "start ignored: already running");
            return;
        }

        self.runnable.store(true, Ordering::SeqCst);
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.started.clear();
        self.finished.clear();
        self.record.send_replace(TaskRecord::running());

        let token = CancellationToken::new();
        let kill = CancellationToken::new();
        let exec = Execution {
            id: Arc::clone(&self.id),
            mode: self.mode,
            target,
            kwargs: self.kwargs.clone(),
            record: Arc::clone(&self.record),
            epoch,
            current: Arc::clone(&self.epoch),
            started: self.started.clone(),
            finished: self.finished.clone(),
            token: token.clone(),
            kill: kill.clone(),
            bus: self.bus.clone(),
        };
        let join = tokio::spawn(exec.run());
        *slot = Some(RunHandle { join, token, kill });

        tracing::info!(task = %self.id, mode = %self.mode, "task started");
    }

    /// Requests the current run to stop.
    pub async fn stop(&self) {
        self.runnable.store(false, Ordering::SeqCst);
        events::emit(
            &self.bus,
            Event::new(EventKind::TaskStopRequested).with_task(&*self.id),
        );

        match &self.stop_hook {
            Some(hook) => {
                tracing::debug!(task = %self.id, "calling stop hook");
                hook.stoppable.stop(hook.kwargs.clone()).await;
            }
            None => {
                if let Some(run) = self.run.lock().as_ref() {
                    tracing::debug!(task = %self.id, "cancelling run token");
                    run.token.cancel();
                }
            }
        }
    }

    /// Joins the current run (bounded) and releases its handle.
    pub async fn cleanup(&self) {
        let Some(run) = self.run.lock().take() else {
            return;
        };

        let bound = match self.mode {
            ExecMode::Thread => self.timeouts.thread_join,
            ExecMode::Process => {
                if !run.join.is_finished() {
                    tracing::debug!(task = %self.id, "process still alive; killing");
                    run.kill.cancel();
                }
                self.timeouts.process_join
            }
        };

        let mut join = run.join;
        match tokio::time::timeout(bound, &mut join).await {
            Ok(Ok(())) => tracing::debug!(task = %self.id, "task joined"),
            Ok(Err(err)) => {
                tracing::warn!(task = %self.id, error = %err, "task wrapper aborted");
                self.fail_if_running(TaskError::Fatal {
                    error: format!("wrapper aborted: {err}"),
                });
            }
            Err(_) => {
                events::emit(
                    &self.bus,
                    Event::new(EventKind::TaskDetached)
                        .with_task(&*self.id)
                        .with_reason(format!("join exceeded {bound:?}")),
                );
                match self.mode {
                    ExecMode::Thread => {
                        // Dropping the handle detaches the run; its wrapper still
                        // writes the record and sets `finished`.
                        tracing::warn!(task = %self.id, ?bound, "join timed out; run detached");
                        drop(join);
                        return;
                    }
                    ExecMode::Process => {
                        join.abort();
                        tracing::warn!(task = %self.id, ?bound, "join timed out; run aborted");
                        self.fail_if_running(TaskError::raise(
                            "JoinTimeout",
                            format!("not joined within {bound:?}"),
                        ));
                    }
                }
            }
        }
        self.finished.set();
    }

    fn fail_if_running(&self, err: TaskError) {
        self.record.send_if_modified(|r| {
            if r.status != TaskStatus::Running {
                return false;
            }
            r.status = TaskStatus::Error;
            r.result = TaskResult::failed(&err);
            true
        });
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("status", &self.status())
            .field("alive", &self.is_alive())
            .field("runnable", &self.is_runnable())
            .finish()
    }
}

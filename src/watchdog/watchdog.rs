//! # Watchdog: reconciliation loop over three work-lists.
//!
//! ```text
//! register(task, label) ──► start-requested ──(pass)──► watched ──┐
//!                                                         ▲       │ status != Running
//!                                                         └───────┘ or !is_alive:
//!                                                         cleanup() + start()
//! deregister(label) ──────► stop-requested ──(pass)──► stop() ──► removed
//! ```
//!
//! ## One reconciliation pass
//! 1. every label in **stop-requested**: `stop()`, then remove it from all maps;
//! 2. every label in **start-requested**: `start()`, then move it to **watched**;
//! 3. every label in **watched**: restart it when it is not `Running` or not alive.
//!
//! ## Rules
//! - A label lives in at most one map; only the watchdog moves labels between maps
//!   (`register`/`deregister` only insert into their entry map).
//! - `register`/`deregister` wake the loop at once.
//! - A panic while reconciling one label is logged and published as
//!   `WatchdogFault`; the pass continues with the next label.
//! - On stop, every label is moved to stop-requested and stopped, then the
//!   shutdown signal is set and the stop/wake signals are reset.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::core::TaskTimeouts;
use crate::error::RuntimeError;
use crate::events::{self, Bus, Event, EventKind};
use crate::shared::{SharedMap, Signal};
use crate::tasks::{Kwargs, RunnableFn, StopFn, TaskBuilder, TaskRef, TaskStatus};

/// Default wait of `loop_stop` for the shutdown acknowledgement.
const WATCHDOG_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Reconciles registered tasks towards their desired state.
pub struct Watchdog {
    interval: Duration,
    to_start: SharedMap<String, TaskRef>,
    to_stop: SharedMap<String, TaskRef>,
    watched: SharedMap<String, TaskRef>,
    wake: Signal,
    stop: Signal,
    shutdown: Signal,
    running: AtomicBool,
    shutdown_timeout: Duration,
    loop_task: Mutex<Option<TaskRef>>,
    timeouts: TaskTimeouts,
    bus: Option<Bus>,
}

impl Watchdog {
    /// Creates a watchdog that reconciles every `interval`.
    ///
    /// A zero interval is rejected.
    pub fn new(interval: Duration) -> Result<Self, RuntimeError> {
        if interval.is_zero() {
            return Err(RuntimeError::InvalidInterval {
                interval,
                reason: "watchdog interval must be positive".into(),
            });
        }
        let shutdown = Signal::new();
        shutdown.set();

        Ok(Self {
            interval,
            to_start: SharedMap::new(),
            to_stop: SharedMap::new(),
            watched: SharedMap::new(),
            wake: Signal::new(),
            stop: Signal::new(),
            shutdown,
            running: AtomicBool::new(false),
            shutdown_timeout: WATCHDOG_SHUTDOWN_TIMEOUT,
            loop_task: Mutex::new(None),
            timeouts: TaskTimeouts::default(),
            bus: None,
        })
    }

    /// Overrides the `loop_stop` wait (default 5s).
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Join bounds of the task created by [`Watchdog::spawn`].
    pub fn with_task_timeouts(mut self, timeouts: TaskTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub(crate) fn with_bus(mut self, bus: Bus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Reconciliation interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// True while the loop runs.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Queues `task` for starting under `label` and wakes the loop.
    ///
    /// An empty label is replaced by a generated one; the label in use is returned.
    pub fn register(&self, task: TaskRef, label: &str) -> Result<String, RuntimeError> {
        let label = if label.is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            label.to_string()
        };
        if self.contains(&label) {
            return Err(RuntimeError::InvalidLabel {
                label,
                reason: "already registered".into(),
            });
        }

        tracing::info!(%label, task = task.id(), "watchdog: start requested");
        events::emit(
            &self.bus,
            Event::new(EventKind::WatchdogRegistered)
                .with_task(task.id())
                .with_label(&label),
        );
        self.to_start.insert(label.clone(), task);
        self.wake.set();
        Ok(label)
    }

    /// Queues the task under `label` for stopping and wakes the loop.
    pub fn deregister(&self, label: &str) -> Result<(), RuntimeError> {
        let key = label.to_string();
        let task = self
            .to_start
            .remove(&key)
            .or_else(|| self.watched.remove(&key));

        match task {
            Some(task) => {
                tracing::info!(label, task = task.id(), "watchdog: stop requested");
                self.to_stop.insert(key, task);
            }
            None if self.to_stop.contains_key(&key) => {
                tracing::debug!(label, "watchdog: stop already requested");
            }
            None => {
                return Err(RuntimeError::NotFound {
                    what: "watchdog label",
                    label: key,
                });
            }
        }

        events::emit(
            &self.bus,
            Event::new(EventKind::WatchdogDeregistered).with_label(label),
        );
        self.wake.set();
        Ok(())
    }

    /// True if `label` is in any work-list.
    pub fn contains(&self, label: &str) -> bool {
        let key = label.to_string();
        self.to_start.contains_key(&key)
            || self.watched.contains_key(&key)
            || self.to_stop.contains_key(&key)
    }

    /// Task registered under `label`, whichever work-list holds it.
    pub fn task(&self, label: &str) -> Option<TaskRef> {
        let key = label.to_string();
        self.watched
            .get(&key)
            .or_else(|| self.to_start.get(&key))
            .or_else(|| self.to_stop.get(&key))
    }

    /// Labels currently watched.
    pub fn watched_labels(&self) -> Vec<String> {
        self.watched.keys()
    }

    /// Labels waiting to be started.
    pub fn pending_start_labels(&self) -> Vec<String> {
        self.to_start.keys()
    }

    /// Labels waiting to be stopped.
    pub fn pending_stop_labels(&self) -> Vec<String> {
        self.to_stop.keys()
    }

    /// Runs the reconciliation loop until `loop_stop` or `ctx` cancellation.
    pub async fn run(&self, ctx: CancellationToken) {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::warn!("watchdog loop already running");
            return;
        }
        self.shutdown.clear();
        tracing::debug!(interval = ?self.interval, "watchdog: starting");

        while !self.stop.is_set() && !ctx.is_cancelled() {
            self.reconcile().await;

            tokio::select! {
                _ = ctx.cancelled() => {}
                _ = self.stop.wait() => {}
                _ = self.wake.wait_timeout(self.interval) => {}
            }
            self.wake.clear();
        }

        self.teardown().await;

        self.stop.clear();
        self.wake.clear();
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.set();
        events::emit(&self.bus, Event::new(EventKind::WatchdogShutdown));
        tracing::debug!("watchdog: ending");
    }

    /// One reconciliation pass.
    async fn reconcile(&self) {
        for (label, task) in self.to_stop.entries() {
            tracing::info!(%label, task = task.id(), "watchdog: stopping");
            self.guarded(&label, task.stop()).await;
            self.to_start.remove(&label);
            self.watched.remove(&label);
            self.to_stop.remove(&label);
        }

        for (label, task) in self.to_start.entries() {
            tracing::info!(%label, task = task.id(), "watchdog: starting task");
            self.guarded(&label, async { task.start() }).await;
            if self.to_start.remove(&label).is_some() {
                self.watched.insert(label, task);
            }
        }

        for (label, task) in self.watched.entries() {
            let status = task.status();
            let reason = if status != TaskStatus::Running {
                format!("not running. Status: {status}")
            } else if !task.is_alive() {
                "not running. Task not alive".to_string()
            } else {
                continue;
            };
            if !self.watched.contains_key(&label) {
                continue;
            }

            tracing::warn!(%label, task = task.id(), %reason, "watchdog: task down");
            let restarted = self
                .guarded(&label, async {
                    task.cleanup().await;
                    task.start();
                })
                .await;
            if restarted {
                tracing::info!(%label, task = task.id(), "watchdog: task restarted");
                events::emit(
                    &self.bus,
                    Event::new(EventKind::TaskRestarted)
                        .with_task(task.id())
                        .with_label(&label)
                        .with_reason(&reason),
                );
            }
        }
    }

    /// Moves every label to stop-requested and stops them all.
    async fn teardown(&self) {
        tracing::debug!("watchdog: stopping registered tasks");
        for (label, task) in self.to_start.drain() {
            self.to_stop.insert(label, task);
        }
        for (label, task) in self.watched.drain() {
            self.to_stop.insert(label, task);
        }
        for (label, task) in self.to_stop.entries() {
            tracing::debug!(%label, task = task.id(), "watchdog: stopping");
            self.guarded(&label, task.stop()).await;
            self.to_stop.remove(&label);
        }
    }

    /// Runs one label's step; returns `false` if it panicked.
    async fn guarded<F: Future<Output = ()>>(&self, label: &str, step: F) -> bool {
        match std::panic::AssertUnwindSafe(step).catch_unwind().await {
            Ok(()) => true,
            Err(panic) => {
                let info = crate::tasks::panic_message(&*panic);
                tracing::error!(label, %info, "watchdog: reconciliation failed");
                events::emit(
                    &self.bus,
                    Event::new(EventKind::WatchdogFault)
                        .with_label(label)
                        .with_reason(info),
                );
                false
            }
        }
    }

    /// Stops the loop and waits (bounded) for its shutdown acknowledgement.
    ///
    /// Then joins the task created by [`Watchdog::spawn`], if any. On timeout the
    /// labels still alive are reported; teardown continues regardless.
    pub async fn loop_stop(&self) -> Result<(), RuntimeError> {
        let loop_task = self.loop_task.lock().take();
        let running = self.is_running();
        if running || loop_task.is_some() {
            self.stop.set();
            self.wake.set();
        } else {
            tracing::debug!("watchdog: loop not running");
        }

        let mut outcome = Ok(());
        if running && !self.shutdown.wait_timeout(self.shutdown_timeout).await {
            let alive = self.alive_labels();
            tracing::warn!(timeout = ?self.shutdown_timeout, ?alive, "watchdog: shutdown not acknowledged");
            outcome = Err(RuntimeError::ShutdownTimeout {
                timeout: self.shutdown_timeout,
                alive,
            });
        }

        if let Some(task) = loop_task {
            task.cleanup().await;
        }
        outcome
    }

    fn alive_labels(&self) -> Vec<String> {
        self.to_start
            .entries()
            .into_iter()
            .chain(self.watched.entries())
            .chain(self.to_stop.entries())
            .filter(|(_, task)| task.is_alive())
            .map(|(label, _)| label)
            .collect()
    }

    /// Runs the loop inside its own task and returns that task.
    ///
    /// The task's stop hook asks the loop to exit; [`Watchdog::loop_stop`] joins it.
    pub fn spawn(self: &Arc<Self>) -> TaskRef {
        let weak: Weak<Self> = Arc::downgrade(self);
        let run = RunnableFn::arc(move |ctx: CancellationToken, _kwargs: Kwargs| {
            let weak = weak.clone();
            async move {
                if let Some(watchdog) = weak.upgrade() {
                    watchdog.run(ctx).await;
                }
                Ok(Value::Null)
            }
        });
        let (stop, wake) = (self.stop.clone(), self.wake.clone());
        let stop_hook = StopFn::arc(move |_kwargs: Kwargs| {
            let (stop, wake) = (stop.clone(), wake.clone());
            async move {
                stop.set();
                wake.set();
            }
        });

        let mut builder = TaskBuilder::new("watchdog")
            .runnable(run)
            .stop_with(stop_hook, Kwargs::new())
            .timeouts(self.timeouts);
        if let Some(bus) = &self.bus {
            builder = builder.bus(bus.clone());
        }
        let task = builder.build();
        task.start();
        *self.loop_task.lock() = Some(Arc::clone(&task));
        task
    }
}

impl fmt::Debug for Watchdog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watchdog")
            .field("interval", &self.interval)
            .field("running", &self.is_running())
            .field("start_requested", &self.to_start.len())
            .field("watched", &self.watched.len())
            .field("stop_requested", &self.to_stop.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idle_task(id: &str) -> TaskRef {
        TaskBuilder::new(id)
            .runnable(RunnableFn::arc(|ctx: CancellationToken, _kw: Kwargs| async move {
                ctx.cancelled().await;
                Ok(Value::Null)
            }))
            .build()
    }

    #[test]
    fn zero_interval_is_rejected() {
        let err = Watchdog::new(Duration::ZERO).unwrap_err();
        assert_eq!(err.as_label(), "runtime_invalid_interval");
    }

    #[test]
    fn register_generates_labels_and_rejects_duplicates() {
        let wd = Watchdog::new(Duration::from_secs(1)).unwrap();
        let generated = wd.register(idle_task("a"), "").unwrap();
        assert!(!generated.is_empty());
        assert_eq!(wd.pending_start_labels(), vec![generated.clone()]);

        wd.register(idle_task("b"), "svc").unwrap();
        let err = wd.register(idle_task("c"), "svc").unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidLabel { .. }));
    }

    #[test]
    fn deregister_moves_label_to_stop_list() {
        let wd = Watchdog::new(Duration::from_secs(1)).unwrap();
        wd.register(idle_task("a"), "svc").unwrap();
        wd.deregister("svc").unwrap();

        assert!(wd.pending_start_labels().is_empty());
        assert_eq!(wd.pending_stop_labels(), vec!["svc".to_string()]);
        assert!(wd.deregister("svc").is_ok());

        let err = wd.deregister("ghost").unwrap_err();
        assert!(matches!(err, RuntimeError::NotFound { .. }));
    }

    #[tokio::test]
    async fn loop_stop_without_loop_returns_at_once() {
        let wd = Watchdog::new(Duration::from_secs(1)).unwrap();
        assert!(wd.loop_stop().await.is_ok());
        assert!(!wd.is_running());
    }
}

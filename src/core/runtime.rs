//! # Runtime: the explicit context every component is created from.
//!
//! The [`Runtime`] owns the event bus, the [`SubscriberSet`], the [`QueueRegistry`],
//! a root [`CancellationToken`] and, lazily, an internal [`Watchdog`] plus a
//! [`Scheduler`] supervised by it. Factories hand out tasks, queues, signals and
//! watchdogs already wired to the bus and the configured timeouts.
//!
//! ## High-level architecture
//! ```text
//! RuntimeBuilder::new(cfg).with_subscribers(..).build()
//!        │
//!        ├─► Bus ──► forward loop ──► SubscriberSet::emit(&Event)
//!        ├─► QueueRegistry (id → live queue)
//!        └─► root token
//!
//! start_scheduler():
//!   internal Watchdog (spawned, cfg.watchdog_interval)
//!        └─► register(scheduler task, "scheduler")
//!                 └─► Scheduler::run_scheduler (restarted if it dies)
//!
//! Shutdown path:
//!   run_until_signal() ─► OS signal ─► shutdown()
//!   shutdown():
//!     publish(ShutdownRequested)
//!     ├─► stop_scheduler()       (deregister + stop + cleanup)
//!     ├─► loop_stop() every watchdog (bounded)
//!     ├─► root token cancel
//!     └─► forward loop drains, subscriber workers joined
//! ```
//!
//! ## Example
//! ```rust,no_run
//! use std::time::Duration;
//! use serde_json::{Value, json};
//! use tokio_util::sync::CancellationToken;
//! use taskwarden::{Kwargs, LogWriter, RunnableFn, Runtime, RuntimeConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let rt = Runtime::builder(RuntimeConfig::default())
//!         .with_subscriber(std::sync::Arc::new(LogWriter::new()))
//!         .build();
//!
//!     let job = rt.thread(
//!         "report",
//!         RunnableFn::arc(|_ctx: CancellationToken, _kw: Kwargs| async move {
//!             Ok::<Value, taskwarden::TaskError>(json!("sent"))
//!         }),
//!     );
//!     let scheduler = rt.start_scheduler()?;
//!     scheduler.every(30)?.minutes().run(job)?;
//!
//!     rt.run_until_signal().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::{RuntimeBuilder, RuntimeConfig, shutdown};
use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind};
use crate::queue::{FrameHandler, Queue, QueueBuilder, QueueRegistry};
use crate::scheduler::Scheduler;
use crate::shared::Signal;
use crate::subscribers::SubscriberSet;
use crate::tasks::{CommandSpec, Runnable, TaskBuilder, TaskRef};
use crate::watchdog::Watchdog;

/// Label the scheduler task is registered under with the internal watchdog.
pub const SCHEDULER_LABEL: &str = "scheduler";

/// Explicit runtime context. Build one with [`RuntimeBuilder`].
pub struct Runtime {
    cfg: RuntimeConfig,
    bus: Bus,
    queues: Arc<QueueRegistry>,
    token: CancellationToken,
    forward: Mutex<Option<JoinHandle<()>>>,
    internal: Mutex<Option<Arc<Watchdog>>>,
    watchdogs: Mutex<Vec<Arc<Watchdog>>>,
    scheduler: Mutex<Option<Arc<Scheduler>>>,
}

impl Runtime {
    pub(crate) fn new_internal(
        cfg: RuntimeConfig,
        bus: Bus,
        subs: SubscriberSet,
        token: CancellationToken,
    ) -> Self {
        let forward = Self::subscriber_listener(&bus, subs, token.clone());
        Self {
            cfg,
            bus,
            queues: QueueRegistry::new(),
            token,
            forward: Mutex::new(Some(forward)),
            internal: Mutex::new(None),
            watchdogs: Mutex::new(Vec::new()),
            scheduler: Mutex::new(None),
        }
    }

    /// Creates a builder for the runtime.
    pub fn builder(cfg: RuntimeConfig) -> RuntimeBuilder {
        RuntimeBuilder::new(cfg)
    }

    /// Subscribes to the bus and forwards events to the subscriber set until the
    /// root token fires; then drains what is buffered and joins the workers.
    fn subscriber_listener(
        bus: &Bus,
        set: SubscriberSet,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let mut rx = bus.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    ev = rx.recv() => match ev {
                        Ok(ev) => set.emit(&ev),
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "event forwarder lagged");
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = token.cancelled() => {
                        while let Ok(ev) = rx.try_recv() {
                            set.emit(&ev);
                        }
                        break;
                    }
                }
            }
            set.shutdown().await;
        })
    }

    /// Runtime configuration.
    pub fn config(&self) -> &RuntimeConfig {
        &self.cfg
    }

    /// Event bus; `bus().subscribe()` observes every runtime event.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Registry resolving queue ids to live queues.
    pub fn queues(&self) -> &Arc<QueueRegistry> {
        &self.queues
    }

    /// Child of the root token; cancelled by [`Runtime::shutdown`].
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// True once [`Runtime::shutdown`] has cancelled the root token.
    pub fn is_shut_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Builds a task wired to the bus and the configured join bounds.
    pub fn task(&self, builder: TaskBuilder) -> TaskRef {
        builder
            .default_timeouts(self.cfg.task_timeouts())
            .bus(self.bus.clone())
            .build()
    }

    /// Thread-mode task running `runnable`.
    pub fn thread(&self, id: impl Into<String>, runnable: Arc<dyn Runnable>) -> TaskRef {
        self.task(TaskBuilder::new(id).runnable(runnable))
    }

    /// Process-mode task running `command`.
    pub fn process(&self, id: impl Into<String>, command: CommandSpec) -> TaskRef {
        self.task(TaskBuilder::new(id).command(command))
    }

    /// Queue builder preconfigured with the bus and listener stop timeout.
    ///
    /// Finish it with `.build(runtime.queues())`.
    pub fn queue_builder(&self) -> QueueBuilder {
        Queue::builder()
            .stop_timeout(self.cfg.listener_stop_timeout)
            .bus(self.bus.clone())
    }

    /// Queue without a handler.
    pub fn queue(&self) -> Queue {
        self.queue_builder().build(&self.queues)
    }

    /// Queue whose listener dispatches to `handler`.
    pub fn queue_with(&self, handler: Arc<dyn FrameHandler>) -> Queue {
        self.queue_builder().handler(handler).build(&self.queues)
    }

    /// A fresh event flag.
    pub fn signal(&self) -> Signal {
        Signal::new()
    }

    /// Creates a watchdog and runs its loop in its own task.
    ///
    /// The watchdog is stopped by [`Runtime::shutdown`].
    pub fn watchdog(&self, interval: Duration) -> Result<Arc<Watchdog>, RuntimeError> {
        let watchdog = self.new_watchdog(interval)?;
        watchdog.spawn();
        self.watchdogs.lock().push(Arc::clone(&watchdog));
        Ok(watchdog)
    }

    fn new_watchdog(&self, interval: Duration) -> Result<Arc<Watchdog>, RuntimeError> {
        let watchdog = Watchdog::new(interval)?
            .with_shutdown_timeout(self.cfg.watchdog_shutdown_timeout)
            .with_task_timeouts(self.cfg.task_timeouts())
            .with_bus(self.bus.clone());
        Ok(Arc::new(watchdog))
    }

    /// Internal watchdog, created and spawned on first use.
    fn internal_watchdog(&self) -> Result<Arc<Watchdog>, RuntimeError> {
        let mut slot = self.internal.lock();
        if let Some(watchdog) = slot.as_ref() {
            return Ok(Arc::clone(watchdog));
        }
        let watchdog = self.new_watchdog(self.cfg.watchdog_interval)?;
        watchdog.spawn();
        *slot = Some(Arc::clone(&watchdog));
        Ok(watchdog)
    }

    /// The runtime's scheduler, created on first use (its loop is not started).
    pub fn scheduler(&self) -> Arc<Scheduler> {
        let mut slot = self.scheduler.lock();
        match slot.as_ref() {
            Some(scheduler) => Arc::clone(scheduler),
            None => {
                let scheduler = Arc::new(
                    Scheduler::new()
                        .with_max_wait(self.cfg.scheduler_max_wait())
                        .with_task_timeouts(self.cfg.task_timeouts())
                        .with_bus(self.bus.clone()),
                );
                *slot = Some(Arc::clone(&scheduler));
                scheduler
            }
        }
    }

    /// Runs the scheduler loop under the internal watchdog (label `"scheduler"`).
    ///
    /// Idempotent while the scheduler is registered.
    pub fn start_scheduler(&self) -> Result<Arc<Scheduler>, RuntimeError> {
        let scheduler = self.scheduler();
        let watchdog = self.internal_watchdog()?;
        if watchdog.contains(SCHEDULER_LABEL) {
            return Ok(scheduler);
        }
        watchdog.register(scheduler.task(), SCHEDULER_LABEL)?;
        tracing::info!("scheduler started");
        Ok(scheduler)
    }

    /// Stops the scheduler loop and removes it from the internal watchdog.
    ///
    /// The watchdog's stop pass calls the task's hook; if that does not happen
    /// within `watchdog_shutdown_timeout` the task is stopped directly. A no-op if
    /// the scheduler is not registered.
    pub async fn stop_scheduler(&self) {
        let Some(watchdog) = self.internal.lock().clone() else {
            return;
        };
        let Some(task) = watchdog.task(SCHEDULER_LABEL) else {
            return;
        };
        if watchdog.deregister(SCHEDULER_LABEL).is_err() {
            return;
        }
        tracing::info!("scheduler stop requested");

        let deadline = tokio::time::Instant::now() + self.cfg.watchdog_shutdown_timeout;
        while watchdog.contains(SCHEDULER_LABEL) {
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!("watchdog did not release the scheduler; stopping it directly");
                task.stop().await;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        task.cleanup().await;
    }

    /// Stops the scheduler and every watchdog, then cancels the root token.
    ///
    /// Returns the first watchdog shutdown timeout, if any; teardown continues
    /// past it.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        tracing::info!("runtime shutting down");
        self.bus.publish(Event::new(EventKind::ShutdownRequested));

        self.stop_scheduler().await;

        let mut watchdogs: Vec<Arc<Watchdog>> = self.watchdogs.lock().drain(..).collect();
        if let Some(internal) = self.internal.lock().take() {
            watchdogs.push(internal);
        }

        let mut outcome = Ok(());
        for watchdog in watchdogs {
            if let Err(err) = watchdog.loop_stop().await {
                tracing::warn!(error = %err, "watchdog did not stop cleanly");
                if outcome.is_ok() {
                    outcome = Err(err);
                }
            }
        }

        self.token.cancel();
        let forward = self.forward.lock().take();
        if let Some(forward) = forward {
            if let Err(err) = forward.await {
                tracing::warn!(error = %err, "event forwarder aborted");
            }
        }
        tracing::info!("runtime stopped");
        outcome
    }

    /// Waits for SIGINT/SIGTERM/SIGQUIT (Ctrl-C elsewhere) or a prior shutdown,
    /// then shuts down.
    pub async fn run_until_signal(&self) -> Result<(), RuntimeError> {
        tokio::select! {
            res = shutdown::wait_for_shutdown_signal() => {
                if let Err(err) = res {
                    tracing::warn!(error = %err, "signal registration failed; shutting down");
                }
            }
            _ = self.token.cancelled() => {}
        }
        self.shutdown().await
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("cfg", &self.cfg)
            .field("queues", &self.queues.len())
            .field("watchdogs", &self.watchdogs.lock().len())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_scheduler_is_idempotent() {
        let rt = Runtime::builder(RuntimeConfig::default()).build();

        let first = rt.start_scheduler().unwrap();
        let second = rt.start_scheduler().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        rt.shutdown().await.unwrap();
        assert!(rt.is_shut_down());
    }

    #[tokio::test]
    async fn zero_interval_watchdog_is_rejected() {
        let rt = Runtime::builder(RuntimeConfig::default()).build();
        let err = rt.watchdog(Duration::ZERO).unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidInterval { .. }));
        rt.shutdown().await.unwrap();
    }
}

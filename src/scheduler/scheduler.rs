//! # Scheduler: time-driven task starts.
//!
//! The job table is a [`SharedMap`] keyed by [`JobKey`] (due time, then task name),
//! so a plain ordered scan visits jobs in the order they become due.
//!
//! ```text
//! every(n)?.unit().run(task) ─┐
//! at("HH:MM")?.run(task)     ─┼─► jobs[due__name] ─► wake
//! once().run(task)           ─┘
//!
//! run_scheduler():
//!   loop until stop / ctx:
//!     for job in jobs (ascending due):
//!       due in future → wait = min(wait, due - now); break
//!       remove, task.start()
//!       interval → jobs[now + interval__name]
//!     wait on wake for `wait` (capped by max wait)
//!   reset stop + wake
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::core::TaskTimeouts;
use crate::error::RuntimeError;
use crate::events::{self, Bus, Event, EventKind};
use crate::scheduler::job::{Job, JobKey, ScheduleKind};
use crate::scheduler::schedule::{Schedule, parse_clock};
use crate::shared::{SharedMap, Signal};
use crate::tasks::{Kwargs, RunnableFn, StopFn, TaskBuilder, TaskRef};

/// Default cap on one wait of the scheduler loop.
const SCHEDULER_MAX_WAIT: Duration = Duration::from_secs(3_600);

/// Starts tasks on interval, clock-time and one-shot schedules.
pub struct Scheduler {
    jobs: SharedMap<JobKey, Job>,
    wake: Signal,
    stop: Signal,
    max_wait: Duration,
    running: AtomicBool,
    loop_task: Mutex<Option<TaskRef>>,
    timeouts: TaskTimeouts,
    bus: Option<Bus>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            jobs: SharedMap::new(),
            wake: Signal::new(),
            stop: Signal::new(),
            max_wait: SCHEDULER_MAX_WAIT,
            running: AtomicBool::new(false),
            loop_task: Mutex::new(None),
            timeouts: TaskTimeouts::default(),
            bus: None,
        }
    }

    /// Caps one wait of the loop (default 1h, minimum 1s).
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait.max(Duration::from_secs(1));
        self
    }

    /// Join bounds of the task created by [`Scheduler::task`].
    pub fn with_task_timeouts(mut self, timeouts: TaskTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub(crate) fn with_bus(mut self, bus: Bus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// True while `run_scheduler` runs.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Starts an interval schedule of `interval` units (hours by default).
    pub fn every(&self, interval: u64) -> Result<Schedule<'_>, RuntimeError> {
        if interval == 0 {
            return Err(RuntimeError::InvalidInterval {
                interval: Duration::ZERO,
                reason: "interval must be positive".into(),
            });
        }
        Ok(Schedule::interval(self, interval))
    }

    /// Starts a schedule at the next occurrence of a 24-hour `HH:MM` time.
    pub fn at(&self, time: &str) -> Result<Schedule<'_>, RuntimeError> {
        let time = parse_clock(time)?;
        Ok(Schedule::at(self, time))
    }

    /// Starts a one-shot schedule due immediately.
    pub fn once(&self) -> Schedule<'_> {
        Schedule::once(self)
    }

    pub(crate) fn add(&self, key: JobKey, job: Job) -> Result<JobKey, RuntimeError> {
        tracing::debug!(job = %key, kind = %job.kind, "scheduler: job added");
        events::emit(
            &self.bus,
            Event::new(EventKind::JobScheduled)
                .with_task(job.task.id())
                .with_job(key.to_string())
                .with_reason(job.kind.as_str()),
        );
        self.insert_job(key.clone(), job);
        self.wake.set();
        Ok(key)
    }

    /// Inserts under `key`; a job already holding the key is replaced.
    fn insert_job(&self, key: JobKey, job: Job) {
        if let Some(old) = self.jobs.insert(key.clone(), job) {
            tracing::warn!(
                job = %key,
                replaced = %old.kind,
                "scheduler: job replaced an entry with the same key"
            );
        }
    }

    /// Removes every job of the task named `name`; returns how many were removed.
    pub fn cancel(&self, name: &str) -> Result<usize, RuntimeError> {
        if name.is_empty() {
            return Err(RuntimeError::InvalidLabel {
                label: String::new(),
                reason: "task name cannot be empty".into(),
            });
        }
        let removed = self.jobs.remove_where(|key, _| key.name == name);
        if removed.is_empty() {
            return Err(RuntimeError::NotFound {
                what: "scheduled job",
                label: name.to_string(),
            });
        }

        for (key, _) in &removed {
            tracing::debug!(job = %key, "scheduler: job cancelled");
            events::emit(
                &self.bus,
                Event::new(EventKind::JobCancelled)
                    .with_task(name)
                    .with_job(key.to_string()),
            );
        }
        Ok(removed.len())
    }

    /// Sorted keys of the job table.
    pub fn jobs(&self) -> Vec<JobKey> {
        self.jobs.keys()
    }

    /// Job stored under `key`.
    pub fn job(&self, key: &JobKey) -> Option<Job> {
        self.jobs.get(key)
    }

    /// Number of jobs in the table.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Runs the wait/fire loop until `stop_scheduler` or `ctx` cancellation.
    pub async fn run_scheduler(&self, ctx: CancellationToken) {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::warn!("scheduler loop already running");
            return;
        }
        tracing::debug!(max_wait = ?self.max_wait, "scheduler: starting");

        while !self.stop.is_set() && !ctx.is_cancelled() {
            let wait = self.fire_due(Utc::now().timestamp_millis());
            tracing::trace!(?wait, "scheduler: sleeping");

            tokio::select! {
                _ = ctx.cancelled() => {}
                _ = self.stop.wait() => {}
                _ = self.wake.wait_timeout(wait) => {}
            }
            self.wake.clear();
        }

        tracing::debug!("scheduler: exiting loop");
        self.stop.clear();
        self.wake.clear();
        self.running.store(false, Ordering::SeqCst);
    }

    /// Fires every job due at `now_ms` and returns how long to wait for the next.
    fn fire_due(&self, now_ms: i64) -> Duration {
        let now = now_ms.div_euclid(1_000);
        let mut wait = self.max_wait;

        for (key, job) in self.jobs.entries() {
            let due_ms = key.due.saturating_mul(1_000);
            if due_ms > now_ms {
                let until = Duration::from_millis((due_ms - now_ms).unsigned_abs());
                wait = wait.min(until);
                break;
            }
            // Cancelled since the snapshot.
            if self.jobs.remove(&key).is_none() {
                continue;
            }

            tracing::debug!(job = %key, "scheduler: firing");
            job.task.start();
            events::emit(
                &self.bus,
                Event::new(EventKind::JobFired)
                    .with_task(job.task.id())
                    .with_job(key.to_string()),
            );

            if job.kind == ScheduleKind::Interval && !job.interval.is_zero() {
                let period = i64::try_from(job.interval.as_secs()).unwrap_or(i64::MAX);
                let next = JobKey::new(now.saturating_add(period), key.name.clone());
                tracing::trace!(job = %next, "scheduler: re-armed");
                self.insert_job(next, job.clone());
                wait = wait.min(job.interval);
            }
        }
        wait
    }

    /// Asks the loop to exit.
    pub fn stop_scheduler(&self) {
        tracing::debug!("scheduler: stop requested");
        self.stop.set();
        self.wake.set();
    }

    /// Builds (without starting) a thread-mode task running the loop.
    ///
    /// Its stop hook is [`Scheduler::stop_scheduler`].
    pub fn task(self: &Arc<Self>) -> TaskRef {
        let weak: Weak<Self> = Arc::downgrade(self);
        let run = RunnableFn::arc(move |ctx: CancellationToken, _kwargs: Kwargs| {
            let weak = weak.clone();
            async move {
                if let Some(scheduler) = weak.upgrade() {
                    scheduler.run_scheduler(ctx).await;
                }
                Ok(Value::Null)
            }
        });
        let weak: Weak<Self> = Arc::downgrade(self);
        let stop_hook = StopFn::arc(move |_kwargs: Kwargs| {
            let weak = weak.clone();
            async move {
                if let Some(scheduler) = weak.upgrade() {
                    scheduler.stop_scheduler();
                }
            }
        });

        let mut builder = TaskBuilder::new("scheduler")
            .runnable(run)
            .stop_with(stop_hook, Kwargs::new())
            .timeouts(self.timeouts);
        if let Some(bus) = &self.bus {
            builder = builder.bus(bus.clone());
        }
        let task = builder.build();
        *self.loop_task.lock() = Some(Arc::clone(&task));
        task
    }

    /// Builds the loop task and starts it.
    pub fn spawn(self: &Arc<Self>) -> TaskRef {
        let task = self.task();
        task.start();
        task
    }

    /// Stops the loop and joins the task created by [`Scheduler::task`], if any.
    pub async fn shutdown(&self) {
        self.stop_scheduler();
        let loop_task = self.loop_task.lock().take();
        if let Some(task) = loop_task {
            task.cleanup().await;
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("jobs", &self.jobs.len())
            .field("running", &self.is_running())
            .field("max_wait", &self.max_wait)
            .finish()
    }
}

//! # taskwarden
//!
//! **Taskwarden** is a supervised multitasking runtime for tokio applications.
//!
//! It lets an application spawn units of work (in-process or as child processes),
//! talk to them over typed message queues, keep them running with a reconciling
//! watchdog, and start them on interval or clock-time schedules.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!                 RuntimeBuilder::new(cfg).build()
//!                              │
//! ┌────────────────────────────▼──────────────────────────────────────┐
//! │  Runtime (explicit context)                                       │
//! │  - Bus (broadcast events)         - QueueRegistry (id → queue)    │
//! │  - SubscriberSet (fan-out)        - root CancellationToken        │
//! │  - internal Watchdog + Scheduler (lazy)                           │
//! └──────┬──────────────────┬──────────────────┬───────────────┬──────┘
//!        ▼                  ▼                  ▼               │
//!   ┌──────────┐      ┌───────────┐      ┌───────────┐         │
//!   │   Task   │◄─────│ Watchdog  │      │ Scheduler │         │
//!   │ (thread/ │      │ start/stop│      │ every/at/ │         │
//!   │ process) │◄─────┤ /restart  │      │ once      │         │
//!   └────┬─────┘      └─────┬─────┘      └─────┬─────┘         │
//!        │  MessageFrames   │                  │ Task::start() │
//!        ▼                  │                  │               │
//!   ┌──────────┐            │                  │               │
//!   │  Queue   │ listener ─► FrameHandler      │               │
//!   └────┬─────┘            │                  │               │
//!        │ Publishes events │                  │               │
//!        ▼                  ▼                  ▼               ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        Bus (broadcast channel)                    │
//! │               (capacity: RuntimeConfig::bus_capacity)             │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                       ┌────────────────────────┐
//!                       │  subscriber_listener   │
//!                       │      (in Runtime)      │
//!                       └───────────┬────────────┘
//!                                   ▼
//!                             SubscriberSet
//!                          ┌─────────┼─────────┐
//!                          ▼         ▼         ▼
//!                       worker1   worker2   workerN
//! ```
//!
//! ### Task lifecycle
//! ```text
//! NotStarted ──start()──► Running ──return──► Completed
//!                            └──────error/panic──► Error
//!
//! Watchdog pass:
//!   stop-requested  ─► stop()            ─► removed
//!   start-requested ─► start()           ─► watched
//!   watched & (!Running | !alive) ─► cleanup() + start()
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                         |
//! |-------------------|--------------------------------------------------------------|--------------------------------------------|
//! | **Tasks**         | Thread- or process-mode units of work with observable state. | [`Task`], [`TaskBuilder`], [`Runnable`]    |
//! | **Queues**        | Framed FIFO channels with control frames and query/response. | [`Queue`], [`MessageFrame`], [`FrameHandler`] |
//! | **Supervision**   | Reconciliation loop keeping tasks in their desired state.   | [`Watchdog`]                               |
//! | **Scheduling**    | Interval, clock-time and one-shot starts.                    | [`Scheduler`], [`Schedule`]                |
//! | **Subscriber API**| Hook into runtime events.                                    | [`Subscribe`], [`LogWriter`]               |
//! | **Errors**        | Typed errors for configuration, execution and protocol.      | [`RuntimeError`], [`TaskError`], [`QueueError`] |
//! | **Configuration** | Centralized runtime settings.                                | [`RuntimeConfig`]                          |
//!
//! ## Optional features
//! - `logging`: exports [`logger_init`] to install a text/JSON `tracing` subscriber.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use serde_json::{Value, json};
//! use tokio_util::sync::CancellationToken;
//! use taskwarden::{Kwargs, RunnableFn, Runtime, RuntimeConfig, TaskError, TaskStatus};
//!
//! #[tokio::main(flavor = "multi_thread", worker_threads = 2)]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let rt = Runtime::builder(RuntimeConfig::default()).build();
//!
//!     let hello = rt.thread(
//!         "hello",
//!         RunnableFn::arc(|_ctx: CancellationToken, kwargs: Kwargs| async move {
//!             let who = kwargs.get("who").and_then(Value::as_str).unwrap_or("world").to_string();
//!             Ok::<_, TaskError>(json!(format!("hello {who}")))
//!         }),
//!     );
//!
//!     hello.start();
//!     hello.wait_finished(Duration::from_secs(1)).await;
//!     hello.cleanup().await;
//!     assert_eq!(hello.status(), TaskStatus::Completed);
//!     assert_eq!(hello.result().return_value, Some(json!("hello world")));
//!
//!     rt.shutdown().await?;
//!     Ok(())
//! }
//! ```

mod core;
mod error;
mod events;
mod queue;
mod scheduler;
mod shared;
mod subscribers;
mod tasks;
mod watchdog;

// ---- Public re-exports ----

pub use core::{Runtime, RuntimeBuilder, RuntimeConfig, TaskTimeouts};
pub use error::{QueueError, RuntimeError, TaskError};
pub use events::{Bus, Event, EventKind};
pub use queue::{
    FrameHandler, FrameKind, HandlerFn, MessageFrame, Queue, QueueBuilder, QueueId, QueueRegistry,
};
pub use scheduler::{Job, JobKey, Schedule, ScheduleKind, Scheduler, TimeUnit};
pub use shared::{SharedMap, Signal};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
pub use tasks::{
    CommandSpec, ExecMode, Kwargs, Runnable, RunnableFn, StopFn, Stoppable, Target, Task,
    TaskBuilder, TaskRecord, TaskRef, TaskResult, TaskStatus,
};
pub use watchdog::Watchdog;

// Optional: process-wide tracing subscriber setup.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
mod logger;
#[cfg(feature = "logging")]
pub use logger::{LoggerConfig, LoggerError, LoggerFormat, logger_init};

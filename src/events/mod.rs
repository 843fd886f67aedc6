//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to runtime events emitted by task wrappers, queue listeners,
//! the watchdog, the scheduler and subscriber workers.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Task` execution wrapper, `Queue::listener`, `Watchdog::run`,
//!   `Scheduler::run_scheduler`, `SubscriberSet` workers (overflow/panic), `Runtime`.
//! - **Consumers**: the runtime's forward loop (fans out to `SubscriberSet`).

mod bus;
mod event;

pub use bus::Bus;
pub(crate) use bus::emit;
pub use event::{Event, EventKind};

//! # Event subscribers for the taskwarden runtime.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out and
//! the built-in [`LogWriter`].
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   Task / Queue / Watchdog / Scheduler ── publish(Event) ──► Bus
//!                                                              │
//!                                            Runtime forward loop
//!                                                              │
//!                                                     SubscriberSet::emit(&Event)
//!                                               ┌──────────┬───┴──────┐
//!                                               ▼          ▼          ▼
//!                                          LogWriter    Metrics    Custom ...
//! ```
//!
//! ## Implementing custom subscribers
//! ```rust
//! use taskwarden::{Event, EventKind, Subscribe};
//!
//! struct FailureAlarm;
//!
//! #[async_trait::async_trait]
//! impl Subscribe for FailureAlarm {
//!     async fn on_event(&self, event: &Event) {
//!         if event.is_failure() {
//!             // page someone
//!         }
//!     }
//!     fn name(&self) -> &'static str { "failure-alarm" }
//! }
//! ```

mod log;
mod set;
mod subscribe;

pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;

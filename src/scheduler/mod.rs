//! # Scheduler: interval, clock-time and one-shot task starts.
//!
//! - [`Scheduler`] owns the job table and runs the wait/fire loop
//! - [`Schedule`] is the fluent description finished by `run(task)`
//! - [`JobKey`], [`Job`], [`ScheduleKind`], [`TimeUnit`] describe table entries

mod job;
mod schedule;
#[allow(clippy::module_inception)]
mod scheduler;

pub use job::{Job, JobKey, ScheduleKind, TimeUnit};
pub use schedule::Schedule;
pub use scheduler::Scheduler;

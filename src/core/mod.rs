//! Runtime core: the explicit context object and its configuration.
//!
//! - [`Runtime`] owns the event bus, subscriber workers, queue registry, root
//!   cancellation token and the lazily created internal watchdog and scheduler;
//! - [`RuntimeBuilder`] constructs it;
//! - [`RuntimeConfig`] / [`TaskTimeouts`] hold the tunables;
//! - `shutdown` wires OS signals to cancellation.

mod builder;
mod config;
mod runtime;
mod shutdown;

pub use builder::RuntimeBuilder;
pub use config::{RuntimeConfig, TaskTimeouts};
pub use runtime::Runtime;

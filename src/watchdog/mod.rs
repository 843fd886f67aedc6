//! # Watchdog: keeps registered tasks in their desired state.
//!
//! Tasks are registered under a label and moved by the reconciliation loop
//! through start-requested, watched and stop-requested work-lists. A watched task
//! that is not running (finished, failed or never came up) is cleaned up and
//! started again on the next pass.

#[allow(clippy::module_inception)]
mod watchdog;

pub use watchdog::Watchdog;

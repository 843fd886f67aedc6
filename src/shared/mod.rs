//! # Shared state primitives.
//!
//! The runtime keeps every piece of coordination state behind one of two
//! provider types, so watchdogs, schedulers, queues and task wrappers can share
//! it across tokio tasks without knowing who else is looking:
//!
//! - [`Signal`] a settable/clearable boolean with async waits (event flag);
//! - [`SharedMap`] an ordered key→value map with single-key atomic operations.
//!
//! Both are cheap to clone; clones observe the same underlying state.

mod map;
mod signal;

pub use map::SharedMap;
pub use signal::Signal;

//! # Queues and the message-frame protocol.
//!
//! ## Contents
//! - [`MessageFrame`], [`FrameKind`], [`QueueId`] the typed envelope and its wire form
//! - [`Queue`], [`QueueBuilder`] FIFO channel of frames with a listener loop
//! - [`FrameHandler`], [`HandlerFn`] per-frame callback used by the listener
//! - [`QueueRegistry`] id → queue resolution for responses
//!
//! ## Query / response
//! ```text
//!  caller                      server queue                 reply queue
//!    │ query(P, Some(&reply))      │                             │
//!    ├──── QUERY{P, reply.id, S} ──►                             │
//!    │  returns S                  │ listener: handler(P) = R    │
//!    │                             ├─ respond(R, query) ─────────► RESPONSE{R, S}
//!    │ reply.get_frame(..) ◄───────┼─────────────────────────────┤
//! ```

mod frame;
mod handler;
#[allow(clippy::module_inception)]
mod queue;
mod registry;

pub use frame::{FrameKind, MessageFrame, QueueId};
pub use handler::{FrameHandler, HandlerFn};
pub use queue::{Queue, QueueBuilder};
pub use registry::QueueRegistry;

//! # Message handlers.
//!
//! A listener hands every `DATA` and `QUERY` frame to its queue's [`FrameHandler`].
//! For a `QUERY`, the returned value (or `null`) is sent back automatically.
//! An error stops the listener and surfaces as [`QueueError::Handler`](crate::QueueError::Handler).

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::TaskError;
use crate::queue::MessageFrame;

/// Callback invoked by [`Queue::listener`](crate::Queue::listener).
#[async_trait]
pub trait FrameHandler: Send + Sync + 'static {
    /// Handles one frame; `Ok(Some(v))` answers a query with `v`.
    async fn handle(&self, frame: &MessageFrame) -> Result<Option<Value>, TaskError>;
}

/// Closure-backed [`FrameHandler`].
///
/// ```rust
/// use serde_json::Value;
/// use taskwarden::{HandlerFn, MessageFrame, TaskError};
///
/// let echo = HandlerFn::arc(|frame: MessageFrame| async move {
///     Ok::<_, TaskError>(Some(frame.into_payload()))
/// });
/// # let _ = echo;
/// ```
#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

impl<F> HandlerFn<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }

    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<F, Fut> FrameHandler for HandlerFn<F>
where
    F: Fn(MessageFrame) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<Value>, TaskError>> + Send + 'static,
{
    async fn handle(&self, frame: &MessageFrame) -> Result<Option<Value>, TaskError> {
        (self.f)(frame.clone()).await
    }
}

//! # Capability traits for task targets and stop hooks.
//!
//! A [`Task`](crate::Task) runs a [`Runnable`] (in-process target) or a
//! [`CommandSpec`](crate::CommandSpec) (child process), and may be stopped through a
//! [`Stoppable`] hook. Closures are adapted with [`RunnableFn`] and [`StopFn`].
//!
//! ## Concurrency semantics
//! - Each start calls [`Runnable::run`] once, producing a **new** future.
//! - There is no hidden state between restarts; share state explicitly with
//!   `Arc<...>` inside the closure.
//!
//! ## Example
//! ```rust
//! use serde_json::{Value, json};
//! use tokio_util::sync::CancellationToken;
//! use taskwarden::{Kwargs, RunnableFn, TaskError};
//!
//! let greet = RunnableFn::arc(|_ctx: CancellationToken, kwargs: Kwargs| async move {
//!     let who = kwargs.get("who").and_then(Value::as_str).unwrap_or("world").to_string();
//!     Ok::<_, TaskError>(json!(format!("hello {who}")))
//! });
//! # let _ = greet;
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;

/// Keyword arguments handed to targets and stop hooks.
pub type Kwargs = serde_json::Map<String, Value>;

/// # In-process task target.
///
/// Receives the run's [`CancellationToken`] (cancelled by `Task::stop` when no stop
/// hook is configured) and a copy of the task's keyword arguments. The returned
/// value becomes the record's `return_value`; an error becomes its exception fields.
#[async_trait]
pub trait Runnable: Send + Sync + 'static {
    /// Executes the target once.
    async fn run(&self, ctx: CancellationToken, kwargs: Kwargs) -> Result<Value, TaskError>;
}

/// # Stop hook.
///
/// Expected to make the running target's blocking wait return (send an `EXIT`
/// frame, set a signal, ...).
#[async_trait]
pub trait Stoppable: Send + Sync + 'static {
    /// Requests the target to stop.
    async fn stop(&self, kwargs: Kwargs);
}

/// Closure-backed [`Runnable`].
#[derive(Debug)]
pub struct RunnableFn<F> {
    f: F,
}

impl<F> RunnableFn<F> {
    /// Wraps a closure `Fn(CancellationToken, Kwargs) -> Future`.
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Wraps the closure and returns it as a shared handle.
    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<F, Fut> Runnable for RunnableFn<F>
where
    F: Fn(CancellationToken, Kwargs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, TaskError>> + Send + 'static,
{
    async fn run(&self, ctx: CancellationToken, kwargs: Kwargs) -> Result<Value, TaskError> {
        (self.f)(ctx, kwargs).await
    }
}

/// Closure-backed [`Stoppable`].
#[derive(Debug)]
pub struct StopFn<F> {
    f: F,
}

impl<F> StopFn<F> {
    /// Wraps a closure `Fn(Kwargs) -> Future<Output = ()>`.
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Wraps the closure and returns it as a shared handle.
    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<F, Fut> Stoppable for StopFn<F>
where
    F: Fn(Kwargs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn stop(&self, kwargs: Kwargs) {
        (self.f)(kwargs).await
    }
}

//! # Queue: FIFO channel of frames with a listener loop.
//!
//! ## Listener
//! ```text
//! listener(ctx)
//!   loop {
//!     get_frame(keepalive) ──┬─ Empty + keepalive ─► Err(KeepaliveExceeded)
//!                            ├─ InvalidFormat     ─► Err(InvalidFormat)
//!                            └─ frame
//!     match frame.kind {
//!       EXIT            ─► Ok(())
//!       EMPTY/RESPONSE  ─► skip
//!       DATA            ─► handler(frame)             (Err ─► Err(Handler))
//!       QUERY           ─► handler(frame) ─► respond(reply or null, frame)
//!     }
//!     ctx cancelled     ─► Ok(())
//!   }
//! ```
//!
//! ## Rules
//! - FIFO per queue; no ordering across queues.
//! - One listener per queue at a time; a second call returns `Ok(())` at once.
//! - `listener_stop` enqueues `EXIT` at most once per run: while a listener runs, or
//!   with `remote` before it has started.
//! - Every wait on the queue honours its timeout, even while a listener holds it.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::error::{QueueError, TaskError};
use crate::events::{self, Bus, Event, EventKind};
use crate::queue::{FrameHandler, FrameKind, MessageFrame, QueueId, QueueRegistry};
use crate::shared::Signal;
use crate::tasks::{Kwargs, Runnable, RunnableFn, StopFn, Stoppable};

/// Default wait of a remote `listener_stop`.
const LISTENER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) struct QueueInner {
    id: QueueId,
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    pending: AtomicUsize,
    handler: Option<Arc<dyn FrameHandler>>,
    keepalive: Option<Duration>,
    stop_timeout: Duration,
    listening: AtomicBool,
    exit_pending: AtomicBool,
    finished: AtomicBool,
    stopped: Signal,
    registry: Arc<QueueRegistry>,
    bus: Option<Bus>,
}

impl Drop for QueueInner {
    fn drop(&mut self) {
        self.registry.unregister(&self.id);
    }
}

/// Builder for [`Queue`].
#[derive(Clone, Default)]
pub struct QueueBuilder {
    handler: Option<Arc<dyn FrameHandler>>,
    keepalive: Option<Duration>,
    stop_timeout: Option<Duration>,
    bus: Option<Bus>,
}

impl QueueBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handler for `DATA` and `QUERY` frames seen by the listener.
    pub fn handler(mut self, handler: Arc<dyn FrameHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Maximum silence the listener tolerates before failing with `KeepaliveExceeded`.
    pub fn keepalive(mut self, keepalive: Duration) -> Self {
        self.keepalive = Some(keepalive);
        self
    }

    /// Wait applied by `listener_stop(true)` (default 5s).
    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = Some(timeout);
        self
    }

    pub(crate) fn bus(mut self, bus: Bus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Creates the queue and registers it so responses can find it.
    pub fn build(self, registry: &Arc<QueueRegistry>) -> Queue {
        let (tx, rx) = mpsc::unbounded_channel();
        let stopped = Signal::new();

        let inner = Arc::new(QueueInner {
            id: QueueId::generate(),
            tx,
            rx: Mutex::new(rx),
            pending: AtomicUsize::new(0),
            handler: self.handler,
            keepalive: self.keepalive,
            stop_timeout: self.stop_timeout.unwrap_or(LISTENER_STOP_TIMEOUT),
            listening: AtomicBool::new(false),
            exit_pending: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            stopped,
            registry: Arc::clone(registry),
            bus: self.bus,
        });
        registry.register(inner.id.clone(), Arc::downgrade(&inner));
        Queue { inner }
    }
}

/// Cloneable handle to a FIFO channel of [`MessageFrame`]s.
#[derive(Clone)]
pub struct Queue {
    inner: Arc<QueueInner>,
}

impl Queue {
    /// Creates a builder.
    pub fn builder() -> QueueBuilder {
        QueueBuilder::new()
    }

    pub(crate) fn from_inner(inner: Arc<QueueInner>) -> Self {
        Self { inner }
    }

    /// Queue identifier (what `QUERY` frames carry).
    pub fn id(&self) -> &QueueId {
        &self.inner.id
    }

    /// Number of frames waiting.
    pub fn len(&self) -> usize {
        self.inner.pending.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True while a listener loop runs on this queue.
    pub fn is_listening(&self) -> bool {
        self.inner.listening.load(Ordering::SeqCst)
    }

    /// Enqueues a `DATA` frame.
    pub fn put(&self, payload: Value) -> Result<(), QueueError> {
        self.send(MessageFrame::data(payload))
    }

    /// Enqueues a pre-built frame.
    pub fn send(&self, frame: MessageFrame) -> Result<(), QueueError> {
        tracing::trace!(queue = %self.inner.id, kind = %frame.kind(), "send");
        self.send_raw(frame.encode()?)
    }

    /// Enqueues already encoded bytes; decoding happens on the receiving side.
    pub fn send_raw(&self, bytes: impl Into<Vec<u8>>) -> Result<(), QueueError> {
        self.inner.pending.fetch_add(1, Ordering::SeqCst);
        self.inner.tx.send(bytes.into()).map_err(|_| {
            self.inner.pending.fetch_sub(1, Ordering::SeqCst);
            QueueError::Closed
        })
    }

    /// Dequeues the next frame, waiting up to `timeout` (`None` waits forever).
    ///
    /// The bound covers the wait for a competing consumer (a running listener) too.
    pub async fn get_frame(&self, timeout: Option<Duration>) -> Result<MessageFrame, QueueError> {
        let recv = async {
            let mut rx = self.inner.rx.lock().await;
            rx.recv().await
        };
        let bytes = match timeout {
            Some(timeout) => tokio::time::timeout(timeout, recv)
                .await
                .map_err(|_| QueueError::Empty)?,
            None => recv.await,
        }
        .ok_or(QueueError::Closed)?;

        self.inner.pending.fetch_sub(1, Ordering::SeqCst);
        MessageFrame::decode(&bytes)
    }

    /// Dequeues the next frame without waiting.
    ///
    /// Also returns `Empty` while another consumer (a listener) is waiting on the queue.
    pub fn try_get_frame(&self) -> Result<MessageFrame, QueueError> {
        let mut rx = self.inner.rx.try_lock().map_err(|_| QueueError::Empty)?;
        let bytes = rx.try_recv().map_err(|err| match err {
            mpsc::error::TryRecvError::Empty => QueueError::Empty,
            mpsc::error::TryRecvError::Disconnected => QueueError::Closed,
        })?;
        drop(rx);

        self.inner.pending.fetch_sub(1, Ordering::SeqCst);
        MessageFrame::decode(&bytes)
    }

    /// Dequeues a `DATA` payload, waiting up to `timeout`.
    pub async fn get(&self, timeout: Option<Duration>) -> Result<Value, QueueError> {
        expect_data(self.get_frame(timeout).await?)
    }

    /// Dequeues a `DATA` payload without waiting.
    pub fn try_get(&self) -> Result<Value, QueueError> {
        expect_data(self.try_get_frame()?)
    }

    /// Sends a `QUERY` and returns its session id.
    ///
    /// The matching `RESPONSE` arrives on `response_queue` with the same session id.
    pub fn query(
        &self,
        payload: Value,
        response_queue: Option<&Queue>,
    ) -> Result<String, QueueError> {
        let response_queue = response_queue.ok_or(QueueError::QueueNotFound)?;
        let session = uuid::Uuid::new_v4().to_string();
        let frame = MessageFrame::new(FrameKind::Query, payload)
            .with_response_queue(response_queue.id().clone())
            .with_session_id(session.clone());
        self.send(frame)?;
        Ok(session)
    }

    /// Sends a `RESPONSE` for `query` to the queue it names.
    pub fn respond(&self, payload: Value, query: &MessageFrame) -> Result<(), QueueError> {
        let target_id = query
            .response_queue()
            .ok_or_else(|| QueueError::MissingResponseQueue {
                message_id: query.message_id().to_string(),
            })?;
        let target = self
            .inner
            .registry
            .resolve(target_id)
            .ok_or(QueueError::QueueNotFound)?;
        target.send(MessageFrame::response(payload, query))
    }

    /// Runs the listener loop until `EXIT`, cancellation or an error.
    pub async fn listener(&self, ctx: CancellationToken) -> Result<(), QueueError> {
        if self.inner.listening.swap(true, Ordering::SeqCst) {
            tracing::debug!(queue = %self.inner.id, "listener already running");
            return Ok(());
        }
        self.inner.finished.store(false, Ordering::SeqCst);
        self.inner.stopped.clear();
        events::emit(
            &self.inner.bus,
            Event::new(EventKind::ListenerStarted).with_label(self.inner.id.as_str()),
        );
        tracing::debug!(queue = %self.inner.id, "listener started");

        let res = self.listen(ctx).await;

        self.inner.listening.store(false, Ordering::SeqCst);
        self.inner.finished.store(true, Ordering::SeqCst);
        self.inner.stopped.set();

        let mut ev = Event::new(EventKind::ListenerStopped).with_label(self.inner.id.as_str());
        match &res {
            Ok(()) => tracing::debug!(queue = %self.inner.id, "listener exited"),
            Err(err) => {
                tracing::warn!(queue = %self.inner.id, error = %err, "listener failed");
                ev = ev.with_reason(err.to_string());
            }
        }
        events::emit(&self.inner.bus, ev);
        res
    }

    async fn listen(&self, ctx: CancellationToken) -> Result<(), QueueError> {
        loop {
            let next = tokio::select! {
                _ = ctx.cancelled() => return Ok(()),
                next = self.get_frame(self.inner.keepalive) => next,
            };
            let frame = match next {
                Ok(frame) => frame,
                Err(QueueError::Empty) => match self.inner.keepalive {
                    Some(keepalive) => return Err(QueueError::KeepaliveExceeded { keepalive }),
                    None => continue,
                },
                Err(err) => return Err(err),
            };

            match frame.kind() {
                FrameKind::Exit => {
                    self.inner.exit_pending.store(false, Ordering::SeqCst);
                    return Ok(());
                }
                FrameKind::Empty | FrameKind::Response => {
                    tracing::debug!(queue = %self.inner.id, kind = %frame.kind(), "frame skipped");
                }
                FrameKind::Data => {
                    self.dispatch(&frame).await?;
                }
                FrameKind::Query => {
                    if frame.response_queue().is_none() {
                        return Err(QueueError::MissingResponseQueue {
                            message_id: frame.message_id().to_string(),
                        });
                    }
                    let reply = self.dispatch(&frame).await?.unwrap_or(Value::Null);
                    if let Err(err) = self.respond(reply, &frame) {
                        tracing::warn!(
                            queue = %self.inner.id,
                            session = frame.session_id().unwrap_or("-"),
                            error = %err,
                            "response dropped"
                        );
                    }
                }
            }
        }
    }

    async fn dispatch(&self, frame: &MessageFrame) -> Result<Option<Value>, QueueError> {
        match &self.inner.handler {
            Some(handler) => handler.handle(frame).await.map_err(QueueError::Handler),
            None => {
                tracing::debug!(queue = %self.inner.id, kind = %frame.kind(), "no handler; frame dropped");
                Ok(None)
            }
        }
    }

    /// Asks the running listener to exit.
    ///
    /// With `remote`, the `EXIT` is also sent when the listener has not entered its
    /// loop yet (its hosting task may still be starting), and the call waits
    /// (bounded) until the listener acknowledges. A no-op once the last listener
    /// run has exited, and `EXIT` is never enqueued twice.
    pub async fn listener_stop(&self, remote: bool) {
        let starting = remote && !self.inner.finished.load(Ordering::SeqCst);
        if !self.is_listening() && !starting {
            tracing::debug!(queue = %self.inner.id, "listener_stop: not running");
            return;
        }
        if self.inner.exit_pending.swap(true, Ordering::SeqCst) {
            tracing::debug!(queue = %self.inner.id, "listener_stop: already requested");
        } else if let Err(err) = self.send(MessageFrame::exit()) {
            tracing::warn!(queue = %self.inner.id, error = %err, "listener_stop: exit not sent");
            self.inner.exit_pending.store(false, Ordering::SeqCst);
            return;
        }

        if remote && !self.inner.stopped.wait_timeout(self.inner.stop_timeout).await {
            tracing::warn!(
                queue = %self.inner.id,
                timeout = ?self.inner.stop_timeout,
                "listener did not acknowledge stop"
            );
        }
    }

    /// Drops every pending frame and returns how many were discarded.
    ///
    /// Never waits: a consumer parked on the queue means nothing is pending, so
    /// that case returns 0.
    pub fn cleanup(&self) -> usize {
        let Ok(mut rx) = self.inner.rx.try_lock() else {
            tracing::debug!(queue = %self.inner.id, "cleanup: consumer waiting; nothing pending");
            return 0;
        };
        let mut dropped = 0;
        while rx.try_recv().is_ok() {
            dropped += 1;
        }
        self.inner.pending.fetch_sub(dropped, Ordering::SeqCst);
        self.inner.exit_pending.store(false, Ordering::SeqCst);
        dropped
    }

    /// The listener as a task target; listener errors become task errors.
    pub fn as_runnable(&self) -> Arc<dyn Runnable> {
        let queue = self.clone();
        RunnableFn::arc(move |ctx: CancellationToken, _kwargs: Kwargs| {
            let queue = queue.clone();
            async move {
                queue.listener(ctx).await.map_err(TaskError::from)?;
                Ok(Value::Null)
            }
        })
    }

    /// `listener_stop(false)` as a task stop hook.
    pub fn as_stoppable(&self) -> Arc<dyn Stoppable> {
        let queue = self.clone();
        StopFn::arc(move |_kwargs: Kwargs| {
            let queue = queue.clone();
            async move { queue.listener_stop(false).await }
        })
    }
}

fn expect_data(frame: MessageFrame) -> Result<Value, QueueError> {
    match frame.kind() {
        FrameKind::Data => Ok(frame.into_payload()),
        other => Err(QueueError::UnexpectedFrame {
            kind: other.as_str(),
        }),
    }
}

impl fmt::Debug for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("id", &self.inner.id)
            .field("pending", &self.len())
            .field("listening", &self.is_listening())
            .finish()
    }
}

//! # Event flag shared between tokio tasks.
//!
//! [`Signal`] is backed by a [`tokio::sync::watch`] channel holding a `bool`.
//! Setting it wakes every waiter; clearing it makes later waits block again.
//!
//! ## Rules
//! - `set`/`clear` never block and never fail.
//! - `wait` returns immediately if the flag is already set.
//! - A set immediately followed by a clear may be missed by a waiter that had not
//!   observed the first change yet; loops that use a signal as a wake-up call
//!   always re-check their own state after waking.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// Settable, clearable, awaitable boolean flag.
#[derive(Clone, Debug)]
pub struct Signal {
    tx: Arc<watch::Sender<bool>>,
}

impl Signal {
    /// Creates a cleared signal.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Sets the flag and wakes all waiters.
    pub fn set(&self) {
        self.tx.send_replace(true);
    }

    /// Clears the flag.
    pub fn clear(&self) {
        self.tx.send_replace(false);
    }

    /// Returns the current value.
    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    /// Waits until the flag is set.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so `wait_for` only returns once set.
        let _ = rx.wait_for(|set| *set).await;
    }

    /// Waits until the flag is set or `timeout` elapses.
    ///
    /// Returns `true` if the flag was observed set.
    pub async fn wait_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait()).await.is_ok()
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_returns_immediately_when_already_set() {
        let sig = Signal::new();
        sig.set();
        assert!(sig.wait_timeout(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn clones_share_state() {
        let sig = Signal::new();
        let other = sig.clone();

        let waiter = tokio::spawn(async move { other.wait_timeout(Duration::from_secs(1)).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        sig.set();

        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn cleared_signal_times_out() {
        let sig = Signal::new();
        sig.set();
        sig.clear();
        assert!(!sig.is_set());
        assert!(!sig.wait_timeout(Duration::from_millis(20)).await);
    }
}

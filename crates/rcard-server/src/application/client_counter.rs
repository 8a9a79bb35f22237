//! Connected-client counter.
//!
//! Every open WebSocket session counts as one client, and every in-flight
//! REST request counts as one client for its duration.  The value is echoed
//! as `num_connections` in every response.
//!
//! The counter is lock-free (`AtomicUsize`).  Decrements saturate at zero so
//! a stray extra decrement can never wrap around to `usize::MAX`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct ClientCounter {
    inner: AtomicUsize,
}

impl ClientCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one more client and returns the new total.
    pub fn connect(&self) -> usize {
        self.inner.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Counts one client less and returns the new total.
    pub fn disconnect(&self) -> usize {
        let previous = self
            .inner
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                Some(n.saturating_sub(1))
            })
            .unwrap_or(0);
        previous.saturating_sub(1)
    }

    pub fn current(&self) -> usize {
        self.inner.load(Ordering::SeqCst)
    }

    /// Counts a client until the returned guard is dropped.
    pub fn guard(self: &Arc<Self>) -> ClientGuard {
        self.connect();
        ClientGuard {
            counter: Arc::clone(self),
        }
    }
}

/// Decrements the counter on drop.
#[derive(Debug)]
pub struct ClientGuard {
    counter: Arc<ClientCounter>,
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        self.counter.disconnect();
    }
}

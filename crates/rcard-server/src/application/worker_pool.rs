//! Bounded pool for blocking card I/O.
//!
//! PC/SC and relay calls block the calling thread.  Running them directly on
//! an async task would stall every other session scheduled on that runtime
//! thread, so each job goes through [`tokio::task::spawn_blocking`], gated by
//! a semaphore so at most `size` jobs touch card backends at once.
//!
//! A job keeps its permit until it finishes, even if the request that
//! submitted it has gone away (closed session, timed-out REST call).

use std::sync::Arc;

use rcard_core::GatewayError;
use tokio::sync::Semaphore;
use tracing::error;

/// A fixed-size pool of blocking workers.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    /// Creates a pool with `size` workers (at least one).
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Workers not currently running a job.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Runs `job` on a worker and returns its output.
    ///
    /// # Errors
    ///
    /// A panicking job is reported as [`GatewayError::Transmit`].
    pub async fn run<F, T>(&self, job: F) -> Result<T, GatewayError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| GatewayError::Transmit("worker pool closed".to_string()))?;

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        })
        .await
        .map_err(|e| {
            error!("worker job failed: {e}");
            if e.is_panic() {
                GatewayError::Transmit("card worker panicked".to_string())
            } else {
                GatewayError::Transmit("card worker cancelled".to_string())
            }
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

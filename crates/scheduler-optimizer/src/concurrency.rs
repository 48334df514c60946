//! Concurrency limiter (C8, second half): a counting semaphore of capacity
//! `maxConcurrency` plus a FIFO queue-depth watermark. Requests beyond the
//! watermark fail fast with `SystemOverload` instead of queuing
//! indefinitely, per §5's optional optimizer resource model. Grounded on
//! the source's `ConnectionPool`'s `Arc<Semaphore>`-gated `acquire`
//! pattern, adapted from a pool of reusable connections to a bare
//! admission gate (there is nothing to check back in).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use scheduler_common::{ErrorCode, PipelineError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    queue_high_watermark: usize,
    queued: AtomicUsize,
}

impl ConcurrencyLimiter {
    pub fn new(max_concurrency: usize, queue_high_watermark: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrency.max(1))),
            queue_high_watermark,
            queued: AtomicUsize::new(0),
        }
    }

    /// Acquire a slot, queuing if none are immediately free. Rejects with
    /// `SystemOverload` if the queue is already at its watermark rather than
    /// growing it unbounded.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, PipelineError> {
        if self.semaphore.available_permits() == 0 {
            if self.queued.load(Ordering::Relaxed) >= self.queue_high_watermark {
                return Err(PipelineError::new(ErrorCode::SystemOverload, "concurrency queue at watermark"));
            }
            self.queued.fetch_add(1, Ordering::Relaxed);
            let permit = self.semaphore.clone().acquire_owned().await;
            self.queued.fetch_sub(1, Ordering::Relaxed);
            permit.map_err(|_| PipelineError::new(ErrorCode::SystemOverload, "semaphore closed"))
        } else {
            self.semaphore
                .clone()
                .try_acquire_owned()
                .map_err(|_| PipelineError::new(ErrorCode::SystemOverload, "lost race for a free slot"))
        }
    }

    pub fn queued_len(&self) -> usize {
        self.queued.load(Ordering::Relaxed)
    }
}

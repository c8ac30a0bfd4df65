//! `AdmissionTicket` (a place in the queue) and `SlotGuard` (a held
//! parallelism slot), expressed with `tokio::sync::Semaphore` +
//! `CancellationToken` instead of a hand-rolled waiter list: the
//! semaphore already gives FIFO wake order per model, which is all the
//! fairness this layer needs.

use crate::queue::ModelQueueState;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Returned by [`crate::ConcurrencyManager::admit`] when the per-model
/// queue is at capacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedFull {
    pub model: String,
}

impl fmt::Display for RejectedFull {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue for model {:?} is full", self.model)
    }
}

impl std::error::Error for RejectedFull {}

/// Returned when a queued or in-flight request's cancellation signal fires
/// before a slot was handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("request was cancelled while queued")
    }
}

impl std::error::Error for Cancelled {}

/// A place in a model's queue. Consumed by [`AdmissionTicket::acquire`].
///
/// The queue slot claimed at `admit` time is returned on every exit path:
/// acquiring, cancellation, and dropping the ticket or an in-progress
/// `acquire` future (hyper drops the whole handler future when a client
/// disconnects mid-wait) all decrement `queued` exactly once.
#[derive(Debug)]
pub struct AdmissionTicket {
    pub(crate) semaphore: Arc<Semaphore>,
    pub(crate) state: Arc<ModelQueueState>,
    pub(crate) enqueued_at: Instant,
    pub(crate) cancellation: CancellationToken,
    pub(crate) queued: bool,
}

impl AdmissionTicket {
    /// Block until a parallel slot is free or `cancellation` fires.
    pub async fn acquire(mut self) -> Result<SlotGuard, Cancelled> {
        let semaphore = Arc::clone(&self.semaphore);
        let cancellation = self.cancellation.clone();
        let acquired = tokio::select! {
            permit = semaphore.acquire_owned() => {
                Some(permit.expect("model semaphore is never closed while the manager is alive"))
            }
            _ = cancellation.cancelled() => None,
        };
        self.leave_queue();
        match acquired {
            Some(permit) => {
                let wait = self.enqueued_at.elapsed();
                self.state.mark_active(wait);
                Ok(SlotGuard {
                    state: Arc::clone(&self.state),
                    permit: Some(permit),
                    acquired_at: Instant::now(),
                    released: false,
                })
            }
            None => Err(Cancelled),
        }
    }

    fn leave_queue(&mut self) {
        if self.queued {
            self.queued = false;
            self.state.dequeue();
        }
    }
}

impl Drop for AdmissionTicket {
    fn drop(&mut self) {
        self.leave_queue();
    }
}

/// A held parallelism slot. `release` must be called exactly once; if the
/// caller forgets (including on an unwinding panic), `Drop` releases it
/// using the guard's own elapsed time as the process duration, so a slot
/// is always released exactly once regardless of how the caller exits.
#[derive(Debug)]
pub struct SlotGuard {
    state: Arc<ModelQueueState>,
    permit: Option<OwnedSemaphorePermit>,
    acquired_at: Instant,
    released: bool,
}

impl SlotGuard {
    pub fn release(mut self, process: Duration) {
        self.do_release(process);
    }

    pub fn elapsed(&self) -> Duration {
        self.acquired_at.elapsed()
    }

    fn do_release(&mut self, process: Duration) {
        if self.released {
            return;
        }
        self.released = true;
        self.permit.take();
        self.state.mark_released(process);
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if !self.released {
            let elapsed = self.acquired_at.elapsed();
            self.do_release(elapsed);
        }
    }
}

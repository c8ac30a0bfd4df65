//! Per-model counters. The mutable state here is plain data guarded by a
//! `std::sync::Mutex`, with the two configurable limits kept in atomics so
//! `ConcurrencyManager::reconfigure` can adjust them without taking the
//! counters lock; the actual blocking/admission mechanics live in
//! `manager.rs` and `ticket.rs`, layered on top of a `tokio::sync::Semaphore`.

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

const EWMA_ALPHA: f64 = 0.2;

#[derive(Debug, Serialize, Clone)]
pub struct ModelQueueStats {
    pub model: String,
    pub parallel_limit: usize,
    pub queue_limit: usize,
    pub active: usize,
    pub queued: usize,
    pub processed: u64,
    pub rejected: u64,
    pub ewma_wait_ms: f64,
    pub ewma_process_ms: f64,
    pub created_at_unix_ms: u128,
}

#[derive(Debug)]
pub(crate) struct ModelQueueState {
    parallel_limit: AtomicUsize,
    queue_limit: AtomicUsize,
    counters: Mutex<Counters>,
    created_at_unix_ms: u128,
}

#[derive(Debug)]
struct Counters {
    active: usize,
    queued: usize,
    processed: u64,
    rejected: u64,
    ewma_wait_ms: f64,
    ewma_process_ms: f64,
}

impl ModelQueueState {
    pub(crate) fn new(parallel_limit: usize, queue_limit: usize) -> Self {
        Self {
            parallel_limit: AtomicUsize::new(parallel_limit),
            queue_limit: AtomicUsize::new(queue_limit),
            counters: Mutex::new(Counters {
                active: 0,
                queued: 0,
                processed: 0,
                rejected: 0,
                ewma_wait_ms: 0.0,
                ewma_process_ms: 0.0,
            }),
            created_at_unix_ms: now_unix_ms(),
        }
    }

    /// Returns `true` and increments `queued` iff there is queue capacity.
    pub(crate) fn try_enqueue(&self) -> bool {
        let mut c = self.counters.lock().expect("queue mutex poisoned");
        if c.queued < self.queue_limit.load(Ordering::Relaxed) {
            c.queued += 1;
            true
        } else {
            c.rejected += 1;
            false
        }
    }

    pub(crate) fn parallel_limit(&self) -> usize {
        self.parallel_limit.load(Ordering::Relaxed)
    }

    pub(crate) fn queue_limit(&self) -> usize {
        self.queue_limit.load(Ordering::Relaxed)
    }

    pub(crate) fn set_parallel_limit(&self, limit: usize) {
        self.parallel_limit.store(limit, Ordering::Relaxed);
    }

    pub(crate) fn set_queue_limit(&self, limit: usize) {
        self.queue_limit.store(limit, Ordering::Relaxed);
    }

    /// Called when a queued waiter stops waiting, whether it acquired a
    /// slot or was cancelled.
    pub(crate) fn dequeue(&self) {
        let mut c = self.counters.lock().expect("queue mutex poisoned");
        c.queued = c.queued.saturating_sub(1);
    }

    pub(crate) fn mark_active(&self, wait: Duration) {
        let mut c = self.counters.lock().expect("queue mutex poisoned");
        c.active += 1;
        c.ewma_wait_ms = ewma(c.ewma_wait_ms, wait.as_secs_f64() * 1000.0);
    }

    pub(crate) fn mark_released(&self, process: Duration) {
        let mut c = self.counters.lock().expect("queue mutex poisoned");
        c.active = c.active.saturating_sub(1);
        c.processed += 1;
        c.ewma_process_ms = ewma(c.ewma_process_ms, process.as_secs_f64() * 1000.0);
    }

    pub(crate) fn stats(&self, model: &str) -> ModelQueueStats {
        let c = self.counters.lock().expect("queue mutex poisoned");
        ModelQueueStats {
            model: model.to_string(),
            parallel_limit: self.parallel_limit(),
            queue_limit: self.queue_limit(),
            active: c.active,
            queued: c.queued,
            processed: c.processed,
            rejected: c.rejected,
            ewma_wait_ms: c.ewma_wait_ms,
            ewma_process_ms: c.ewma_process_ms,
            created_at_unix_ms: self.created_at_unix_ms,
        }
    }

    pub(crate) fn reset_counters(&self) {
        let mut c = self.counters.lock().expect("queue mutex poisoned");
        c.processed = 0;
        c.rejected = 0;
        c.ewma_wait_ms = 0.0;
        c.ewma_process_ms = 0.0;
        // `active`/`queued` are not reset: they reflect real in-flight
        // work and resetting them would desynchronize from the semaphore.
    }
}

fn ewma(prev: f64, sample: f64) -> f64 {
    if prev == 0.0 {
        sample
    } else {
        EWMA_ALPHA * sample + (1.0 - EWMA_ALPHA) * prev
    }
}

fn now_unix_ms() -> u128 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

//! `ConcurrencyManager`: owns one `(Semaphore, ModelQueueState)` pair per
//! model, created lazily on first sight and kept for the process lifetime.
//! The limiter itself is a plain `tokio::sync::Semaphore`; the map only
//! adds per-model identity and reconfiguration on top.

use crate::autosize::auto_parallel_limit;
use crate::queue::{ModelQueueState, ModelQueueStats};
use crate::ticket::{AdmissionTicket, RejectedFull};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// A parallel limit expressed either as a fixed number of slots or as a
/// request to derive one from host memory at model-creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParallelLimit {
    Fixed(usize),
    Auto,
}

impl ParallelLimit {
    fn resolve(self) -> usize {
        match self {
            ParallelLimit::Fixed(n) => n.max(1),
            ParallelLimit::Auto => auto_parallel_limit(),
        }
    }
}

struct ModelEntry {
    semaphore: Arc<Semaphore>,
    state: Arc<ModelQueueState>,
}

/// Per-model bounded queue plus bounded parallelism, as described for the
/// admission-control stage: a request first claims a place in line, then
/// blocks on a slot, and releases the slot exactly once when it's done.
pub struct ConcurrencyManager {
    default_parallel_limit: ParallelLimit,
    default_queue_limit: usize,
    models: Mutex<HashMap<String, Arc<ModelEntry>>>,
}

impl ConcurrencyManager {
    pub fn new(default_parallel_limit: ParallelLimit, default_queue_limit: usize) -> Self {
        Self {
            default_parallel_limit,
            default_queue_limit,
            models: Mutex::new(HashMap::new()),
        }
    }

    fn entry_for(&self, model: &str) -> Arc<ModelEntry> {
        let mut models = self.models.lock().expect("model map mutex poisoned");
        if let Some(entry) = models.get(model) {
            return Arc::clone(entry);
        }
        let parallel_limit = self.default_parallel_limit.resolve();
        let entry = Arc::new(ModelEntry {
            semaphore: Arc::new(Semaphore::new(parallel_limit)),
            state: Arc::new(ModelQueueState::new(parallel_limit, self.default_queue_limit)),
        });
        models.insert(model.to_string(), Arc::clone(&entry));
        entry
    }

    /// Claims a place in `model`'s queue. Returns `RejectedFull` immediately
    /// if the queue is already at its limit; otherwise returns a ticket
    /// that must be `.acquire()`d to obtain a parallel slot.
    #[instrument(skip(self, cancellation), fields(model = %model))]
    pub fn admit(
        &self,
        model: &str,
        cancellation: CancellationToken,
    ) -> Result<AdmissionTicket, RejectedFull> {
        let entry = self.entry_for(model);
        if !entry.state.try_enqueue() {
            debug!("queue full, rejecting");
            return Err(RejectedFull {
                model: model.to_string(),
            });
        }
        Ok(AdmissionTicket {
            semaphore: Arc::clone(&entry.semaphore),
            state: Arc::clone(&entry.state),
            enqueued_at: std::time::Instant::now(),
            cancellation,
            queued: true,
        })
    }

    /// Adjusts `model`'s limits in place. A queue that did not previously
    /// exist for `model` is created using the defaults, then reconfigured.
    /// Growing the parallel limit immediately wakes any waiters that can
    /// now make progress; shrinking it only takes effect as permits already
    /// in use are returned, so in-flight work is never interrupted.
    #[instrument(skip(self))]
    pub fn reconfigure(
        &self,
        model: &str,
        parallel_limit: Option<ParallelLimit>,
        queue_limit: Option<usize>,
    ) {
        let entry = self.entry_for(model);

        if let Some(requested) = parallel_limit {
            let new_limit = requested.resolve();
            let old_limit = entry.state.parallel_limit();
            if new_limit > old_limit {
                entry.semaphore.add_permits(new_limit - old_limit);
            } else if new_limit < old_limit {
                let deficit = old_limit - new_limit;
                let semaphore = Arc::clone(&entry.semaphore);
                // Permits already checked out stay checked out; we only
                // forget permits as they are returned, so this converges
                // to `new_limit` without cancelling in-flight work.
                tokio::spawn(async move {
                    if let Ok(permits) = semaphore.acquire_many_owned(deficit as u32).await {
                        permits.forget();
                    }
                });
            }
            entry.state.set_parallel_limit(new_limit);
        }

        if let Some(new_queue_limit) = queue_limit {
            entry.state.set_queue_limit(new_queue_limit);
        }
    }

    /// Snapshot stats for one model, or `None` if it has never been seen.
    pub fn stats_for(&self, model: &str) -> Option<ModelQueueStats> {
        let models = self.models.lock().expect("model map mutex poisoned");
        models.get(model).map(|entry| entry.state.stats(model))
    }

    /// Snapshot stats for every model seen so far.
    pub fn stats_all(&self) -> Vec<ModelQueueStats> {
        let models = self.models.lock().expect("model map mutex poisoned");
        models
            .iter()
            .map(|(name, entry)| entry.state.stats(name))
            .collect()
    }

    pub fn reset_counters(&self, model: &str) {
        let models = self.models.lock().expect("model map mutex poisoned");
        if let Some(entry) = models.get(model) {
            entry.state.reset_counters();
        }
    }
}

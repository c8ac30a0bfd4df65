#![deny(rust_2018_idioms)]

//! Content-addressed memoization of scan verdicts with TTL, a bounded
//! LRU, and single-flight: one mutex-guarded map in front of the compute
//! path, where concurrent lookups for the same key coalesce onto a shared
//! in-flight future instead of racing the scanners.

mod purge;

pub use purge::Sweeper;

use futures::future::{BoxFuture, FutureExt, Shared};
use lru::LruCache;
use promptgate_error::ProxyError;
use promptgate_scan::{Fingerprint, ScanReport};
use serde::Serialize;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

type SharedReport = Shared<BoxFuture<'static, Result<ScanReport, Arc<ProxyError>>>>;

enum Slot {
    Ready { report: ScanReport, expires_at: Instant },
    InFlight(SharedReport),
}

struct Inner {
    entries: LruCache<Fingerprint, Slot>,
    ttl: Duration,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// A point-in-time snapshot of cache counters, returned by `stats()`.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
}

/// The process-singleton scan-result cache. Cheap to clone: internally an
/// `Arc<Mutex<..>>`, matching how `ConcurrencyManager` and `BackendClient`
/// are shared across request tasks.
#[derive(Clone)]
pub struct ScanCache {
    inner: Arc<Mutex<Inner>>,
}

enum Lookup {
    Hit(ScanReport),
    Join(SharedReport),
    Owned(SharedReport),
}

impl ScanCache {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(max_entries.max(1)).expect("capacity is nonzero");
        Self {
            inner: Arc::new(Mutex::new(Inner {
                entries: LruCache::new(capacity),
                ttl,
                hits: 0,
                misses: 0,
                evictions: 0,
            })),
        }
    }

    /// Return the cached report for `key` if present and unexpired;
    /// otherwise run `compute` exactly once per set of concurrent callers
    /// (single-flight) and cache its success.
    ///
    /// `compute` is not invoked until it's established that no unexpired
    /// entry and no in-flight computation exists for `key`. The closure
    /// itself is only *constructed*, not polled, while the lock is held;
    /// the returned future is spawned onto the runtime so it keeps making
    /// progress independently of which caller is awaiting it.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: Fingerprint,
        compute: F,
    ) -> Result<ScanReport, ProxyError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ScanReport, ProxyError>> + Send + 'static,
    {
        let lookup = {
            let mut inner = self.inner.lock().expect("cache mutex poisoned");
            evict_if_expired(&mut inner, &key);

            match inner.entries.get(&key) {
                Some(Slot::Ready { report, .. }) => {
                    let report = report.clone();
                    inner.hits += 1;
                    Lookup::Hit(report)
                }
                Some(Slot::InFlight(shared)) => {
                    let shared = shared.clone();
                    inner.hits += 1;
                    Lookup::Join(shared)
                }
                None => {
                    inner.misses += 1;
                    let fut = compute();
                    let handle = tokio::spawn(async move { fut.await.map_err(Arc::new) });
                    let shared: SharedReport = async move {
                        match handle.await {
                            Ok(result) => result,
                            Err(join_err) => Err(Arc::new(ProxyError::internal(format!(
                                "scan task panicked: {join_err}"
                            )))),
                        }
                    }
                    .boxed()
                    .shared();

                    if let Some((evicted_key, _)) = inner.entries.push(key, Slot::InFlight(shared.clone())) {
                        if evicted_key != key {
                            inner.evictions += 1;
                            debug!(?evicted_key, "evicted least-recently-used cache entry");
                        }
                    }
                    Lookup::Owned(shared)
                }
            }
        };

        match lookup {
            Lookup::Hit(report) => Ok(report),
            Lookup::Join(shared) => shared.await.map_err(|e| (*e).clone()),
            Lookup::Owned(shared) => {
                let result = shared.await;
                self.finalize(key, &result);
                result.map_err(|e| (*e).clone())
            }
        }
    }

    fn finalize(&self, key: Fingerprint, result: &Result<ScanReport, Arc<ProxyError>>) {
        let mut inner = self.inner.lock().expect("cache mutex poisoned");
        match result {
            Ok(report) => {
                let expires_at = Instant::now() + inner.ttl;
                inner.entries.put(
                    key,
                    Slot::Ready {
                        report: report.clone(),
                        expires_at,
                    },
                );
            }
            Err(_) => {
                // Do not cache the failure; the in-flight marker is
                // removed so the next call recomputes.
                inner.entries.pop(&key);
            }
        }
    }

    pub fn invalidate(&self, key: &Fingerprint) {
        let mut inner = self.inner.lock().expect("cache mutex poisoned");
        inner.entries.pop(key);
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("cache mutex poisoned");
        inner.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().expect("cache mutex poisoned");
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            size: inner.entries.len(),
        }
    }

    /// Remove every expired entry right now, outside of the lazy
    /// on-lookup path. Intended to be driven by [`Sweeper`] on an
    /// interval.
    pub fn sweep(&self) {
        let mut inner = self.inner.lock().expect("cache mutex poisoned");
        let now = Instant::now();
        let expired: Vec<Fingerprint> = inner
            .entries
            .iter()
            .filter_map(|(k, slot)| match slot {
                Slot::Ready { expires_at, .. } if *expires_at <= now => Some(*k),
                _ => None,
            })
            .collect();
        for key in expired {
            inner.entries.pop(&key);
            inner.evictions += 1;
        }
    }
}

fn evict_if_expired(inner: &mut Inner, key: &Fingerprint) {
    let expired = matches!(
        inner.entries.peek(key),
        Some(Slot::Ready { expires_at, .. }) if *expires_at <= Instant::now()
    );
    if expired {
        inner.entries.pop(key);
        inner.evictions += 1;
    }
}

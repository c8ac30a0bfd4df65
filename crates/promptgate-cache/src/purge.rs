//! A background task that periodically drives [`ScanCache::sweep`]:
//! lookups already evict lazily, this just bounds how long a dead entry
//! can sit unused.

use crate::ScanCache;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Owns the sweep task; dropping the handle hangs up the background
/// worker.
pub struct Sweeper {
    handle: JoinHandle<()>,
}

impl Sweeper {
    pub fn spawn(cache: ScanCache, interval: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                cache.sweep();
            }
        });
        Self { handle }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptgate_scan::{fingerprint, ScanReport};

    #[tokio::test(start_paused = true)]
    async fn sweeper_evicts_expired_entries_on_its_own() {
        let cache = ScanCache::new(10, Duration::from_millis(10));
        let fp = fingerprint("swept");
        cache
            .get_or_compute(fp, || async { Ok(ScanReport::allow_all()) })
            .await
            .unwrap();
        assert_eq!(cache.stats().size, 1);

        let _sweeper = Sweeper::spawn(cache.clone(), Duration::from_millis(5));
        tokio::time::advance(Duration::from_millis(50)).await;
        tokio::task::yield_now().await;

        assert_eq!(cache.stats().size, 0);
    }
}

//! Wires a `ScanPipeline` through a `ScanCache`: both the native HTTP
//! entry point and any future adapter call this, not the pipeline
//! directly, so every caller shares one cache's coherence.

use promptgate_cache::{CacheStats, ScanCache};
use promptgate_error::ProxyError;
use promptgate_scan::{fingerprint, ScanContext, ScanPipeline, ScanReport};

#[derive(Clone)]
pub struct ScanCoordinator {
    pipeline: ScanPipeline,
    cache: ScanCache,
}

impl ScanCoordinator {
    pub fn new(pipeline: ScanPipeline, cache: ScanCache) -> Self {
        Self { pipeline, cache }
    }

    /// The raw pipeline, uncached. `StreamMediator` uses this directly
    /// instead of `scan`: it runs on rolling, per-stream buffers that are
    /// never repeated across requests, so memoizing them would only add
    /// lock overhead with no hit rate to show for it.
    pub fn pipeline(&self) -> ScanPipeline {
        self.pipeline.clone()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// The underlying cache handle, for wiring a background sweep task at
    /// process startup.
    pub fn cache(&self) -> ScanCache {
        self.cache.clone()
    }

    /// Runs the pipeline over `text`, memoized by its fingerprint. An
    /// identity pipeline skips the cache entirely: there is nothing to
    /// memoize and no reason to consume cache capacity for it.
    ///
    /// The single-flight future handed to the cache must be `'static`, so
    /// the context's borrowed fields are cloned into it rather than
    /// borrowed across the await.
    pub async fn scan(&self, text: &str, ctx: &ScanContext<'_>) -> Result<ScanReport, ProxyError> {
        if self.pipeline.is_identity() {
            return Ok(ScanReport::allow_all());
        }
        let key = fingerprint(text);
        let pipeline = self.pipeline.clone();
        let owned_text = text.to_string();
        let request_id = ctx.request_id.to_string();
        let client_id = ctx.client_id.to_string();
        let model = ctx.model.to_string();
        let language = ctx.language;
        self.cache
            .get_or_compute(key, move || async move {
                let scan_ctx = ScanContext {
                    request_id: &request_id,
                    client_id: &client_id,
                    language,
                    model: &model,
                };
                Ok(pipeline.scan(&owned_text, &scan_ctx).await)
            })
            .await
    }
}

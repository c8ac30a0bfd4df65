//! `AppState`: the `axum` dependency-injection point. Every process
//! singleton is constructed once in `main`, wrapped here, and handed to
//! the router via `.with_state`; tests build the same struct with fakes
//! in place of `BackendClient` and the scanner registry.

use crate::config::Config;
use crate::events::EventSink;
use crate::ingress::IngressFilter;
use crate::scan_coordinator::ScanCoordinator;
use promptgate_cache::Sweeper;
use promptgate_concurrency::ConcurrencyManager;
use promptgate_http::BackendClient;
use promptgate_scan::ErrorCatalog;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState(pub Arc<Inner>);

pub struct Inner {
    pub config: Config,
    pub ingress: IngressFilter,
    pub concurrency: ConcurrencyManager,
    pub input_scan: ScanCoordinator,
    pub output_scan: ScanCoordinator,
    pub backend: BackendClient,
    pub catalog: ErrorCatalog,
    pub events: Arc<dyn EventSink>,
    // Kept alive for the process lifetime; dropping either aborts its sweep
    // task. Lazy per-lookup eviction already bounds memory, these just cap
    // how long an unused expired entry can sit in the map.
    _input_sweeper: Sweeper,
    _output_sweeper: Sweeper,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        ingress: IngressFilter,
        concurrency: ConcurrencyManager,
        input_scan: ScanCoordinator,
        output_scan: ScanCoordinator,
        backend: BackendClient,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let sweep_interval = config.cache_ttl();
        let input_sweeper = Sweeper::spawn(input_scan.cache(), sweep_interval);
        let output_sweeper = Sweeper::spawn(output_scan.cache(), sweep_interval);
        Self(Arc::new(Inner {
            config,
            ingress,
            concurrency,
            input_scan,
            output_scan,
            backend,
            catalog: ErrorCatalog::new(),
            events,
            _input_sweeper: input_sweeper,
            _output_sweeper: output_sweeper,
        }))
    }
}

impl std::ops::Deref for AppState {
    type Target = Inner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

//! Application wiring: configuration, ingress, the admission/scan/mediate
//! request flow, and the admin surface, assembled into one `axum::Router`.
//! The scanner registry (mapping a configured scanner name to an actual
//! detector) is out of scope here; `build_pipeline` recognizes only the
//! `noop` pass-through scanner and otherwise logs and skips, so a
//! misconfigured scanner name fails safe rather than panicking the process.

#![deny(rust_2018_idioms)]

pub mod admin;
pub mod config;
pub mod context;
pub mod events;
pub mod ingress;
mod router;
pub mod scan_coordinator;
pub mod state;

use config::{Config, ScanPolicyConfig, ScannerConfig};
use events::EventSink;
use ingress::IngressFilter;
use promptgate_cache::ScanCache;
use promptgate_concurrency::ConcurrencyManager;
use promptgate_http::BackendClient;
use promptgate_scan::{AlwaysPass, ScanPipeline, ScanPolicy, SharedScanner};
use scan_coordinator::ScanCoordinator;
use state::AppState;
use std::sync::Arc;
use tracing::warn;

/// Soft per-scanner timeout. A stuck scanner fails its verdict (closed or
/// open per `block_on_scanner_error`) instead of pinning the request.
const SCAN_SOFT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

fn build_pipeline(configs: &[ScannerConfig], policy: ScanPolicyConfig, block_on_scanner_error: bool) -> ScanPipeline {
    let scanners: Vec<SharedScanner> = configs
        .iter()
        .filter_map(|c| match c.name.as_str() {
            "noop" => Some(Arc::new(AlwaysPass::new(c.name.clone())) as SharedScanner),
            other => {
                warn!(scanner = other, "no registered scanner with this name, skipping");
                None
            }
        })
        .collect();
    let policy = match policy {
        ScanPolicyConfig::RunAll => ScanPolicy::RunAll,
        ScanPolicyConfig::FailFast => ScanPolicy::FailFast,
    };
    ScanPipeline::new(scanners, policy)
        .with_scan_timeout(SCAN_SOFT_TIMEOUT)
        .with_block_on_scanner_error(block_on_scanner_error)
}

/// Builds the full `AppState` from a loaded `Config`, wiring the
/// concurrency manager, both scan coordinators, and the backend client.
/// `events` lets the binary plug in `events::TracingEventSink` and tests
/// plug in `events::RecordingEventSink`.
pub fn build_state(config: Config, events: Arc<dyn EventSink>) -> AppState {
    let ingress = IngressFilter::new(&config.allow_list);
    let concurrency = ConcurrencyManager::new(config.parallel_limit.into_manager_limit(), config.queue_limit);

    let input_pipeline = build_pipeline(&config.input_scanners, config.scan_policy, config.block_on_scanner_error);
    let output_pipeline = build_pipeline(&config.output_scanners, config.scan_policy, config.block_on_scanner_error);
    let cache_ttl = config.cache_ttl();
    let cache_max_entries = config.cache_max_entries;
    let input_scan = ScanCoordinator::new(input_pipeline, ScanCache::new(cache_max_entries, cache_ttl));
    let output_scan = ScanCoordinator::new(output_pipeline, ScanCache::new(cache_max_entries, cache_ttl));

    let backend = BackendClient::new(config.backend_url.clone());

    AppState::new(config, ingress, concurrency, input_scan, output_scan, backend, events)
}

/// Builds the `axum::Router`, ready for `.into_make_service_with_connect_info`.
pub fn build_router(state: AppState) -> axum::Router {
    router::build(state)
}

//! `ScanPipeline` runs an ordered set of scanners over a text under one of
//! two policies.

use crate::scanner::{ScanContext, SharedScanner};
use crate::verdict::{ScanReport, Verdict};
use std::time::Duration;
use tracing::{instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPolicy {
    /// Execute every scanner; aggregate passed/failed at the end.
    RunAll,
    /// Stop at the first failing verdict.
    FailFast,
}

/// Ordered scanners plus the policy that governs how they're run.
///
/// A pipeline with an empty scanner list is the identity pipeline: it
/// always returns `allowed=true` and does not consume cache capacity (the
/// caller is expected to special-case `is_identity()` to skip the cache
/// lookup entirely).
#[derive(Clone)]
pub struct ScanPipeline {
    scanners: Vec<SharedScanner>,
    policy: ScanPolicy,
    /// Per-scan soft timeout. `None` disables the timeout.
    scan_timeout: Option<Duration>,
    /// On timeout: fail closed (`passed=false, reason="scanner_timeout"`)
    /// if true, else fail open (treat the scanner as passing).
    block_on_scanner_error: bool,
}

impl ScanPipeline {
    pub fn new(scanners: Vec<SharedScanner>, policy: ScanPolicy) -> Self {
        Self {
            scanners,
            policy,
            scan_timeout: None,
            block_on_scanner_error: true,
        }
    }

    pub fn disabled() -> Self {
        Self::new(Vec::new(), ScanPolicy::RunAll)
    }

    pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = Some(timeout);
        self
    }

    pub fn with_block_on_scanner_error(mut self, block: bool) -> Self {
        self.block_on_scanner_error = block;
        self
    }

    pub fn is_identity(&self) -> bool {
        self.scanners.is_empty()
    }

    async fn run_one(&self, scanner: &SharedScanner, text: &str, ctx: &ScanContext<'_>) -> Verdict {
        let Some(timeout) = self.scan_timeout else {
            return scanner.scan(text, ctx).await;
        };
        match tokio::time::timeout(timeout, scanner.scan(text, ctx)).await {
            Ok(verdict) => verdict,
            Err(_) => {
                warn!(scanner = scanner.name(), "scanner exceeded soft timeout");
                if self.block_on_scanner_error {
                    Verdict::failing(scanner.name(), 1.0, "scanner_timeout")
                } else {
                    Verdict::passing(scanner.name())
                }
            }
        }
    }

    /// Run the pipeline over `text`. This is the uncached primitive;
    /// callers that want memoization wrap this behind
    /// `ScanCache::get_or_compute` keyed by `fingerprint(text)`.
    #[instrument(skip(self, text, ctx), fields(scanners = self.scanners.len(), policy = ?self.policy))]
    pub async fn scan(&self, text: &str, ctx: &ScanContext<'_>) -> ScanReport {
        if self.is_identity() {
            return ScanReport::allow_all();
        }

        let mut passed = Vec::new();
        let mut failed = Vec::new();

        match self.policy {
            ScanPolicy::FailFast => {
                for scanner in &self.scanners {
                    let verdict = self.run_one(scanner, text, ctx).await;
                    if verdict.passed {
                        passed.push(verdict);
                    } else {
                        failed.push(verdict);
                        break;
                    }
                }
            }
            ScanPolicy::RunAll => {
                for scanner in &self.scanners {
                    let verdict = self.run_one(scanner, text, ctx).await;
                    if verdict.passed {
                        passed.push(verdict);
                    } else {
                        failed.push(verdict);
                    }
                }
            }
        }

        ScanReport {
            allowed: failed.is_empty(),
            passed,
            failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::Lang;
    use crate::scanner::{AlwaysFail, AlwaysPass};
    use std::sync::Arc;

    fn ctx() -> ScanContext<'static> {
        ScanContext {
            request_id: "req-test",
            client_id: "127.0.0.1",
            language: Lang::En,
            model: "m",
        }
    }

    #[tokio::test]
    async fn identity_pipeline_allows_everything() {
        let pipeline = ScanPipeline::disabled();
        let report = pipeline.scan("anything", &ctx()).await;
        assert!(report.allowed);
        assert!(report.failed.is_empty());
        assert!(report.passed.is_empty());
    }

    #[tokio::test]
    async fn fail_fast_stops_at_first_failure() {
        let scanners: Vec<SharedScanner> = vec![
            Arc::new(AlwaysPass::new("A")),
            Arc::new(AlwaysFail::new("B", 0.9, "bad")),
            Arc::new(AlwaysFail::new("C", 0.9, "also bad")),
        ];
        let pipeline = ScanPipeline::new(scanners, ScanPolicy::FailFast);
        let report = pipeline.scan("x", &ctx()).await;
        assert!(!report.allowed);
        assert_eq!(report.passed.len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].scanner_name, "B");
    }

    #[tokio::test]
    async fn run_all_collects_every_verdict() {
        let scanners: Vec<SharedScanner> = vec![
            Arc::new(AlwaysPass::new("A")),
            Arc::new(AlwaysFail::new("B", 0.9, "bad")),
            Arc::new(AlwaysFail::new("C", 0.5, "also bad")),
        ];
        let pipeline = ScanPipeline::new(scanners, ScanPolicy::RunAll);
        let report = pipeline.scan("x", &ctx()).await;
        assert!(!report.allowed);
        assert_eq!(report.passed.len(), 1);
        assert_eq!(report.failed.len(), 2);
    }

    #[tokio::test]
    async fn deterministic_failure_blocks_every_call() {
        let scanners: Vec<SharedScanner> = vec![Arc::new(AlwaysFail::new("B", 1.0, "bad"))];
        let pipeline = ScanPipeline::new(scanners, ScanPolicy::RunAll);
        for _ in 0..10 {
            let report = pipeline.scan("x", &ctx()).await;
            assert!(!report.allowed);
            assert_eq!(report.failed.len(), 1);
        }
    }

    struct SlowScanner;

    #[async_trait::async_trait]
    impl crate::scanner::Scanner for SlowScanner {
        fn name(&self) -> &str {
            "Slow"
        }
        async fn scan(&self, _text: &str, _ctx: &ScanContext<'_>) -> Verdict {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Verdict::passing("Slow")
        }
    }

    #[tokio::test]
    async fn scanner_timeout_fails_closed_by_default() {
        let scanners: Vec<SharedScanner> = vec![Arc::new(SlowScanner)];
        let pipeline = ScanPipeline::new(scanners, ScanPolicy::RunAll)
            .with_scan_timeout(Duration::from_millis(1));
        let report = pipeline.scan("x", &ctx()).await;
        assert!(!report.allowed);
        assert_eq!(report.failed[0].reason, "scanner_timeout");
    }

    #[tokio::test]
    async fn scanner_timeout_fails_open_when_configured() {
        let scanners: Vec<SharedScanner> = vec![Arc::new(SlowScanner)];
        let pipeline = ScanPipeline::new(scanners, ScanPolicy::RunAll)
            .with_scan_timeout(Duration::from_millis(1))
            .with_block_on_scanner_error(false);
        let report = pipeline.scan("x", &ctx()).await;
        assert!(report.allowed);
    }
}

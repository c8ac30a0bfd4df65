//! The Scanner contract. A tagged trait object is enough here; no
//! inheritance hierarchy.

use crate::lang::Lang;
use crate::verdict::Verdict;
use async_trait::async_trait;
use std::sync::Arc;

/// Per-request identity handed to every scanner alongside the text, so an
/// implementation can be language-, model-, or client-aware. A narrow
/// borrow struct rather than a reuse of any HTTP-layer request type; this
/// crate sits below the HTTP layer in the dependency graph.
#[derive(Debug, Clone, Copy)]
pub struct ScanContext<'a> {
    pub request_id: &'a str,
    pub client_id: &'a str,
    pub language: Lang,
    pub model: &'a str,
}

/// A named check over text. Implementations may be slow (ML inference) but
/// must be pure per call and hold no mutable state across calls: the
/// pipeline may run the same scanner concurrently for different requests.
#[async_trait]
pub trait Scanner: Send + Sync {
    fn name(&self) -> &str;

    async fn scan(&self, text: &str, ctx: &ScanContext<'_>) -> Verdict;
}

pub type SharedScanner = Arc<dyn Scanner>;

/// A scanner that always passes. Useful as a default/disabled-check
/// placeholder and in tests.
pub struct AlwaysPass {
    name: String,
}

impl AlwaysPass {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Scanner for AlwaysPass {
    fn name(&self) -> &str {
        &self.name
    }

    async fn scan(&self, _text: &str, _ctx: &ScanContext<'_>) -> Verdict {
        Verdict::passing(self.name.clone())
    }
}

/// A scanner that always fails, with a fixed reason and risk score. Used in
/// tests to exercise block paths.
pub struct AlwaysFail {
    name: String,
    risk_score: f64,
    reason: String,
}

impl AlwaysFail {
    pub fn new(name: impl Into<String>, risk_score: f64, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            risk_score,
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Scanner for AlwaysFail {
    fn name(&self) -> &str {
        &self.name
    }

    async fn scan(&self, _text: &str, _ctx: &ScanContext<'_>) -> Verdict {
        Verdict::failing(self.name.clone(), self.risk_score, self.reason.clone())
    }
}

//! `RequestContext`: created on ingress, read by every downstream
//! component, destroyed on response completion or cancellation.

use promptgate_http::WireFormat;
use promptgate_scan::Lang;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// A per-request identifier, attached to every tracing span and event so
/// a request's full path through the system can be correlated in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything downstream components need to know about one in-flight
/// request. Owned by the router; borrowed read-only everywhere else.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: RequestId,
    pub client_id: String,
    pub language: Lang,
    pub model: String,
    pub wire_format: WireFormat,
    pub stream: bool,
    pub deadline: Instant,
    pub cancellation: CancellationToken,
}

impl RequestContext {
    pub fn new(
        client_id: impl Into<String>,
        model: impl Into<String>,
        wire_format: WireFormat,
        stream: bool,
        timeout: Duration,
    ) -> Self {
        Self {
            request_id: RequestId::new(),
            client_id: client_id.into(),
            language: Lang::En,
            model: model.into(),
            wire_format,
            stream,
            deadline: Instant::now() + timeout,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_language(mut self, language: Lang) -> Self {
        self.language = language;
        self
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

//! `EventSink`: the interface every component fans decisions and timings
//! out to. The core only depends on the trait; `TracingEventSink` is the
//! production implementation, `RecordingEventSink` is an in-memory fake
//! for tests that want to assert on what was emitted.

use crate::context::RequestId;
use std::sync::Mutex;
use tracing::info;

/// The outcome of one request, for logging and for admin audit events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    BlockedInput,
    BlockedOutput,
    ServerBusy,
    Timeout,
    UpstreamError,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Ok => "ok",
            Outcome::BlockedInput => "blocked_input",
            Outcome::BlockedOutput => "blocked_output",
            Outcome::ServerBusy => "server_busy",
            Outcome::Timeout => "timeout",
            Outcome::UpstreamError => "upstream_error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequestCompleted {
    pub request_id: RequestId,
    pub model: String,
    pub outcome: Outcome,
    pub wait_ms: f64,
    pub process_ms: f64,
}

#[derive(Debug, Clone)]
pub struct AdminMutation {
    pub request_id: RequestId,
    pub action: String,
    pub detail: String,
}

/// The event fan-out surface. Implementations must not block the request
/// path meaningfully; `TracingEventSink` just emits a structured event.
pub trait EventSink: Send + Sync {
    fn request_completed(&self, event: RequestCompleted);
    fn admin_mutation(&self, event: AdminMutation);
}

pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn request_completed(&self, event: RequestCompleted) {
        info!(
            request_id = %event.request_id,
            model = %event.model,
            outcome = event.outcome.as_str(),
            wait_ms = event.wait_ms,
            process_ms = event.process_ms,
            "promptgate.request.completed"
        );
    }

    fn admin_mutation(&self, event: AdminMutation) {
        info!(
            request_id = %event.request_id,
            action = %event.action,
            detail = %event.detail,
            "promptgate.admin.mutation"
        );
    }
}

/// An in-memory sink for tests: records every event it receives so
/// assertions can inspect outcomes without parsing log output.
#[derive(Default)]
pub struct RecordingEventSink {
    requests: Mutex<Vec<RequestCompleted>>,
    admin: Mutex<Vec<AdminMutation>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<RequestCompleted> {
        self.requests.lock().expect("sink mutex poisoned").clone()
    }

    pub fn admin_mutations(&self) -> Vec<AdminMutation> {
        self.admin.lock().expect("sink mutex poisoned").clone()
    }
}

impl EventSink for RecordingEventSink {
    fn request_completed(&self, event: RequestCompleted) {
        self.requests.lock().expect("sink mutex poisoned").push(event);
    }

    fn admin_mutation(&self, event: AdminMutation) {
        self.admin.lock().expect("sink mutex poisoned").push(event);
    }
}

#![deny(rust_2018_idioms)]

//! The error taxonomy shared by every `promptgate` crate.
//!
//! Components never construct ad-hoc error strings for anything that can
//! reach a client: they return an [`ErrorKind`], and the HTTP layer (in
//! `promptgate-app`) is the only place that turns a kind into a status code
//! and a localized envelope.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The fixed error taxonomy. Adding a variant here is a breaking change for
/// every downstream catalog lookup, so the set is closed deliberately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AccessDenied,
    ServerBusy,
    RequestTimeout,
    PromptBlocked,
    ResponseBlocked,
    UpstreamError,
    ScannerError,
    BadRequest,
    InternalError,
}

impl ErrorKind {
    /// The catalog key used by `promptgate-scan::catalog`. Kept distinct
    /// from `Display` so the wire string and the log string can diverge
    /// later without touching the catalog.
    pub fn catalog_key(&self) -> &'static str {
        match self {
            ErrorKind::AccessDenied => "access_denied",
            ErrorKind::ServerBusy => "server_busy",
            ErrorKind::RequestTimeout => "request_timeout",
            ErrorKind::PromptBlocked => "prompt_blocked",
            ErrorKind::ResponseBlocked => "response_blocked",
            ErrorKind::UpstreamError => "upstream_error",
            ErrorKind::ScannerError => "scanner_error",
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::InternalError => "internal_error",
        }
    }

    /// The HTTP status a non-streaming response uses for this kind, per
    /// the blocked-response envelope table.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorKind::AccessDenied => 403,
            ErrorKind::ServerBusy => 503,
            ErrorKind::RequestTimeout => 504,
            ErrorKind::PromptBlocked | ErrorKind::ResponseBlocked | ErrorKind::BadRequest => 400,
            ErrorKind::UpstreamError => 502,
            ErrorKind::ScannerError | ErrorKind::InternalError => 500,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.catalog_key())
    }
}

/// A typed error carrying a kind plus enough context to log and to render a
/// localized message. `reason` is the scanner-facing detail (e.g. a
/// scanner name and its verdict reason); it is never shown to a client
/// unless the kind's message template asks for it via `{reason}`.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {reason}")]
pub struct ProxyError {
    pub kind: ErrorKind,
    pub reason: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl ProxyError {
    pub fn new(kind: ErrorKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
            source: None,
        }
    }

    pub fn with_source(
        kind: ErrorKind,
        reason: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            reason: reason.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn access_denied(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::AccessDenied, reason)
    }

    pub fn server_busy(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::ServerBusy, reason)
    }

    pub fn request_timeout(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::RequestTimeout, reason)
    }

    pub fn upstream_error(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::UpstreamError, reason)
    }

    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, reason)
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalError, reason)
    }
}

// The source chain is not carried across a clone: cloning exists so one
// error can be fanned out to every waiter sharing a single in-flight
// computation, and a `dyn Error` source cannot be duplicated.
impl Clone for ProxyError {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            reason: self.reason.clone(),
            source: None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;

/// The generic mapping from a `ProxyError` to an HTTP response, for
/// handlers that propagate with `?` and don't need the full localized,
/// scanner-detail envelope (that richer envelope is built explicitly by
/// the router for block/admission-reject paths, which have a detected
/// language and a `ScanReport` on hand).
impl axum::response::IntoResponse for ProxyError {
    fn into_response(self) -> axum::response::Response {
        let status = axum::http::StatusCode::from_u16(self.kind.http_status())
            .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::json!({
            "error": self.kind.catalog_key(),
            "message": self.reason,
            "language": "en",
        });
        (status, axum::Json(body)).into_response()
    }
}

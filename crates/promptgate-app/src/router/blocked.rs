//! The blocked-response envelope, shared by every rejection path (input
//! block, output block, admission reject, access denied).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use promptgate_error::ErrorKind;
use promptgate_scan::{Lang, ScanReport};
use serde_json::json;

pub fn envelope(kind: ErrorKind, message: &str, language: Lang, report: &ScanReport) -> serde_json::Value {
    let scanners: serde_json::Map<String, serde_json::Value> = report
        .passed
        .iter()
        .chain(report.failed.iter())
        .map(|v| {
            (
                v.scanner_name.clone(),
                json!({ "passed": v.passed, "risk_score": v.risk_score, "reason": v.reason }),
            )
        })
        .collect();
    json!({
        "error": kind.catalog_key(),
        "message": message,
        "language": language.tag(),
        "scanners": scanners,
        "failed_scanners": report.failed_scanner_names(),
    })
}

pub fn response(kind: ErrorKind, message: &str, language: Lang, report: &ScanReport) -> Response {
    let status = StatusCode::from_u16(kind.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(envelope(kind, message, language, report))).into_response()
}

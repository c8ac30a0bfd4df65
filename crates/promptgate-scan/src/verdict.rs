//! `Verdict` and `ScanReport` value types.

use serde::Serialize;

/// The immutable result of one scanner on one text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub scanner_name: String,
    pub passed: bool,
    pub risk_score: f64,
    pub reason: String,
}

impl Verdict {
    pub fn passing(scanner_name: impl Into<String>) -> Self {
        Self {
            scanner_name: scanner_name.into(),
            passed: true,
            risk_score: 0.0,
            reason: String::new(),
        }
    }

    pub fn failing(
        scanner_name: impl Into<String>,
        risk_score: f64,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            scanner_name: scanner_name.into(),
            passed: false,
            risk_score: risk_score.clamp(0.0, 1.0),
            reason: reason.into(),
        }
    }
}

/// The aggregate of verdicts over a scan pipeline invocation.
///
/// Invariant: `allowed == failed.is_empty()`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    pub allowed: bool,
    pub passed: Vec<Verdict>,
    pub failed: Vec<Verdict>,
}

impl ScanReport {
    /// The identity report: no scanners ran, nothing failed.
    pub fn allow_all() -> Self {
        Self {
            allowed: true,
            passed: Vec::new(),
            failed: Vec::new(),
        }
    }

    /// A human-readable `"Scanner: reason"` joined summary of `failed`,
    /// suitable for the catalog's `{reason}` placeholder.
    pub fn failure_summary(&self) -> String {
        self.failed
            .iter()
            .map(|v| format!("{}: {}", v.scanner_name, v.reason))
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn failed_scanner_names(&self) -> Vec<String> {
        self.failed.iter().map(|v| v.scanner_name.clone()).collect()
    }
}

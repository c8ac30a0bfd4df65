#![deny(rust_2018_idioms)]

//! Scanner contract, pipeline, language detection, and the error message
//! catalog.

pub mod catalog;
pub mod fingerprint;
pub mod lang;
pub mod pipeline;
pub mod scanner;
pub mod verdict;

pub use catalog::ErrorCatalog;
pub use fingerprint::{fingerprint, Fingerprint};
pub use lang::{detect, Lang};
pub use pipeline::{ScanPipeline, ScanPolicy};
pub use scanner::{AlwaysFail, AlwaysPass, ScanContext, Scanner, SharedScanner};
pub use verdict::{ScanReport, Verdict};

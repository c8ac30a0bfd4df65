//! The recognized configuration surface. Loading (file format, env
//! overlay) is a thin `figment` wrapper; the file-format grammar itself
//! is someone else's concern, but the typed struct, its defaults, and the
//! override precedence are part of this crate so the binary is runnable
//! on its own.

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

fn default_listen_host() -> String {
    "0.0.0.0".to_string()
}

fn default_listen_port() -> u16 {
    11434
}

fn default_backend_url() -> String {
    "http://127.0.0.1:11435".to_string()
}

fn default_scan_policy() -> ScanPolicyConfig {
    ScanPolicyConfig::FailFast
}

fn default_parallel_limit() -> ParallelLimitConfig {
    ParallelLimitConfig::Auto
}

fn default_queue_limit() -> usize {
    16
}

fn default_request_timeout_sec() -> u64 {
    300
}

fn default_cache_ttl_sec() -> u64 {
    600
}

fn default_cache_max_entries() -> usize {
    10_000
}

fn default_stream_scan_bytes() -> usize {
    256
}

fn default_stream_scan_ms() -> u64 {
    500
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPolicyConfig {
    RunAll,
    FailFast,
}

/// Either a fixed slot count or `"auto"`, matching the wire-level string
/// `int | "auto"` from the configuration surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParallelLimitConfig {
    Fixed(usize),
    Auto,
}

impl ParallelLimitConfig {
    pub fn into_manager_limit(self) -> promptgate_concurrency::ParallelLimit {
        match self {
            ParallelLimitConfig::Fixed(n) => promptgate_concurrency::ParallelLimit::Fixed(n),
            ParallelLimitConfig::Auto => promptgate_concurrency::ParallelLimit::Auto,
        }
    }
}

impl std::fmt::Display for ParallelLimitConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParallelLimitConfig::Fixed(n) => write!(f, "{n}"),
            ParallelLimitConfig::Auto => write!(f, "auto"),
        }
    }
}

/// One entry of `input_scanners`/`output_scanners`: a scanner name plus
/// opaque per-scanner parameters (the scanner registry, out of scope
/// here, interprets `params`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    pub name: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_backend_url")]
    pub backend_url: String,
    #[serde(default = "default_listen_host")]
    pub listen_host: String,
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    #[serde(default)]
    pub allow_list: Vec<String>,
    #[serde(default = "default_true")]
    pub input_guard_enabled: bool,
    #[serde(default = "default_true")]
    pub output_guard_enabled: bool,
    #[serde(default)]
    pub input_scanners: Vec<ScannerConfig>,
    #[serde(default)]
    pub output_scanners: Vec<ScannerConfig>,
    #[serde(default = "default_scan_policy")]
    pub scan_policy: ScanPolicyConfig,
    #[serde(default = "default_true")]
    pub block_on_scanner_error: bool,
    #[serde(default = "default_parallel_limit")]
    pub parallel_limit: ParallelLimitConfig,
    #[serde(default = "default_queue_limit")]
    pub queue_limit: usize,
    #[serde(default = "default_request_timeout_sec")]
    pub request_timeout_sec: u64,
    #[serde(default)]
    pub cache_backend: CacheBackendOption,
    #[serde(default = "default_cache_ttl_sec")]
    pub cache_ttl_sec: u64,
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,
    #[serde(default = "default_stream_scan_bytes")]
    pub stream_scan_bytes: usize,
    #[serde(default = "default_stream_scan_ms")]
    pub stream_scan_ms: u64,
    #[serde(default = "default_true")]
    pub language_detection_enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackendOption {
    #[default]
    Memory,
    External,
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            listen_host: default_listen_host(),
            listen_port: default_listen_port(),
            allow_list: Vec::new(),
            input_guard_enabled: true,
            output_guard_enabled: true,
            input_scanners: Vec::new(),
            output_scanners: Vec::new(),
            scan_policy: default_scan_policy(),
            block_on_scanner_error: true,
            parallel_limit: default_parallel_limit(),
            queue_limit: default_queue_limit(),
            request_timeout_sec: default_request_timeout_sec(),
            cache_backend: CacheBackendOption::Memory,
            cache_ttl_sec: default_cache_ttl_sec(),
            cache_max_entries: default_cache_max_entries(),
            stream_scan_bytes: default_stream_scan_bytes(),
            stream_scan_ms: default_stream_scan_ms(),
            language_detection_enabled: true,
        }
    }
}

impl Config {
    /// Layers, lowest precedence first: compiled-in defaults, an optional
    /// TOML file, then `PROMPTGATE_*` environment variables. Any layer may
    /// be partial; missing fields fall through to the layer below.
    pub fn load(toml_path: Option<&str>) -> Result<Self, figment::Error> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));
        if let Some(path) = toml_path {
            figment = figment.merge(Toml::file(path));
        }
        figment = figment.merge(Env::prefixed("PROMPTGATE_").split("__"));
        figment.extract()
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_sec)
    }

    pub fn cache_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cache_ttl_sec)
    }

    pub fn stream_scan_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.stream_scan_ms)
    }
}

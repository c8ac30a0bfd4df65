//! Auto-sizing of the default parallel limit, and the host memory summary
//! served by the admin surface's queue/memory endpoint.

use serde::Serialize;
use std::sync::OnceLock;
use sysinfo::System;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct HostMemory {
    pub total_bytes: u64,
    pub available_bytes: u64,
    pub auto_parallel_limit: usize,
}

/// A hint, not a guarantee: derived from available memory the first time
/// it's needed and never revisited, so every `"auto"` queue in the process
/// resolves to the same limit.
pub fn auto_parallel_limit() -> usize {
    static LIMIT: OnceLock<usize> = OnceLock::new();
    *LIMIT.get_or_init(|| {
        let available_gb = available_memory_bytes() as f64 / (1024.0 * 1024.0 * 1024.0);
        if available_gb >= 16.0 {
            4
        } else if available_gb >= 8.0 {
            2
        } else {
            1
        }
    })
}

pub fn host_memory() -> HostMemory {
    let mut system = System::new();
    system.refresh_memory();
    let total_bytes = system.total_memory();
    let available_bytes = system.available_memory();
    HostMemory {
        total_bytes,
        available_bytes,
        auto_parallel_limit: auto_parallel_limit(),
    }
}

fn available_memory_bytes() -> u64 {
    let mut system = System::new();
    system.refresh_memory();
    system.available_memory()
}

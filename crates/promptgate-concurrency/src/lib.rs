//! Per-model admission control: a bounded queue feeding a bounded pool of
//! parallel slots, with stats suitable for serving back over the admin
//! surface.

#![deny(rust_2018_idioms)]

mod autosize;
mod manager;
mod queue;
mod ticket;

pub use autosize::{auto_parallel_limit, host_memory, HostMemory};
pub use manager::{ConcurrencyManager, ParallelLimit};
pub use queue::ModelQueueStats;
pub use ticket::{AdmissionTicket, Cancelled, RejectedFull, SlotGuard};

//! Bulk history synchronization for the explorer.
//!
//! Keeps the durable store's confirmed history complete:
//!
//! - **Driver**: walks a block range in bulk windows, forking oversized
//!   workloads into parallel tasks and following the tip when open-ended
//! - **Verification**: checks every stored window for completeness and
//!   refetches missing identifiers with a bounded, backed-off retry budget
//!
//! Chain forks surface here as verification failures: a window whose
//! identifiers can no longer all be served is redone from scratch against
//! fresh connections, which re-pulls the surviving branch of the history.

pub mod config;
pub mod driver;
pub mod verify;

pub use driver::{SyncConfig, SyncDriver};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("{count} identifiers still missing after verification retries", count = .missing.len())]
    RangeIncomplete { missing: Vec<u64> },
    #[error("sync task {task_id} exhausted its restarts")]
    TaskExhausted { task_id: u32 },
    #[error(transparent)]
    Store(#[from] store::StoreError),
}

#[cfg(test)]
mod tests;

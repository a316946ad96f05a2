//! Sync driver operational constants: window sizes, ceilings, and intervals.

use std::time::Duration;

/// Blocks requested per bulk window.
pub const BULK_FETCH_LIMIT: u64 = 100;

/// Errors a sync task tolerates before redoing its current window from
/// scratch with fresh connections.
pub const MAX_TASK_ERRORS: u32 = 60;

/// Remaining workload above which a task splits and forks the head range.
pub const DEFAULT_MAX_WORKLOAD: u64 = 100_000;

/// Full-task redo attempts before a task gives up for good.
pub const MAX_TASK_RESTARTS: u32 = 16;

/// Spacing of tip polls while an open-ended task is caught up.
pub const TIP_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Consecutive idle samples before an open-ended, caught-up task finishes.
pub const QUIESCENT_SAMPLES: u32 = 3;

/// Base delay of the verification/restart backoff; doubles per round.
pub const BACKOFF_BASE: Duration = Duration::from_millis(200);

/// Ceiling of the verification/restart backoff.
pub const BACKOFF_CAP: Duration = Duration::from_secs(5);

/// Bounded exponential backoff delay for retry round `round`.
pub fn backoff_delay(round: u32) -> Duration {
    let exp = round.min(16);
    BACKOFF_CAP.min(BACKOFF_BASE * 2u32.saturating_pow(exp))
}

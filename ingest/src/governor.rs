//! Concurrency governor: process-wide accounting of in-flight fetch branches.
//!
//! Forked branches can themselves re-fork on retry, so no single branch ever
//! knows when all of its descendants have finished. The only trustworthy
//! completion signal is a global in-flight count that stays idle across
//! several consecutive samples; [`Governor::wait_quiescent`] implements that
//! sampling loop, [`QuiescenceSampler`] the decision rule it uses.
//!
//! The governor is an injectable service: clone it into every branch, never
//! reach for a global. Each fan-out domain owns its own governor; an idle
//! count is only meaningful among branches of the same task family.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Default spacing between quiescence samples.
pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(3);

/// Consecutive idle samples required before declaring quiescence.
pub const SAMPLES_NEEDED: u32 = 3;

#[derive(Clone, Debug, Default)]
pub struct Governor {
    in_flight: Arc<AtomicUsize>,
}

impl Governor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one in-flight branch. The returned guard releases on drop,
    /// so release fires on every exit path including early retry-forks.
    pub fn enter(&self) -> WorkerGuard {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        WorkerGuard {
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    pub fn current_load(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Sample the load at fixed intervals until it has been idle for
    /// `samples_needed` consecutive observations.
    ///
    /// "Idle" is `load <= 1`: the waiting caller is expected to hold its own
    /// guard while sampling, so a load of one means nobody else is active.
    pub async fn wait_quiescent(&self, interval: Duration, samples_needed: u32) {
        let mut sampler = QuiescenceSampler::new(samples_needed);
        loop {
            if sampler.observe(self.current_load()) {
                return;
            }
            tokio::time::sleep(interval).await;
        }
    }
}

pub struct WorkerGuard {
    in_flight: Arc<AtomicUsize>,
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// The quiescence decision rule, separated out so it can be driven by any
/// load source (the governor's sampling loop, the sync driver's tip-catch-up
/// loop, tests feeding synthetic sequences).
#[derive(Clone, Copy, Debug)]
pub struct QuiescenceSampler {
    needed: u32,
    consecutive_idle: u32,
}

impl QuiescenceSampler {
    pub fn new(needed: u32) -> Self {
        Self {
            needed,
            consecutive_idle: 0,
        }
    }

    /// Feed one load observation; returns true once `needed` consecutive
    /// observations were idle. Any busy observation resets the streak.
    pub fn observe(&mut self, load: usize) -> bool {
        if load <= 1 {
            self.consecutive_idle += 1;
        } else {
            self.consecutive_idle = 0;
        }
        self.consecutive_idle >= self.needed
    }

    pub fn reset(&mut self) {
        self.consecutive_idle = 0;
    }
}

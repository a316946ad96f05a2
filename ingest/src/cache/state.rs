//! Frontier counters for the block cache.

use std::sync::atomic::{AtomicU64, Ordering};

/// The four frontier watermarks, each monotonically non-decreasing.
///
/// At quiescent observation points:
/// `cached_confirmed_max <= live_confirmed_max <= live_unconfirmed_max` and
/// `cached_confirmed_max <= cached_unconfirmed_max`. Concurrent updates may
/// violate this transiently; the next refresh pass corrects it.
#[derive(Debug, Default)]
pub struct BufferState {
    live_unconfirmed_max: AtomicU64,
    live_confirmed_max: AtomicU64,
    cached_unconfirmed_max: AtomicU64,
    cached_confirmed_max: AtomicU64,
}

impl BufferState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live_unconfirmed_max(&self) -> u64 {
        self.live_unconfirmed_max.load(Ordering::Acquire)
    }

    pub fn live_confirmed_max(&self) -> u64 {
        self.live_confirmed_max.load(Ordering::Acquire)
    }

    pub fn cached_unconfirmed_max(&self) -> u64 {
        self.cached_unconfirmed_max.load(Ordering::Acquire)
    }

    pub fn cached_confirmed_max(&self) -> u64 {
        self.cached_confirmed_max.load(Ordering::Acquire)
    }

    pub fn advance_live_unconfirmed(&self, number: u64) {
        self.live_unconfirmed_max.fetch_max(number, Ordering::AcqRel);
    }

    pub fn advance_live_confirmed(&self, number: u64) {
        self.live_confirmed_max.fetch_max(number, Ordering::AcqRel);
    }

    pub fn advance_cached_unconfirmed(&self, number: u64) {
        self.cached_unconfirmed_max.fetch_max(number, Ordering::AcqRel);
    }

    pub fn advance_cached_confirmed(&self, number: u64) {
        self.cached_confirmed_max.fetch_max(number, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watermarks_never_regress() {
        let state = BufferState::new();
        state.advance_cached_confirmed(100);
        state.advance_cached_confirmed(40);
        assert_eq!(state.cached_confirmed_max(), 100);

        state.advance_live_unconfirmed(105);
        state.advance_live_unconfirmed(104);
        assert_eq!(state.live_unconfirmed_max(), 105);
    }
}

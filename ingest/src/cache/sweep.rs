//! Eviction sweep: hot tier -> warm tier.

use super::BlockCache;
use store::{block_key, StoreError};
use tracing::{debug, warn};

impl BlockCache {
    /// One eviction pass.
    ///
    /// Removes every hot entry at or below
    /// `cached_confirmed_max - retention_window` (and its entry in the
    /// unconfirmed index) and writes the batch into the warm tier with the
    /// configured TTL. Returns the number of blocks evicted.
    pub async fn sweep_once(&self) -> Result<usize, StoreError> {
        let confirmed_max = self.state.cached_confirmed_max();
        let min_retained = confirmed_max.saturating_sub(self.config.retention_window);
        if min_retained == 0 {
            return Ok(0);
        }

        let mut evicted = Vec::new();
        self.hot.retain(|number, block| {
            if *number <= min_retained {
                evicted.push(block.clone());
                false
            } else {
                true
            }
        });
        if evicted.is_empty() {
            return Ok(0);
        }

        let mut pairs = Vec::with_capacity(evicted.len());
        for block in &evicted {
            self.unconfirmed.remove(&block.number);
            match serde_json::to_string(block) {
                Ok(json) => pairs.push((block_key(block.number), json)),
                Err(err) => warn!(number = block.number, %err, "failed to serialize evicted block"),
            }
        }
        self.warm.mset(pairs, self.config.warm_ttl).await?;

        self.metrics.add_swept_blocks(evicted.len() as u64);
        self.metrics.set_hot_blocks(self.hot.len() as i64);
        debug!(
            swept = evicted.len(),
            min_retained,
            remaining = self.hot.len(),
            "swept hot tier into warm tier"
        );
        Ok(evicted.len())
    }
}

//! Storage seams for the explorer engine.
//!
//! The engine treats both durable storage (relational rows, the cold tier)
//! and the TTL key-value store (the warm tier) as external collaborators.
//! This crate defines the two seams plus in-memory reference implementations
//! used by tests and the demo binary.

pub mod memory;

use async_trait::async_trait;
use records::{AccountRecord, BlockRecord};
use std::time::Duration;
use thiserror::Error;

pub use memory::{MemoryStore, MemoryWarmCache};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("transaction commit failed: {0}")]
    CommitFailed(String),
    #[error("bad stored value: {0}")]
    BadValue(#[from] serde_json::Error),
}

/// Filter for block queries, covering the two shapes the engine issues:
/// everything above a watermark, or an explicit id list.
#[derive(Clone, Debug, Default)]
pub struct BlockFilter {
    /// Only rows with `block_id > after`.
    pub after: Option<u64>,
    /// Only rows whose `block_id` is in this set.
    pub numbers: Option<Vec<u64>>,
}

impl BlockFilter {
    pub fn after(watermark: u64) -> Self {
        BlockFilter {
            after: Some(watermark),
            ..Default::default()
        }
    }

    pub fn numbers(numbers: Vec<u64>) -> Self {
        BlockFilter {
            numbers: Some(numbers),
            ..Default::default()
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryOrder {
    Ascending,
    Descending,
}

/// The cold tier: durable, row-oriented storage of confirmed history.
///
/// Batch writes run as one transaction: individual row errors are tolerated
/// (logged by the implementation, batch continues) but a failed commit fails
/// the whole batch.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn query_blocks(
        &self,
        filter: BlockFilter,
        order: QueryOrder,
        limit: Option<usize>,
    ) -> Result<Vec<BlockRecord>, StoreError>;

    /// Upsert a batch of blocks, returning the ids actually stored.
    async fn upsert_blocks(&self, blocks: &[BlockRecord]) -> Result<Vec<u64>, StoreError>;

    async fn max_block_id(&self) -> Result<u64, StoreError>;

    /// Upsert accounts together with their asset-balance and vote rows; the
    /// dependent rows are replaced wholesale per address. Returns the number
    /// of accounts stored.
    async fn upsert_accounts(&self, accounts: &[AccountRecord]) -> Result<usize, StoreError>;
}

/// The warm tier: a TTL key-value store holding recently evicted blocks.
#[async_trait]
pub trait WarmCache: Send + Sync {
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError>;
    async fn mset(&self, pairs: Vec<(String, String)>, ttl: Duration) -> Result<(), StoreError>;
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError>;
}

/// Warm-tier key for a block.
pub fn block_key(number: u64) -> String {
    format!("block:{number}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_keys_are_stable() {
        assert_eq!(block_key(0), "block:0");
        assert_eq!(block_key(1_234_567), "block:1234567");
    }
}

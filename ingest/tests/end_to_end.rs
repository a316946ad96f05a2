//! Full-pipeline scenario: bulk sync into the durable store, confirmed and
//! unconfirmed refresh into the hot tier, eviction into the warm tier, and
//! tiered read-through over the result.

use async_trait::async_trait;
use ingest::cache::{BlockCache, CacheConfig, StaticProducerDirectory};
use ingest::{ClientError, ClientHandle, ClientPool, NodeClient, NodeRole, SyncConfig, SyncDriver};
use ingest::Governor;
use metrics::Metrics;
use records::{AccountRecord, Address, BlockRecord, NetUsage, TipInfo};
use std::sync::Arc;
use store::{block_key, MemoryStore, MemoryWarmCache};

/// One view of the simulated chain: serves `1..=tip` and reports `tip`.
struct ViewNode {
    name: String,
    tip: u64,
}

impl ViewNode {
    fn new(name: &str, tip: u64) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            tip,
        })
    }

    fn block(&self, number: u64) -> BlockRecord {
        BlockRecord {
            number,
            hash: format!("{number:016x}"),
            parent_hash: format!("{:016x}", number.saturating_sub(1)),
            size: 900,
            created_at: number as i64 * 3_000,
            tx_count: 1,
            ..Default::default()
        }
    }
}

#[async_trait]
impl NodeClient for ViewNode {
    fn endpoint(&self) -> &str {
        &self.name
    }

    async fn fetch_account(&self, _address: &Address) -> Result<AccountRecord, ClientError> {
        Err(ClientError::NotFound {
            endpoint: self.name.clone(),
        })
    }

    async fn fetch_account_net(&self, _address: &Address) -> Result<NetUsage, ClientError> {
        Err(ClientError::NotFound {
            endpoint: self.name.clone(),
        })
    }

    async fn fetch_block_by_number(&self, number: u64) -> Result<BlockRecord, ClientError> {
        if number == 0 || number > self.tip {
            return Err(ClientError::NotFound {
                endpoint: self.name.clone(),
            });
        }
        Ok(self.block(number))
    }

    async fn fetch_block_range(&self, start: u64, end: u64) -> Result<Vec<BlockRecord>, ClientError> {
        Ok((start..end)
            .filter(|n| *n >= 1 && *n <= self.tip)
            .map(|n| self.block(n))
            .collect())
    }

    async fn fetch_tip_info(&self) -> Result<TipInfo, ClientError> {
        Ok(TipInfo {
            number: self.tip,
            observed_at: 0,
        })
    }
}

struct Fleet {
    solid: ClientHandle,
    latest: ClientHandle,
    raw: ClientHandle,
}

impl ClientPool for Fleet {
    fn random_client(&self, role: NodeRole) -> ClientHandle {
        match role {
            NodeRole::Solid => self.solid.clone(),
            NodeRole::Latest => self.latest.clone(),
            NodeRole::Raw => self.raw.clone(),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn confirmed_100_unconfirmed_105_retention_50() {
    let pool = Arc::new(Fleet {
        solid: ViewNode::new("solid", 100),
        latest: ViewNode::new("latest", 105),
        raw: ViewNode::new("raw", 105),
    });
    let store = Arc::new(MemoryStore::new());
    let warm = Arc::new(MemoryWarmCache::new());
    let metrics = Arc::new(Metrics::new());
    let governor = Governor::new();

    // Bulk-sync confirmed history 1..=100 into the durable store.
    let driver = SyncDriver::new(
        pool.clone(),
        store.clone(),
        governor.clone(),
        SyncConfig::default(),
        metrics.clone(),
    );
    driver.run_range(1, 1, 101).await.unwrap();
    assert_eq!(store.block_count(), 100);

    // Cache picks the history up from the cold tier and the unconfirmed
    // frontier live from the latest view.
    let cache = Arc::new(BlockCache::new(
        pool,
        store.clone(),
        warm.clone(),
        Arc::new(StaticProducerDirectory::default()),
        CacheConfig {
            retention_window: 50,
            max_unconfirmed_read: 50,
            ..Default::default()
        },
        metrics,
    ));
    cache.advance_confirmed().await.unwrap();
    cache.refresh_solid_tip().await.unwrap();
    cache.advance_unconfirmed().await.unwrap();

    assert_eq!(cache.max_confirmed_block_id(), 100);
    assert_eq!(cache.max_block_id(), 105);
    assert_eq!(cache.state().live_confirmed_max(), 100);
    assert_eq!(cache.state().live_unconfirmed_max(), 105);

    // Sweep: everything at or below 100 - 50 leaves the hot tier.
    let swept = cache.sweep_once().await.unwrap();
    assert_eq!(swept, 50);
    assert_eq!(cache.stats().hot_blocks, 55);
    for number in 1..=50 {
        assert!(
            warm.contains_block(number),
            "evicted block {number} missing from warm tier"
        );
    }

    // Full read: 105 records, descending, blocks 1..=50 resolved from the
    // warm tier and written back hot.
    let rows = cache.get_blocks(None, 0, 105).await.unwrap();
    assert_eq!(rows.len(), 105);
    assert_eq!(rows.first().unwrap().number, 105);
    assert_eq!(rows.last().unwrap().number, 1);
    assert!(rows.windows(2).all(|w| w[0].number > w[1].number));
    assert!(rows.iter().take(5).all(|b| !b.confirmed));
    assert!(rows.iter().skip(5).all(|b| b.confirmed));

    // Second read over the now-hot range touches no deeper tier again.
    let cold_reads = store.block_reads();
    let warm_reads = warm.reads();
    let again = cache.get_blocks(None, 1, 105).await.unwrap();
    assert_eq!(rows, again);
    assert_eq!(store.block_reads(), cold_reads);
    assert_eq!(warm.reads(), warm_reads);

    // Warm TTL expiry degrades gracefully to the cold tier.
    for number in 1..=50 {
        warm.expire(&block_key(number));
    }
    // Hot tier already holds everything back, so expiry alone changes
    // nothing for reads.
    let third = cache.get_blocks(Some(10), 0, 105).await.unwrap();
    assert_eq!(third.len(), 10);
    assert_eq!(third.first().unwrap().number, 105);
}

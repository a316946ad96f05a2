//! In-memory reference implementations of the storage seams.
//!
//! `MemoryStore` models the relational cold tier closely enough for the
//! engine: blocks in an ordered map, accounts with dependent balance/vote
//! rows replaced per upsert. Read/write counters let tests assert that the
//! read-through cache really stops at the tier that holds the data.

use crate::{block_key, BlockFilter, DurableStore, QueryOrder, StoreError, WarmCache};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use records::{AccountRecord, Address, BlockRecord, Vote};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

#[derive(Default)]
pub struct MemoryStore {
    blocks: RwLock<BTreeMap<u64, BlockRecord>>,
    accounts: RwLock<HashMap<Address, AccountRecord>>,
    asset_rows: RwLock<HashMap<Address, BTreeMap<String, i64>>>,
    vote_rows: RwLock<HashMap<Address, Vec<Vote>>>,
    block_reads: AtomicUsize,
    block_writes: AtomicUsize,
    fail_commits: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of block queries served so far.
    pub fn block_reads(&self) -> usize {
        self.block_reads.load(Ordering::Relaxed)
    }

    /// Number of block upsert batches applied so far.
    pub fn block_writes(&self) -> usize {
        self.block_writes.load(Ordering::Relaxed)
    }

    pub fn block_count(&self) -> usize {
        self.blocks.read().len()
    }

    pub fn account(&self, address: &Address) -> Option<AccountRecord> {
        self.accounts.read().get(address).cloned()
    }

    pub fn votes_for(&self, address: &Address) -> Vec<Vote> {
        self.vote_rows.read().get(address).cloned().unwrap_or_default()
    }

    /// Make every subsequent batch commit fail until cleared. Used to
    /// exercise the commit-failure path.
    pub fn set_fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::Relaxed);
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn query_blocks(
        &self,
        filter: BlockFilter,
        order: QueryOrder,
        limit: Option<usize>,
    ) -> Result<Vec<BlockRecord>, StoreError> {
        self.block_reads.fetch_add(1, Ordering::Relaxed);
        let blocks = self.blocks.read();

        let mut rows: Vec<BlockRecord> = match (&filter.numbers, filter.after) {
            (Some(numbers), _) => numbers
                .iter()
                .filter_map(|n| blocks.get(n).cloned())
                .collect(),
            (None, Some(after)) => blocks
                .range(after + 1..)
                .map(|(_, b)| b.clone())
                .collect(),
            (None, None) => blocks.values().cloned().collect(),
        };

        match order {
            QueryOrder::Ascending => rows.sort_by_key(|b| b.number),
            QueryOrder::Descending => rows.sort_by_key(|b| std::cmp::Reverse(b.number)),
        }
        if let Some(limit) = limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn upsert_blocks(&self, batch: &[BlockRecord]) -> Result<Vec<u64>, StoreError> {
        if self.fail_commits.load(Ordering::Relaxed) {
            return Err(StoreError::CommitFailed("injected failure".into()));
        }
        self.block_writes.fetch_add(1, Ordering::Relaxed);

        let mut blocks = self.blocks.write();
        let mut stored = Vec::with_capacity(batch.len());
        for block in batch {
            blocks.insert(block.number, block.clone());
            stored.push(block.number);
        }
        Ok(stored)
    }

    async fn max_block_id(&self) -> Result<u64, StoreError> {
        Ok(self
            .blocks
            .read()
            .keys()
            .next_back()
            .copied()
            .unwrap_or_default())
    }

    async fn upsert_accounts(&self, batch: &[AccountRecord]) -> Result<usize, StoreError> {
        if self.fail_commits.load(Ordering::Relaxed) {
            return Err(StoreError::CommitFailed("injected failure".into()));
        }

        let mut accounts = self.accounts.write();
        let mut asset_rows = self.asset_rows.write();
        let mut vote_rows = self.vote_rows.write();
        for account in batch {
            // Dependent rows are replaced wholesale, matching the relational
            // delete-then-insert the real store performs.
            asset_rows.insert(account.address.clone(), account.asset_balances.clone());
            vote_rows.insert(account.address.clone(), account.votes.clone());
            accounts.insert(account.address.clone(), account.clone());
        }
        Ok(batch.len())
    }
}

/// TTL key-value store; entries expire lazily on read.
#[derive(Default)]
pub struct MemoryWarmCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryWarmCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn contains_block(&self, number: u64) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(&block_key(number)) {
            Some((_, expiry)) if *expiry > Instant::now() => true,
            Some(_) => {
                entries.remove(&block_key(number));
                false
            }
            None => false,
        }
    }

    /// Force a key past its TTL. Test hook.
    pub fn expire(&self, key: &str) {
        self.entries.lock().remove(key);
    }

    fn live_value(entries: &mut HashMap<String, (String, Instant)>, key: &str) -> Option<String> {
        match entries.get(key) {
            Some((value, expiry)) if *expiry > Instant::now() => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }
}

#[async_trait]
impl WarmCache for MemoryWarmCache {
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.entries
            .lock()
            .insert(key.to_owned(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn mset(&self, pairs: Vec<(String, String)>, ttl: Duration) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        let expiry = Instant::now() + ttl;
        let mut entries = self.entries.lock();
        for (key, value) in pairs {
            entries.insert(key, (value, expiry));
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.entries.lock();
        Ok(Self::live_value(&mut entries, key))
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.entries.lock();
        Ok(keys
            .iter()
            .map(|key| Self::live_value(&mut entries, key))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn block(number: u64) -> BlockRecord {
        BlockRecord {
            number,
            hash: format!("{number:016x}"),
            confirmed: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn query_after_watermark_excludes_watermark() {
        let store = MemoryStore::new();
        store
            .upsert_blocks(&[block(1), block(2), block(3)])
            .await
            .unwrap();

        let rows = store
            .query_blocks(BlockFilter::after(2), QueryOrder::Descending, None)
            .await
            .unwrap();
        assert_eq!(rows.iter().map(|b| b.number).collect::<Vec<_>>(), vec![3]);
    }

    #[tokio::test]
    async fn query_by_numbers_skips_absent_rows() {
        let store = MemoryStore::new();
        store.upsert_blocks(&[block(5), block(7)]).await.unwrap();

        let rows = store
            .query_blocks(
                BlockFilter::numbers(vec![5, 6, 7]),
                QueryOrder::Ascending,
                None,
            )
            .await
            .unwrap();
        assert_eq!(
            rows.iter().map(|b| b.number).collect::<Vec<_>>(),
            vec![5, 7]
        );
    }

    #[tokio::test]
    async fn commit_failure_fails_whole_batch() {
        let store = MemoryStore::new();
        store.set_fail_commits(true);
        let err = store.upsert_blocks(&[block(1)]).await.unwrap_err();
        assert!(matches!(err, StoreError::CommitFailed(_)));
        assert_eq!(store.block_count(), 0);
    }

    #[tokio::test]
    async fn account_upsert_replaces_dependent_rows() {
        let store = MemoryStore::new();
        let addr = Address::new("TAbcdefghij1234567890AbcdefghiJ123");
        let first = AccountRecord {
            address: addr.clone(),
            votes: vec![Vote {
                to_address: Address::new("TProducerAddr1234567890Abcdefghi12"),
                count: 3,
            }],
            ..Default::default()
        };
        store.upsert_accounts(&[first]).await.unwrap();
        assert_eq!(store.votes_for(&addr).len(), 1);

        let second = AccountRecord {
            address: addr.clone(),
            votes: vec![],
            ..Default::default()
        };
        store.upsert_accounts(&[second]).await.unwrap();
        assert!(store.votes_for(&addr).is_empty());
    }

    #[tokio::test]
    async fn warm_entries_expire() {
        let warm = MemoryWarmCache::new();
        warm.set("block:9", "{}".into(), Duration::from_secs(60))
            .await
            .unwrap();
        assert!(warm.contains_block(9));

        warm.expire("block:9");
        assert_eq!(warm.get("block:9").await.unwrap(), None);
    }
}

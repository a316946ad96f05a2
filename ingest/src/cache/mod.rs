//! Multi-tier block cache.
//!
//! Reconciles the volatile unconfirmed frontier (pulled live from
//! latest-view nodes) with durable confirmed history (pulled from the cold
//! tier). Reads check hot -> warm -> cold and backfill every tier they
//! bypass. A background sweep keeps the hot tier bounded to a sliding window
//! of recent confirmed history plus the full unconfirmed frontier.

mod state;
mod sweep;

pub use state::BufferState;

use crate::client::{ClientError, ClientHandle, ClientPool, NodeClient, NodeRole};
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use metrics::SharedMetrics;
use parking_lot::Mutex;
use records::{Address, BlockRecord};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use store::{block_key, BlockFilter, DurableStore, QueryOrder, StoreError, WarmCache};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Resolves a producer address to its display name. The real deployment
/// backs this with the producer registry; tests and the demo use a fixed
/// table.
pub trait ProducerDirectory: Send + Sync {
    fn display_name(&self, address: &Address) -> Option<String>;
}

#[derive(Default)]
pub struct StaticProducerDirectory {
    names: HashMap<Address, String>,
}

impl StaticProducerDirectory {
    pub fn new(names: HashMap<Address, String>) -> Self {
        Self { names }
    }
}

impl ProducerDirectory for StaticProducerDirectory {
    fn display_name(&self, address: &Address) -> Option<String> {
        self.names.get(address).cloned()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct CacheConfig {
    /// Confirmed blocks kept hot behind `cached_confirmed_max`.
    pub retention_window: u64,
    /// Most unconfirmed blocks pulled per refresh pass.
    pub max_unconfirmed_read: u64,
    /// Consecutive live-node errors tolerated before rotating the handle.
    pub max_node_errors: u32,
    /// Attempts per block in the unconfirmed refresh before giving up until
    /// the next pass.
    pub block_attempts: u32,
    /// Row page for the very first confirmed-history pull.
    pub first_run_page: usize,
    pub warm_ttl: Duration,
    pub refresh_interval: Duration,
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            retention_window: 50_000,
            max_unconfirmed_read: 50,
            max_node_errors: 3,
            block_attempts: 12,
            first_run_page: 3000,
            warm_ttl: Duration::from_secs(6 * 60 * 60),
            refresh_interval: Duration::from_secs(10),
            sweep_interval: Duration::from_secs(10),
        }
    }
}

/// Consecutive-error bookkeeping for one live-node role.
struct NodeHealth {
    client: Option<ClientHandle>,
    errors: u32,
}

impl NodeHealth {
    fn idle() -> Mutex<Self> {
        Mutex::new(Self {
            client: None,
            errors: 0,
        })
    }
}

/// Point-in-time snapshot for status logs.
#[derive(Clone, Copy, Debug)]
pub struct CacheStats {
    pub hot_blocks: usize,
    pub unconfirmed_blocks: usize,
    pub live_unconfirmed_max: u64,
    pub live_confirmed_max: u64,
    pub cached_unconfirmed_max: u64,
    pub cached_confirmed_max: u64,
}

pub struct BlockCache {
    hot: DashMap<u64, BlockRecord>,
    /// Numbers currently held hot in unconfirmed form; promotion removes
    /// them, eviction clears them alongside the hot entry.
    unconfirmed: DashSet<u64>,
    state: BufferState,
    solid: Mutex<NodeHealth>,
    latest: Mutex<NodeHealth>,
    pool: Arc<dyn ClientPool>,
    durable: Arc<dyn DurableStore>,
    warm: Arc<dyn WarmCache>,
    producers: Arc<dyn ProducerDirectory>,
    config: CacheConfig,
    metrics: SharedMetrics,
}

impl BlockCache {
    pub fn new(
        pool: Arc<dyn ClientPool>,
        durable: Arc<dyn DurableStore>,
        warm: Arc<dyn WarmCache>,
        producers: Arc<dyn ProducerDirectory>,
        config: CacheConfig,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            hot: DashMap::new(),
            unconfirmed: DashSet::new(),
            state: BufferState::new(),
            solid: NodeHealth::idle(),
            latest: NodeHealth::idle(),
            pool,
            durable,
            warm,
            producers,
            config,
            metrics,
        }
    }

    /// Highest block number known locally, confirmed or not.
    pub fn max_block_id(&self) -> u64 {
        self.state
            .cached_unconfirmed_max()
            .max(self.state.cached_confirmed_max())
    }

    pub fn max_confirmed_block_id(&self) -> u64 {
        self.state.cached_confirmed_max()
    }

    pub fn state(&self) -> &BufferState {
        &self.state
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hot_blocks: self.hot.len(),
            unconfirmed_blocks: self.unconfirmed.len(),
            live_unconfirmed_max: self.state.live_unconfirmed_max(),
            live_confirmed_max: self.state.live_confirmed_max(),
            cached_unconfirmed_max: self.state.cached_unconfirmed_max(),
            cached_confirmed_max: self.state.cached_confirmed_max(),
        }
    }

    /// Read-through block lookup over `[start, end]`, `end` clamped to the
    /// locally known maximum. Results are sorted by descending number and
    /// truncated to `max_wanted` when given. Numbers no tier can resolve are
    /// dropped; the gap is logged.
    pub async fn get_blocks(
        &self,
        max_wanted: Option<usize>,
        start: u64,
        end: u64,
    ) -> Result<Vec<BlockRecord>, StoreError> {
        let end = end.min(self.max_block_id());
        if start > end {
            return Ok(Vec::new());
        }

        let wanted = (end - start + 1) as usize;
        let mut found = Vec::with_capacity(wanted);
        let mut missing = Vec::new();
        for number in start..=end {
            match self.hot.get(&number) {
                Some(block) => {
                    self.metrics.inc_cache_read("hot", "hit");
                    found.push(block.value().clone());
                }
                None => {
                    self.metrics.inc_cache_read("hot", "miss");
                    missing.push(number);
                }
            }
        }

        // One batched warm lookup for everything the hot tier missed.
        if !missing.is_empty() {
            missing = self.read_warm(&missing, &mut found).await;
        }

        // The cold tier resolves whatever is left; anything outside confirmed
        // history simply is not available.
        if !missing.is_empty() {
            missing = self.read_cold(&missing, &mut found).await?;
        }

        if !missing.is_empty() {
            for _ in &missing {
                self.metrics.inc_cache_read("cold", "miss");
            }
            debug!(
                gap = missing.len(),
                first = missing.first().copied(),
                "block range has unresolvable numbers"
            );
        }

        found.sort_by_key(|block| std::cmp::Reverse(block.number));
        if let Some(max_wanted) = max_wanted {
            found.truncate(max_wanted);
        }
        Ok(found)
    }

    /// Warm-tier pass: resolves what it can into `found`, backfills the hot
    /// tier, and returns the numbers still missing. Warm-tier failures are
    /// absorbed; the cold tier remains the source of truth.
    async fn read_warm(&self, missing: &[u64], found: &mut Vec<BlockRecord>) -> Vec<u64> {
        let keys: Vec<String> = missing.iter().map(|n| block_key(*n)).collect();
        let values = match self.warm.mget(&keys).await {
            Ok(values) => values,
            Err(err) => {
                warn!(%err, "warm tier lookup failed, falling through to cold");
                return missing.to_vec();
            }
        };

        let mut still_missing = Vec::new();
        for (number, value) in missing.iter().zip(values) {
            let parsed = value.and_then(|json| {
                serde_json::from_str::<BlockRecord>(&json)
                    .map_err(|err| warn!(number, %err, "discarding bad warm entry"))
                    .ok()
            });
            match parsed {
                Some(block) => {
                    self.metrics.inc_cache_read("warm", "hit");
                    self.merge_hot(block.clone(), "warm");
                    found.push(block);
                }
                None => {
                    self.metrics.inc_cache_read("warm", "miss");
                    still_missing.push(*number);
                }
            }
        }
        still_missing
    }

    /// Cold-tier pass: resolves confirmed rows into `found`, backfills hot
    /// and warm, and returns the numbers no tier holds.
    async fn read_cold(
        &self,
        missing: &[u64],
        found: &mut Vec<BlockRecord>,
    ) -> Result<Vec<u64>, StoreError> {
        let rows = self
            .durable
            .query_blocks(
                BlockFilter::numbers(missing.to_vec()),
                QueryOrder::Descending,
                None,
            )
            .await?;

        let mut resolved = std::collections::HashSet::with_capacity(rows.len());
        let mut warm_backfill = Vec::with_capacity(rows.len());
        for mut block in rows {
            block.confirm();
            self.metrics.inc_cache_read("cold", "hit");
            resolved.insert(block.number);
            if let Ok(json) = serde_json::to_string(&block) {
                warm_backfill.push((block_key(block.number), json));
            }
            self.merge_hot(block.clone(), "store");
            found.push(block);
        }

        if !warm_backfill.is_empty() {
            if let Err(err) = self.warm.mset(warm_backfill, self.config.warm_ttl).await {
                warn!(%err, "warm tier backfill failed");
            }
        }

        Ok(missing
            .iter()
            .copied()
            .filter(|n| !resolved.contains(n))
            .collect())
    }

    /// Refresh the unconfirmed frontier from a latest-view node.
    ///
    /// Fetches at most `max_unconfirmed_read` missing blocks oldest-first so
    /// a partial pass leaves no holes behind the advanced watermark; a block
    /// that stays unfetchable ends the pass and is retried next tick.
    pub async fn advance_unconfirmed(&self) -> Result<u64, ClientError> {
        let tip = self.fetch_tip(NodeRole::Latest).await?;
        self.state.advance_live_unconfirmed(tip.number);
        self.metrics.set_live_unconfirmed_tip(tip.number as i64);

        let mut start = self.state.cached_confirmed_max() + 1;
        let cached = self.state.cached_unconfirmed_max();
        if start <= cached {
            start = cached + 1;
        }
        if start > tip.number {
            return Ok(0);
        }
        let end = tip.number.min(start + self.config.max_unconfirmed_read - 1);
        debug!(start, end, tip = tip.number, "buffering unconfirmed range");

        let mut merged = 0u64;
        for number in start..=end {
            match self.fetch_block_checked(number).await {
                Ok(block) => {
                    self.merge_hot(block, "live");
                    self.state.advance_cached_unconfirmed(number);
                    merged += 1;
                }
                Err(err) => {
                    warn!(number, %err, "abandoning unconfirmed pass early");
                    break;
                }
            }
        }
        self.metrics
            .set_cached_unconfirmed_tip(self.state.cached_unconfirmed_max() as i64);
        self.metrics.set_hot_blocks(self.hot.len() as i64);
        Ok(merged)
    }

    /// Pull newly confirmed history from the cold tier and promote the
    /// matching hot entries. Promotion is idempotent and number-keyed, so
    /// re-merging already-cached numbers is safe.
    pub async fn advance_confirmed(&self) -> Result<usize, StoreError> {
        let watermark = self.state.cached_confirmed_max();
        let (filter, limit) = if watermark == 0 {
            // First run: bounded page of the newest confirmed rows.
            (BlockFilter::default(), Some(self.config.first_run_page))
        } else {
            (BlockFilter::after(watermark), None)
        };

        let rows = self
            .durable
            .query_blocks(filter, QueryOrder::Descending, limit)
            .await?;
        if rows.is_empty() {
            return Ok(0);
        }

        let count = rows.len();
        let mut max_id = watermark;
        for mut block in rows {
            block.confirm();
            if block.producer_name.is_empty() {
                if let Some(name) = self.producers.display_name(&block.producer_address) {
                    block.producer_name = name;
                }
            }
            max_id = max_id.max(block.number);
            self.merge_hot(block, "store");
        }

        self.state.advance_cached_confirmed(max_id);
        self.metrics.set_cached_confirmed_tip(max_id as i64);
        self.metrics.set_hot_blocks(self.hot.len() as i64);
        debug!(count, max_id, "merged confirmed history");
        Ok(count)
    }

    /// Refresh `live_confirmed_max` from a solid-view node.
    pub async fn refresh_solid_tip(&self) -> Result<u64, ClientError> {
        let tip = self.fetch_tip(NodeRole::Solid).await?;
        self.state.advance_live_confirmed(tip.number);
        self.metrics.set_live_confirmed_tip(tip.number as i64);
        Ok(tip.number)
    }

    /// Number-keyed idempotent upsert into the hot tier. A confirmed entry is
    /// never demoted; the unconfirmed index tracks the entry's final form.
    fn merge_hot(&self, block: BlockRecord, source: &str) {
        let number = block.number;
        let final_confirmed = match self.hot.entry(number) {
            Entry::Occupied(mut current) => {
                if block.supersedes(current.get()) {
                    current.insert(block);
                }
                current.get().confirmed
            }
            Entry::Vacant(slot) => {
                let confirmed = block.confirmed;
                slot.insert(block);
                self.metrics.add_blocks_ingested(source, 1);
                confirmed
            }
        };
        if final_confirmed {
            self.unconfirmed.remove(&number);
        } else {
            self.unconfirmed.insert(number);
        }
    }

    async fn fetch_tip(&self, role: NodeRole) -> Result<records::TipInfo, ClientError> {
        let client = self.client_for(role);
        match client.fetch_tip_info().await {
            Ok(tip) => {
                self.note_success(role);
                Ok(tip)
            }
            Err(err) => {
                self.note_failure(role, &client);
                Err(err)
            }
        }
    }

    /// One unconfirmed block by number, retried with the per-instance
    /// rotation policy until `block_attempts` runs out.
    async fn fetch_block_checked(&self, number: u64) -> Result<BlockRecord, ClientError> {
        let mut last_err = ClientError::NotFound {
            endpoint: "unknown".into(),
        };
        for _ in 0..self.config.block_attempts {
            let client = self.client_for(NodeRole::Latest);
            match client.fetch_block_by_number(number).await {
                Ok(block) if block.number == number => {
                    self.note_success(NodeRole::Latest);
                    return Ok(block);
                }
                Ok(_) => {
                    self.note_failure(NodeRole::Latest, &client);
                    last_err = ClientError::Malformed {
                        endpoint: client.endpoint().to_owned(),
                    };
                }
                Err(err) => {
                    self.note_failure(NodeRole::Latest, &client);
                    last_err = err;
                }
            }
        }
        Err(last_err)
    }

    fn health(&self, role: NodeRole) -> &Mutex<NodeHealth> {
        match role {
            NodeRole::Solid => &self.solid,
            NodeRole::Latest => &self.latest,
            NodeRole::Raw => unreachable!("cache holds no raw-view clients"),
        }
    }

    fn client_for(&self, role: NodeRole) -> ClientHandle {
        let mut health = self.health(role).lock();
        health
            .client
            .get_or_insert_with(|| self.pool.random_client(role))
            .clone()
    }

    fn note_success(&self, role: NodeRole) {
        self.health(role).lock().errors = 0;
    }

    /// Count one error against the role; past the ceiling the handle is
    /// replaced with a fresh random one and the counter resets.
    fn note_failure(&self, role: NodeRole, failed: &ClientHandle) {
        let mut health = self.health(role).lock();
        health.errors += 1;
        if health.errors > self.config.max_node_errors {
            let fresh = self.pool.random_client(role);
            info!(
                role = role.as_str(),
                old = failed.endpoint(),
                new = fresh.endpoint(),
                "rotating node connection"
            );
            health.client = Some(fresh);
            health.errors = 0;
            self.metrics.inc_node_rotation(role.as_str());
        }
    }

    /// Start the refresh and sweep loops. Called once per process.
    pub fn spawn_background(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(Self::refresh_loop(Arc::clone(self))),
            tokio::spawn(Self::sweep_loop(Arc::clone(self))),
        ]
    }

    async fn refresh_loop(cache: Arc<Self>) {
        let mut ticker = tokio::time::interval(cache.config.refresh_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = cache.advance_confirmed().await {
                warn!(%err, "confirmed refresh failed");
            }
            if let Err(err) = cache.refresh_solid_tip().await {
                warn!(%err, "solid tip refresh failed");
            }
            if let Err(err) = cache.advance_unconfirmed().await {
                warn!(%err, "unconfirmed refresh failed");
            }
        }
    }

    async fn sweep_loop(cache: Arc<Self>) {
        let mut ticker = tokio::time::interval(cache.config.sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = cache.sweep_once().await {
                warn!(%err, "eviction sweep failed");
            }
        }
    }
}

pub mod server;

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    // Frontier
    live_unconfirmed_tip: IntGauge,
    live_confirmed_tip: IntGauge,
    cached_unconfirmed_tip: IntGauge,
    cached_confirmed_tip: IntGauge,
    // Block cache
    hot_blocks: IntGauge,
    cache_reads: IntCounterVec,
    blocks_ingested: IntCounterVec,
    swept_blocks: IntCounter,
    // Fetch framework
    fetch_items: IntCounterVec,
    node_rotations: IntCounterVec,
    // Sync driver
    verify_retries: IntCounter,
    bulk_window_time: HistogramVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let live_unconfirmed_tip = IntGauge::with_opts(Opts::new(
            "explorer_live_unconfirmed_tip",
            "Best block number reported by a latest-view node",
        ))
        .unwrap();
        registry.register(Box::new(live_unconfirmed_tip.clone())).unwrap();

        let live_confirmed_tip = IntGauge::with_opts(Opts::new(
            "explorer_live_confirmed_tip",
            "Best block number reported by a solid-view node",
        ))
        .unwrap();
        registry.register(Box::new(live_confirmed_tip.clone())).unwrap();

        let cached_unconfirmed_tip = IntGauge::with_opts(Opts::new(
            "explorer_cached_unconfirmed_tip",
            "Highest unconfirmed block number held in the hot tier",
        ))
        .unwrap();
        registry.register(Box::new(cached_unconfirmed_tip.clone())).unwrap();

        let cached_confirmed_tip = IntGauge::with_opts(Opts::new(
            "explorer_cached_confirmed_tip",
            "Highest confirmed block number known locally",
        ))
        .unwrap();
        registry.register(Box::new(cached_confirmed_tip.clone())).unwrap();

        let hot_blocks = IntGauge::with_opts(Opts::new(
            "explorer_hot_tier_blocks",
            "Number of blocks currently in the hot tier",
        ))
        .unwrap();
        registry.register(Box::new(hot_blocks.clone())).unwrap();

        let cache_reads = IntCounterVec::new(
            Opts::new(
                "explorer_cache_reads_total",
                "Block lookups by tier and outcome",
            ),
            &["tier", "result"],
        )
        .unwrap();
        registry.register(Box::new(cache_reads.clone())).unwrap();

        let blocks_ingested = IntCounterVec::new(
            Opts::new(
                "explorer_blocks_ingested_total",
                "Blocks merged into the hot tier by source",
            ),
            &["source"],
        )
        .unwrap();
        registry.register(Box::new(blocks_ingested.clone())).unwrap();

        let swept_blocks = IntCounter::with_opts(Opts::new(
            "explorer_swept_blocks_total",
            "Blocks evicted from the hot tier into the warm tier",
        ))
        .unwrap();
        registry.register(Box::new(swept_blocks.clone())).unwrap();

        let fetch_items = IntCounterVec::new(
            Opts::new(
                "explorer_fetch_items_total",
                "Fetched items by kind and outcome",
            ),
            &["kind", "result"],
        )
        .unwrap();
        registry.register(Box::new(fetch_items.clone())).unwrap();

        let node_rotations = IntCounterVec::new(
            Opts::new(
                "explorer_node_rotations_total",
                "Client handle replacements after sustained endpoint errors",
            ),
            &["role"],
        )
        .unwrap();
        registry.register(Box::new(node_rotations.clone())).unwrap();

        let verify_retries = IntCounter::with_opts(Opts::new(
            "explorer_verify_retries_total",
            "Individual refetch rounds during range verification",
        ))
        .unwrap();
        registry.register(Box::new(verify_retries.clone())).unwrap();

        let bulk_window_time = HistogramVec::new(
            HistogramOpts::new(
                "explorer_bulk_window_seconds",
                "Time to fetch, store and verify one bulk window",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &[],
        )
        .unwrap();
        registry.register(Box::new(bulk_window_time.clone())).unwrap();

        Self {
            registry,
            live_unconfirmed_tip,
            live_confirmed_tip,
            cached_unconfirmed_tip,
            cached_confirmed_tip,
            hot_blocks,
            cache_reads,
            blocks_ingested,
            swept_blocks,
            fetch_items,
            node_rotations,
            verify_retries,
            bulk_window_time,
        }
    }

    pub fn gather(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::<u8>::new();
        let encoder = TextEncoder::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .expect("failed to encode metrics");
        String::from_utf8(buffer).expect("metrics not utf8")
    }

    pub fn set_live_unconfirmed_tip(&self, v: i64) {
        self.live_unconfirmed_tip.set(v);
    }

    pub fn set_live_confirmed_tip(&self, v: i64) {
        self.live_confirmed_tip.set(v);
    }

    pub fn set_cached_unconfirmed_tip(&self, v: i64) {
        self.cached_unconfirmed_tip.set(v);
    }

    pub fn set_cached_confirmed_tip(&self, v: i64) {
        self.cached_confirmed_tip.set(v);
    }

    pub fn set_hot_blocks(&self, v: i64) {
        self.hot_blocks.set(v);
    }

    pub fn inc_cache_read(&self, tier: &str, result: &str) {
        self.cache_reads.with_label_values(&[tier, result]).inc();
    }

    pub fn add_blocks_ingested(&self, source: &str, n: u64) {
        self.blocks_ingested.with_label_values(&[source]).inc_by(n);
    }

    pub fn add_swept_blocks(&self, n: u64) {
        self.swept_blocks.inc_by(n);
    }

    pub fn inc_fetch_item(&self, kind: &str, result: &str) {
        self.fetch_items.with_label_values(&[kind, result]).inc();
    }

    pub fn inc_node_rotation(&self, role: &str) {
        self.node_rotations.with_label_values(&[role]).inc();
    }

    pub fn inc_verify_retry(&self) {
        self.verify_retries.inc();
    }

    pub fn observe_bulk_window_time(&self, duration: f64) {
        self.bulk_window_time
            .with_label_values::<&str>(&[])
            .observe(duration);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedMetrics = Arc<Metrics>;

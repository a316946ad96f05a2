mod sim;

use clap::Parser;
use ingest::accounts::AccountSync;
use ingest::cache::{BlockCache, CacheConfig, StaticProducerDirectory};
use ingest::{ClientPool, FetchLimits, Governor, SyncConfig, SyncDriver, TaskControl};
use metrics::server::{run_metrics_server, MetricsServerConfig};
use metrics::Metrics;
use records::Address;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use store::{DurableStore, MemoryStore, MemoryWarmCache, WarmCache};
use tokio::task;
use tracing::{info, warn};

#[derive(Parser, Debug)]
struct Args {
    /// Simulated chain height at startup.
    #[arg(long, default_value_t = 300)]
    start_tip: u64,

    /// Blocks the solid view trails behind the latest view.
    #[arg(long, default_value_t = 20)]
    confirmed_lag: u64,

    /// Simulated endpoints per node role.
    #[arg(long, default_value_t = 3)]
    nodes_per_role: usize,

    /// Per-call probability of a simulated transport failure.
    #[arg(long, default_value_t = 0.05)]
    failure_rate: f64,

    /// Milliseconds between simulated blocks.
    #[arg(long, default_value_t = 3000)]
    block_interval_ms: u64,

    /// Confirmed blocks kept in the hot tier behind the confirmed maximum.
    #[arg(long, default_value_t = 200)]
    retention_window: u64,

    #[arg(short, long, default_value = "127.0.0.1")]
    address: IpAddr,

    #[arg(short, long, default_value_t = 9184)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    info!(?args, "starting ledger explorer against simulated fleet");

    let chain = sim::SimChain::new(args.start_tip, args.confirmed_lag);
    let pool: Arc<dyn ClientPool> = Arc::new(sim::sim_fleet(
        &chain,
        args.nodes_per_role,
        args.failure_rate,
    ));
    let store: Arc<dyn DurableStore> = Arc::new(MemoryStore::new());
    let warm: Arc<dyn WarmCache> = Arc::new(MemoryWarmCache::new());
    let metrics = Arc::new(Metrics::new());
    // One governor per fan-out domain: quiescence sampling is only
    // meaningful among tasks of the same kind.
    let sync_governor = Governor::new();
    let account_governor = Governor::new();

    // Block production.
    {
        let chain = Arc::clone(&chain);
        let interval = Duration::from_millis(args.block_interval_ms.max(1));
        task::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                chain.advance();
            }
        });
    }

    // Confirmed history: an open-ended sync task per catch-up round. A round
    // ends once it is caught up and quiescent; the next one resumes from the
    // durable watermark.
    {
        let driver = SyncDriver::new(
            Arc::clone(&pool),
            Arc::clone(&store),
            sync_governor.clone(),
            SyncConfig::default(),
            Arc::clone(&metrics),
        );
        let store = Arc::clone(&store);
        task::spawn(async move {
            let mut from = 1;
            loop {
                if let Err(err) = Arc::clone(&driver).run_range(0, from, 0).await {
                    warn!(%err, "history sync round failed");
                }
                tokio::time::sleep(Duration::from_secs(5)).await;
                from = match store.max_block_id().await {
                    Ok(max) => max + 1,
                    Err(_) => from,
                };
            }
        });
    }

    // Block cache and its background loops.
    let cache = Arc::new(BlockCache::new(
        Arc::clone(&pool),
        Arc::clone(&store),
        Arc::clone(&warm),
        Arc::new(StaticProducerDirectory::new(sim::sim_producers())),
        CacheConfig {
            retention_window: args.retention_window,
            ..Default::default()
        },
        Arc::clone(&metrics),
    ));
    cache.spawn_background();

    // One account ingestion pass over synthetic addresses, to keep the
    // account tables warm in the demo.
    {
        let accounts = AccountSync::new(
            Arc::clone(&pool),
            Arc::clone(&store),
            account_governor.clone(),
            FetchLimits::default(),
            Arc::clone(&metrics),
        );
        task::spawn(async move {
            let addresses: Vec<Address> = (0..256)
                .map(|i| Address::new(format!("TSimAccount{i:023}")))
                .collect();
            let control = TaskControl::new(Some(Duration::from_secs(120)), 64);
            match accounts.sync_accounts(addresses, control).await {
                Ok(report) => info!(
                    stored = report.stored,
                    bad = report.bad.len(),
                    unresolved = report.unresolved.len(),
                    "account pass finished"
                ),
                Err(err) => warn!(%err, "account pass failed"),
            }
        });
    }

    // Metrics endpoint.
    {
        let metrics = Arc::clone(&metrics);
        let config = MetricsServerConfig {
            metrics_address: args.address,
            metrics_port: args.port,
        };
        task::spawn(async move {
            if let Err(err) = run_metrics_server(config, metrics).await {
                warn!(%err, "metrics server exited");
            }
        });
    }

    // Status loop, mirroring the standalone buffer prober.
    let mut ticker = tokio::time::interval(Duration::from_secs(5));
    loop {
        ticker.tick().await;
        let stats = cache.stats();
        info!(
            max_block = cache.max_block_id(),
            max_confirmed = cache.max_confirmed_block_id(),
            live_tip = stats.live_unconfirmed_max,
            hot = stats.hot_blocks,
            unconfirmed = stats.unconfirmed_blocks,
            "status"
        );

        let top = cache.max_block_id();
        if top == 0 {
            continue;
        }
        match cache.get_blocks(Some(50), top.saturating_sub(49), top).await {
            Ok(rows) if !rows.is_empty() => info!(
                newest = rows.first().map(|b| b.number),
                oldest = rows.last().map(|b| b.number),
                count = rows.len(),
                "recent blocks"
            ),
            Ok(_) => {}
            Err(err) => warn!(%err, "block read failed"),
        }
    }
}

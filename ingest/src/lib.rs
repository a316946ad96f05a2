//! Ingestion and caching engine for the ledger explorer.
//!
//! This crate holds the three subsystems that keep the local view of the
//! chain fresh, complete, and consistent:
//!
//! - **Governor + Fetcher**: a bounded, self-forking concurrent fetch
//!   framework for pulling large sparse item sets from rotating remote
//!   endpoints ([`governor`], [`fetcher`])
//! - **Block Cache**: a hot/warm/cold tiered block store reconciling the
//!   unconfirmed frontier with confirmed history ([`cache`])
//! - **Sync Driver**: bulk history synchronization with load-balancing range
//!   forks and fork-aware range-completeness verification ([`sync`])
//!
//! Remote nodes, the durable store, and the warm cache are reached through
//! trait seams ([`client`], the `store` crate) so the engine can run against
//! real services, mocks, or the simulated fleet in the demo binary.

pub mod accounts;
pub mod cache;
pub mod client;
pub mod fetcher;
pub mod governor;
pub mod sync;

pub use accounts::{AccountSync, AccountSyncReport};
pub use cache::{BlockCache, CacheConfig, CacheStats, ProducerDirectory, StaticProducerDirectory};
pub use client::{ClientError, ClientHandle, ClientPool, NodeClient, NodeRole, StaticClientPool};
pub use fetcher::{FetchLimits, FetchReport, Fetcher, ItemSource, TaskControl};
pub use governor::{Governor, QuiescenceSampler};
pub use sync::{SyncConfig, SyncDriver, SyncError};

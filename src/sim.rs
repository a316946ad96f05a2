//! In-process simulated node fleet.
//!
//! Stands in for a real node deployment so the engine can be run and
//! observed without network access: a shared chain whose tip advances on a
//! timer, served through per-role views with injectable per-call failure
//! rates. The solid view trails the latest view by a fixed confirmation lag.

use async_trait::async_trait;
use ingest::{ClientError, ClientHandle, NodeClient, NodeRole, StaticClientPool};
use records::{AccountRecord, Address, BlockRecord, NetUsage, TipInfo};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

const PRODUCERS: &[(&str, &str)] = &[
    ("TSimProducerAlpha00000000000000001", "alpha"),
    ("TSimProducerBravo00000000000000002", "bravo"),
    ("TSimProducerCharlie000000000000003", "charlie"),
];

pub struct SimChain {
    unconfirmed_tip: AtomicU64,
    confirmed_lag: u64,
}

impl SimChain {
    pub fn new(start_tip: u64, confirmed_lag: u64) -> Arc<Self> {
        Arc::new(Self {
            unconfirmed_tip: AtomicU64::new(start_tip),
            confirmed_lag,
        })
    }

    /// Produce one block.
    pub fn advance(&self) -> u64 {
        self.unconfirmed_tip.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn unconfirmed_tip(&self) -> u64 {
        self.unconfirmed_tip.load(Ordering::Acquire)
    }

    pub fn confirmed_tip(&self) -> u64 {
        self.unconfirmed_tip().saturating_sub(self.confirmed_lag)
    }

    fn block(&self, number: u64) -> BlockRecord {
        let (producer, _) = PRODUCERS[(number % PRODUCERS.len() as u64) as usize];
        BlockRecord {
            number,
            hash: hex::encode(number.to_be_bytes()),
            parent_hash: hex::encode(number.saturating_sub(1).to_be_bytes()),
            size: 800 + (number % 700),
            created_at: number as i64 * 3_000,
            tx_count: number % 40,
            producer_address: Address::new(producer),
            // Display names are not a node concern; the cache attaches them
            // from the producer directory.
            producer_name: String::new(),
            confirmed: false,
        }
    }
}

/// One endpoint of the fleet. Calls fail with probability `failure_rate`.
pub struct SimNode {
    chain: Arc<SimChain>,
    role: NodeRole,
    name: String,
    failure_rate: f64,
}

impl SimNode {
    fn visible_tip(&self) -> u64 {
        match self.role {
            NodeRole::Solid => self.chain.confirmed_tip(),
            NodeRole::Latest | NodeRole::Raw => self.chain.unconfirmed_tip(),
        }
    }

    fn flaky_call(&self) -> Result<(), ClientError> {
        if rand::random::<f64>() < self.failure_rate {
            return Err(ClientError::Transport {
                endpoint: self.name.clone(),
                message: "simulated drop".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl NodeClient for SimNode {
    fn endpoint(&self) -> &str {
        &self.name
    }

    async fn fetch_account(&self, address: &Address) -> Result<AccountRecord, ClientError> {
        self.flaky_call()?;
        let seed = address.as_str().len() as i64;
        Ok(AccountRecord {
            address: address.clone(),
            name: format!("sim-{}", &address.as_str()[..8]),
            balance: seed * 1_000_003,
            created_at: 1_529_884_800_000,
            ..Default::default()
        })
    }

    async fn fetch_account_net(&self, address: &Address) -> Result<NetUsage, ClientError> {
        self.flaky_call()?;
        Ok(NetUsage {
            free_net_limit: 5_000,
            net_used: address.as_str().len() as i64,
            net_limit: 10_000,
            total_net_limit: 43_200_000_000,
            total_net_weight: 1_000_000,
            ..Default::default()
        })
    }

    async fn fetch_block_by_number(&self, number: u64) -> Result<BlockRecord, ClientError> {
        self.flaky_call()?;
        if number == 0 || number > self.visible_tip() {
            return Err(ClientError::NotFound {
                endpoint: self.name.clone(),
            });
        }
        Ok(self.chain.block(number))
    }

    async fn fetch_block_range(&self, start: u64, end: u64) -> Result<Vec<BlockRecord>, ClientError> {
        self.flaky_call()?;
        let tip = self.visible_tip();
        Ok((start..end)
            .filter(|n| *n >= 1 && *n <= tip)
            .map(|n| self.chain.block(n))
            .collect())
    }

    async fn fetch_tip_info(&self) -> Result<TipInfo, ClientError> {
        self.flaky_call()?;
        let number = self.visible_tip();
        Ok(TipInfo {
            number,
            observed_at: number as i64 * 3_000,
        })
    }
}

/// Build a pool of `nodes_per_role` endpoints for each role.
pub fn sim_fleet(chain: &Arc<SimChain>, nodes_per_role: usize, failure_rate: f64) -> StaticClientPool {
    let endpoints = |role: NodeRole| -> Vec<ClientHandle> {
        (0..nodes_per_role)
            .map(|i| {
                Arc::new(SimNode {
                    chain: Arc::clone(chain),
                    role,
                    name: format!("sim-{}-{i}", role.as_str()),
                    failure_rate,
                }) as ClientHandle
            })
            .collect()
    };
    StaticClientPool::new(
        endpoints(NodeRole::Solid),
        endpoints(NodeRole::Latest),
        endpoints(NodeRole::Raw),
    )
}

/// Producer name table matching the simulated chain.
pub fn sim_producers() -> std::collections::HashMap<Address, String> {
    PRODUCERS
        .iter()
        .map(|(addr, name)| (Address::new(*addr), (*name).to_owned()))
        .collect()
}

//! Account ingestion pipeline.
//!
//! Pulls account records for a (possibly very large) address list through
//! the chunked fetcher: the solid view serves the account state, a second
//! pass against the latest view attaches bandwidth usage, and one
//! transactional batch lands everything in the durable store. Invalid
//! addresses are classified once and never retried; accounts whose usage
//! lookup never resolves are persisted without it.

use crate::client::{ClientError, ClientHandle, ClientPool, NodeClient, NodeRole};
use crate::fetcher::{FetchLimits, Fetcher, ItemSource, TaskControl};
use crate::governor::Governor;
use async_trait::async_trait;
use metrics::SharedMetrics;
use records::{AccountRecord, Address};
use std::sync::Arc;
use store::{DurableStore, StoreError};
use tracing::info;

struct AccountSource;

#[async_trait]
impl ItemSource for AccountSource {
    type Item = Address;
    type Output = AccountRecord;

    fn role(&self) -> NodeRole {
        NodeRole::Solid
    }

    fn kind(&self) -> &'static str {
        "account"
    }

    fn validate(&self, item: &Address) -> bool {
        item.is_valid()
    }

    async fn fetch(
        &self,
        client: &ClientHandle,
        item: &Address,
    ) -> Result<AccountRecord, ClientError> {
        let account = client.fetch_account(item).await?;
        if account.address != *item {
            return Err(ClientError::Malformed {
                endpoint: client.endpoint().to_owned(),
            });
        }
        Ok(account)
    }
}

struct NetUsageSource;

#[async_trait]
impl ItemSource for NetUsageSource {
    type Item = AccountRecord;
    type Output = AccountRecord;

    fn role(&self) -> NodeRole {
        NodeRole::Latest
    }

    fn kind(&self) -> &'static str {
        "account_net"
    }

    async fn fetch(
        &self,
        client: &ClientHandle,
        item: &AccountRecord,
    ) -> Result<AccountRecord, ClientError> {
        let net = client.fetch_account_net(&item.address).await?;
        let mut enriched = item.clone();
        enriched.set_net(net);
        Ok(enriched)
    }
}

#[derive(Debug)]
pub struct AccountSyncReport {
    pub stored: usize,
    /// Structurally invalid addresses, never retried.
    pub bad: Vec<Address>,
    /// Addresses whose account state never resolved within the task bounds.
    pub unresolved: Vec<Address>,
}

pub struct AccountSync {
    pool: Arc<dyn ClientPool>,
    store: Arc<dyn DurableStore>,
    governor: Governor,
    limits: FetchLimits,
    metrics: SharedMetrics,
}

impl AccountSync {
    pub fn new(
        pool: Arc<dyn ClientPool>,
        store: Arc<dyn DurableStore>,
        governor: Governor,
        limits: FetchLimits,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            pool,
            store,
            governor,
            limits,
            metrics,
        }
    }

    /// Fetch, enrich, and persist the given addresses.
    pub async fn sync_accounts(
        &self,
        addresses: Vec<Address>,
        control: Arc<TaskControl>,
    ) -> Result<AccountSyncReport, StoreError> {
        let total = addresses.len();

        let accounts = Fetcher::new(
            Arc::new(AccountSource),
            Arc::clone(&self.pool),
            self.governor.clone(),
            self.limits,
            Arc::clone(&self.metrics),
        );
        let fetched = accounts.run(addresses, Arc::clone(&control)).await;

        let enrich = Fetcher::new(
            Arc::new(NetUsageSource),
            Arc::clone(&self.pool),
            self.governor.clone(),
            self.limits,
            Arc::clone(&self.metrics),
        );
        let enriched = enrich.run(fetched.done, control).await;

        // Usage attachment is best effort: unresolved records are stored as
        // fetched from the solid view.
        let mut records = enriched.done;
        records.extend(enriched.unresolved);

        let stored = self.store.upsert_accounts(&records).await?;
        info!(
            total,
            stored,
            bad = fetched.bad.len(),
            unresolved = fetched.unresolved.len(),
            "account sync finished"
        );

        Ok(AccountSyncReport {
            stored,
            bad: fetched.bad,
            unresolved: fetched.unresolved,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::NodeClient;
    use metrics::Metrics;
    use records::{BlockRecord, NetUsage, TipInfo};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct AccountNode {
        name: String,
        net_failures: AtomicUsize,
    }

    impl AccountNode {
        fn new(net_failures: usize) -> Arc<Self> {
            Arc::new(Self {
                name: "account-node".into(),
                net_failures: AtomicUsize::new(net_failures),
            })
        }
    }

    #[async_trait]
    impl NodeClient for AccountNode {
        fn endpoint(&self) -> &str {
            &self.name
        }

        async fn fetch_account(&self, address: &Address) -> Result<AccountRecord, ClientError> {
            Ok(AccountRecord {
                address: address.clone(),
                balance: 1_000,
                ..Default::default()
            })
        }

        async fn fetch_account_net(&self, _address: &Address) -> Result<NetUsage, ClientError> {
            if self
                .net_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(ClientError::Transport {
                    endpoint: self.name.clone(),
                    message: "dropped".into(),
                });
            }
            Ok(NetUsage {
                net_used: 7,
                ..Default::default()
            })
        }

        async fn fetch_block_by_number(&self, _number: u64) -> Result<BlockRecord, ClientError> {
            Err(ClientError::NotFound {
                endpoint: self.name.clone(),
            })
        }

        async fn fetch_block_range(
            &self,
            _start: u64,
            _end: u64,
        ) -> Result<Vec<BlockRecord>, ClientError> {
            Ok(vec![])
        }

        async fn fetch_tip_info(&self) -> Result<TipInfo, ClientError> {
            Ok(TipInfo::default())
        }
    }

    struct OneNodePool {
        node: ClientHandle,
    }

    impl ClientPool for OneNodePool {
        fn random_client(&self, _role: NodeRole) -> ClientHandle {
            self.node.clone()
        }
    }

    fn addr(i: usize) -> Address {
        Address::new(format!("TAccount{i:026}"))
    }

    fn account_sync(node: Arc<AccountNode>, store: Arc<store::MemoryStore>) -> AccountSync {
        AccountSync::new(
            Arc::new(OneNodePool { node }),
            store,
            Governor::new(),
            FetchLimits {
                branch_items: 8,
                error_ceiling: 3,
            },
            Arc::new(Metrics::new()),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn stores_accounts_with_usage_and_reports_bad_addresses() {
        let store = Arc::new(store::MemoryStore::new());
        let sync = account_sync(AccountNode::new(0), store.clone());

        let mut addresses: Vec<Address> = (0..20).map(addr).collect();
        addresses.push(Address::new("nope"));

        let report = sync
            .sync_accounts(addresses, TaskControl::unbounded())
            .await
            .unwrap();

        assert_eq!(report.stored, 20);
        assert_eq!(report.bad, vec![Address::new("nope")]);
        assert!(report.unresolved.is_empty());

        let acc = store.account(&addr(7)).unwrap();
        assert_eq!(acc.balance, 1_000);
        assert_eq!(acc.net.unwrap().net_used, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_usage_failures_are_retried_to_completion() {
        let store = Arc::new(store::MemoryStore::new());
        let sync = account_sync(AccountNode::new(2), store.clone());

        let report = sync
            .sync_accounts((0..10).map(addr).collect(), TaskControl::unbounded())
            .await
            .unwrap();

        assert_eq!(report.stored, 10);
        for i in 0..10 {
            let acc = store.account(&addr(i)).unwrap();
            assert!(acc.net.is_some(), "account {i} missing usage data");
        }
    }
}

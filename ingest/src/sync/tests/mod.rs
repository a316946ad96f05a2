mod verify_tests;

pub(crate) mod support {
    use crate::client::{ClientError, NodeClient};
    use async_trait::async_trait;
    use records::{AccountRecord, Address, BlockRecord, NetUsage, TipInfo};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    pub fn block(number: u64) -> BlockRecord {
        BlockRecord {
            number,
            hash: format!("{number:016x}"),
            parent_hash: format!("{:016x}", number.saturating_sub(1)),
            size: 1200,
            created_at: number as i64 * 3_000,
            tx_count: 2,
            ..Default::default()
        }
    }

    /// A full node serving `1..=tip`, with an optional hole set it refuses
    /// to serve in range responses (but may serve individually).
    pub struct RangeNode {
        pub name: String,
        pub tip: AtomicU64,
        /// Numbers omitted from `fetch_block_range` responses.
        pub range_holes: HashSet<u64>,
        /// Numbers this node cannot serve at all.
        pub dead_numbers: HashSet<u64>,
    }

    impl RangeNode {
        pub fn serving(tip: u64) -> Arc<Self> {
            Arc::new(Self {
                name: format!("full-{tip}"),
                tip: AtomicU64::new(tip),
                range_holes: HashSet::new(),
                dead_numbers: HashSet::new(),
            })
        }

        pub fn with_range_holes(tip: u64, holes: impl IntoIterator<Item = u64>) -> Arc<Self> {
            Arc::new(Self {
                name: format!("holey-{tip}"),
                tip: AtomicU64::new(tip),
                range_holes: holes.into_iter().collect(),
                dead_numbers: HashSet::new(),
            })
        }

        pub fn with_dead_numbers(tip: u64, dead: impl IntoIterator<Item = u64>) -> Arc<Self> {
            let dead: HashSet<u64> = dead.into_iter().collect();
            Arc::new(Self {
                name: format!("lossy-{tip}"),
                tip: AtomicU64::new(tip),
                range_holes: dead.clone(),
                dead_numbers: dead,
            })
        }
    }

    #[async_trait]
    impl NodeClient for RangeNode {
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
            let tip = self.tip.load(Ordering::SeqCst);
            if number == 0 || number > tip || self.dead_numbers.contains(&number) {
                return Err(ClientError::NotFound {
                    endpoint: self.name.clone(),
                });
            }
            Ok(block(number))
        }

        async fn fetch_block_range(
            &self,
            start: u64,
            end: u64,
        ) -> Result<Vec<BlockRecord>, ClientError> {
            let tip = self.tip.load(Ordering::SeqCst);
            Ok((start..end)
                .filter(|n| *n >= 1 && *n <= tip && !self.range_holes.contains(n))
                .map(block)
                .collect())
        }

        async fn fetch_tip_info(&self) -> Result<TipInfo, ClientError> {
            Ok(TipInfo {
                number: self.tip.load(Ordering::SeqCst),
                observed_at: 0,
            })
        }
    }
}

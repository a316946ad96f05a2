//! Range-completeness verification.
//!
//! A bulk window is only done when every expected identifier is actually
//! stored. Nodes under load return partial ranges, and a chain fork can make
//! previously served numbers disappear, so after storing a batch the driver
//! checks the stored identifier set against the expected one with a
//! sorted-search membership test, refetches whatever is missing one block at
//! a time, and repeats with a decrementing retry budget and bounded
//! exponential backoff. An exhausted budget propagates to the driver, which
//! redoes the whole window from scratch.

use super::config::backoff_delay;
use super::SyncError;
use crate::client::{ClientHandle, NodeClient};
use metrics::SharedMetrics;
use records::BlockRecord;
use std::sync::Arc;
use store::DurableStore;
use tracing::{debug, warn};

/// The identifiers a bulk pull of `[start, end)` must produce.
pub(crate) fn expected_ids(start: u64, end: u64) -> Vec<u64> {
    (start..end).collect()
}

/// Identifiers in `expected` that are absent from `stored`.
///
/// `stored` is sorted and binary-searched per expected identifier.
fn missing_ids(expected: &[u64], mut stored: Vec<u64>) -> Vec<u64> {
    stored.sort_unstable();
    expected
        .iter()
        .copied()
        .filter(|id| stored.binary_search(id).is_err())
        .collect()
}

/// Store `blocks`, verify coverage of `expected`, and refetch the missing
/// identifiers until the set is complete or `retries` runs out.
pub async fn verify_and_store(
    store: &Arc<dyn DurableStore>,
    client: &ClientHandle,
    metrics: &SharedMetrics,
    blocks: Vec<BlockRecord>,
    expected: Vec<u64>,
    mut retries: u32,
) -> Result<(), SyncError> {
    if blocks.is_empty() && expected.is_empty() {
        return Ok(());
    }

    let stored = store.upsert_blocks(&blocks).await?;
    let mut missing = missing_ids(&expected, stored);

    let mut round: u32 = 0;
    while !missing.is_empty() {
        if retries == 0 {
            warn!(
                missing = missing.len(),
                first = missing.first().copied(),
                "verification retries exhausted"
            );
            return Err(SyncError::RangeIncomplete { missing });
        }
        retries -= 1;
        metrics.inc_verify_retry();
        tokio::time::sleep(backoff_delay(round)).await;
        round += 1;

        debug!(
            missing = missing.len(),
            retries_left = retries,
            "refetching missing blocks individually"
        );

        // Individual lookups: a block the node cannot serve stays missing and
        // is retried next round.
        let mut refetched = Vec::with_capacity(missing.len());
        for number in &missing {
            match client.fetch_block_by_number(*number).await {
                Ok(block) if block.number == *number => refetched.push(block),
                Ok(_) | Err(_) => {}
            }
        }

        let stored = store.upsert_blocks(&refetched).await?;
        missing = missing_ids(&missing, stored);
    }

    Ok(())
}

#[cfg(test)]
mod unit {
    use super::*;

    #[test]
    fn expected_ids_are_half_open() {
        assert_eq!(expected_ids(3, 6), vec![3, 4, 5]);
        assert!(expected_ids(5, 5).is_empty());
    }

    #[test]
    fn missing_ids_finds_gaps() {
        let expected = vec![1, 2, 3, 4, 5];
        assert_eq!(missing_ids(&expected, vec![5, 1, 3]), vec![2, 4]);
        assert!(missing_ids(&expected, vec![4, 2, 5, 1, 3]).is_empty());
    }
}

use super::support::{block, RangeNode};
use crate::client::{ClientHandle, NodeClient};
use crate::sync::verify::{expected_ids, verify_and_store};
use crate::sync::SyncError;
use metrics::Metrics;
use std::sync::Arc;
use store::{DurableStore, MemoryStore, StoreError};

fn handles(node: Arc<RangeNode>) -> (Arc<dyn DurableStore>, ClientHandle) {
    (Arc::new(MemoryStore::new()), node)
}

async fn stored_numbers(store: &Arc<dyn DurableStore>) -> Vec<u64> {
    store
        .query_blocks(Default::default(), store::QueryOrder::Ascending, None)
        .await
        .unwrap()
        .into_iter()
        .map(|b| b.number)
        .collect()
}

#[tokio::test(start_paused = true)]
async fn fully_available_range_stores_every_identifier() {
    let node = RangeNode::serving(100);
    let (store, client) = handles(node.clone());
    let metrics = Arc::new(Metrics::new());

    let blocks = client.fetch_block_range(10, 30).await.unwrap();
    verify_and_store(&store, &client, &metrics, blocks, expected_ids(10, 30), 5)
        .await
        .unwrap();

    assert_eq!(stored_numbers(&store).await, (10..30).collect::<Vec<_>>());
}

#[tokio::test(start_paused = true)]
async fn partial_bulk_is_completed_by_individual_refetch() {
    // The bulk pull omits three numbers the node will serve individually.
    let node = RangeNode::with_range_holes(100, [12, 17, 25]);
    let (store, client) = handles(node.clone());
    let metrics = Arc::new(Metrics::new());

    let blocks = client.fetch_block_range(10, 30).await.unwrap();
    assert_eq!(blocks.len(), 17);

    verify_and_store(&store, &client, &metrics, blocks, expected_ids(10, 30), 5)
        .await
        .unwrap();

    assert_eq!(stored_numbers(&store).await, (10..30).collect::<Vec<_>>());
}

#[tokio::test(start_paused = true)]
async fn exhausted_budget_reports_the_missing_identifiers() {
    // Numbers 12 and 17 cannot be served at all.
    let node = RangeNode::with_dead_numbers(100, [12, 17]);
    let (store, client) = handles(node.clone());
    let metrics = Arc::new(Metrics::new());

    let blocks = client.fetch_block_range(10, 30).await.unwrap();
    let err = verify_and_store(&store, &client, &metrics, blocks, expected_ids(10, 30), 3)
        .await
        .unwrap_err();

    match err {
        SyncError::RangeIncomplete { missing } => assert_eq!(missing, vec![12, 17]),
        other => panic!("unexpected error: {other}"),
    }

    // Everything servable was still stored.
    let stored = stored_numbers(&store).await;
    assert!(!stored.contains(&12));
    assert_eq!(stored.len(), 18);
}

#[tokio::test(start_paused = true)]
async fn commit_failure_fails_the_batch() {
    let node = RangeNode::serving(100);
    let store = Arc::new(MemoryStore::new());
    store.set_fail_commits(true);
    let durable: Arc<dyn DurableStore> = store.clone();
    let client: ClientHandle = node;
    let metrics = Arc::new(Metrics::new());

    let blocks = vec![block(1), block(2)];
    let err = verify_and_store(&durable, &client, &metrics, blocks, expected_ids(1, 3), 3)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Store(StoreError::CommitFailed(_))));
}

#[tokio::test(start_paused = true)]
async fn empty_window_with_no_expectations_is_trivially_complete() {
    let node = RangeNode::serving(100);
    let (store, client) = handles(node);
    let metrics = Arc::new(Metrics::new());

    verify_and_store(&store, &client, &metrics, vec![], vec![], 0)
        .await
        .unwrap();
    assert!(stored_numbers(&store).await.is_empty());
}

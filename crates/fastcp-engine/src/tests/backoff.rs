//! Allocation backoff on not-replicated-yet refusals.

use super::helpers::{TestCluster, nodes};

const MB: u64 = 1024 * 1024;

#[tokio::test]
async fn test_not_replicated_yet_backs_off_then_succeeds() {
    let cluster = TestCluster::federated(1);
    cluster.namenode.add_file(
        "/src/a",
        &[64 * MB],
        vec![nodes(&["dn-a:50010", "dn-b:50010", "dn-c:50010"])],
    );
    // Refuse the first three allocations.
    *cluster.namenode.not_replicated_failures.lock().unwrap() = 3;

    let engine = cluster.engine().await;
    let started = std::time::Instant::now();
    engine.copy("/src/a", "/dst/a").await.unwrap();

    // Three 1 s sleeps happened before the successful allocation.
    assert!(
        started.elapsed() >= std::time::Duration::from_secs(3),
        "expected three backoff sleeps"
    );
    assert_eq!(*cluster.namenode.not_replicated_failures.lock().unwrap(), 0);
    assert_eq!(cluster.namenode.add_block_calls().len(), 1);
    assert_eq!(engine.status("/dst/a").unwrap().blocks_done, 1);
    assert!(cluster.namenode.deleted().is_empty());

    engine.shutdown().await;
}

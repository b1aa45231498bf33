//! Lease renewal and teardown.

use std::sync::atomic::Ordering;
use std::time::Duration;

use super::helpers::{TestCluster, nodes};

const MB: u64 = 1024 * 1024;

#[tokio::test]
async fn test_shutdown_closes_every_handle() {
    let cluster = TestCluster::federated(1);
    cluster.namenode.add_file(
        "/src/a",
        &[64 * MB],
        vec![nodes(&["dn-a:50010", "dn-b:50010", "dn-c:50010"])],
    );

    let engine = cluster.engine().await;
    engine.copy("/src/a", "/dst/a").await.unwrap();
    assert_eq!(engine.datanodes.len().await, 3);

    engine.shutdown().await;

    // Source and destination share one handle: closed exactly once.
    assert_eq!(cluster.namenode.close_calls.load(Ordering::SeqCst), 1);
    for dn in cluster.connector.all_datanodes() {
        assert!(dn.closed.load(Ordering::SeqCst), "{} not closed", dn.name);
    }
    assert!(engine.datanodes.is_empty().await);
}

#[tokio::test]
async fn test_double_shutdown_is_safe() {
    let cluster = TestCluster::federated(1);
    let engine = cluster.engine().await;

    engine.shutdown().await;
    engine.shutdown().await;

    assert_eq!(cluster.namenode.close_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_lease_renewed_in_background() {
    let cluster = TestCluster::federated(1);
    let engine = cluster.engine().await;

    tokio::time::sleep(Duration::from_millis(100)).await;

    let renewed = cluster.namenode.renewed();
    assert!(
        renewed.len() >= 2,
        "expected repeated renewals, saw {}",
        renewed.len()
    );
    assert!(renewed.iter().all(|c| c == engine.client_name()));
    assert!(engine.client_name().starts_with("FastCopy"));

    engine.shutdown().await;

    // No further renewals after shutdown.
    let after = cluster.namenode.renewed().len();
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(cluster.namenode.renewed().len(), after);
}

#[tokio::test]
async fn test_client_names_are_per_instance() {
    let cluster = TestCluster::federated(1);
    let a = cluster.engine().await;
    let b = cluster.engine().await;

    assert_ne!(a.client_name(), b.client_name());

    a.shutdown().await;
    b.shutdown().await;
}

//! End-to-end topologies against a real `redis-server` binary.
//!
//! Ignored by default; run with `cargo test -- --ignored` on a machine with
//! the binary on PATH.

use embers_cluster::{ClusterBuilder, SentinelGroupBuilder};

#[tokio::test]
#[ignore = "requires a redis-server binary on PATH"]
async fn four_node_cluster_becomes_active() {
    let cluster = ClusterBuilder::new()
        .server_ports(vec![7100, 7101, 7102, 7103])
        .replicates(1)
        .max_retries(5)
        .build()
        .unwrap();

    cluster.start().await.unwrap();
    assert!(cluster.is_active().await);

    cluster.stop().await.unwrap();
    assert!(!cluster.is_active().await);
}

#[tokio::test]
#[ignore = "requires a redis-server binary on PATH"]
async fn sentinel_group_starts_and_stops() {
    let group = SentinelGroupBuilder::new()
        .sentinel_ports(vec![27100, 27101, 27102])
        .server_ports(vec![7200, 7201, 7202])
        .quorum_size(2)
        .replication_group("bench", 2)
        .unwrap()
        .build()
        .unwrap();

    group.start().await.unwrap();
    assert!(group.is_active());

    group.stop().await.unwrap();
    assert!(!group.is_active());
}

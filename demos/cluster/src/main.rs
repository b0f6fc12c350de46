//! Boots a 4-node sharded cluster (2 masters, 1 replica each) and keeps it
//! running until interrupted. Needs a `redis-server` binary on PATH.

use tracing::info;

use embers_cluster::ClusterBuilder;
use embers_observe::{LoggerConfig, logger_init};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logger_init(&LoggerConfig::default())?;

    let cluster = ClusterBuilder::new()
        .server_ports(vec![7000, 7001, 7002, 7003])
        .replicates(1)
        .max_retries(5)
        .build()?;

    cluster.start().await?;
    info!("cluster serving on ports {:?}", cluster.ports());
    info!("active: {}", cluster.is_active().await);

    info!("press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;

    cluster.stop().await?;
    info!("cluster stopped");

    Ok(())
}

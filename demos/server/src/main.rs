//! Boots one master with a single replica, then tears both down.
//! Needs a `redis-server` binary on PATH.

use tracing::info;

use embers_core::ServerBuilder;
use embers_observe::{LoggerConfig, logger_init};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logger_init(&LoggerConfig::default())?;

    let master = ServerBuilder::new().port(6379).build()?;
    let replica = ServerBuilder::new()
        .port(6380)
        .slave_of("localhost", 6379)
        .build()?;

    master.start().await?;
    info!("master serving on {:?}", master.port());

    replica.start().await?;
    info!("replica serving on {:?}, following {:?}", replica.port(), master.port());

    info!(
        "master active: {}, replica active: {}",
        master.is_active(),
        replica.is_active()
    );

    replica.stop().await?;
    master.stop().await?;
    info!("both instances stopped");

    Ok(())
}

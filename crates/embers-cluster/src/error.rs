use thiserror::Error;

use embers_core::{BuildError, InstanceError};

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("a cluster requires at least 3 master nodes")]
    NotEnoughNodes,
    #[error("a cluster requires at least 1 replication")]
    NotEnoughReplicates,
    #[error("a cluster requires the replication factor to be less than the number of nodes")]
    TooManyReplicates,
    #[error("a cluster requires a retry budget of at least 1")]
    NoRetries,
    #[error("cluster did not converge after {retries} retries")]
    NotConverged { retries: usize },
    #[error("unexpected cluster state: {0}")]
    IllegalState(String),
    #[error("administrative command failed: {0}")]
    Admin(#[from] redis::RedisError),
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Instance(#[from] InstanceError),
}

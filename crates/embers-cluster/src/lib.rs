pub mod client;
pub mod error;
pub mod sentinel;
pub mod slots;
pub mod status;
pub mod topology;

pub use client::AdminClient;
pub use error::ClusterError;
pub use sentinel::{SentinelGroup, SentinelGroupBuilder};
pub use slots::{HASH_SLOTS, SlotRange, partition};
pub use status::ClusterStatus;
pub use topology::{Cluster, ClusterBuilder, ShardPlan, plan_shards};

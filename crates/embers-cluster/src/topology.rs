use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::debug;

use embers_core::{Instance, Node, NodeOutput, ServerBuilder, node::SequenceReader};

use crate::client::AdminClient;
use crate::error::ClusterError;
use crate::slots::{SlotRange, partition};
use crate::status::{ClusterStatus, parse_cluster_info};

const LOG_TARGET: &str = "embers::cluster";
const LOCAL_HOST: &str = "127.0.0.1";
const CONVERGENCE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Shard layout for one master: the slot range it owns and the nodes that
/// replicate it. Indices refer to the cluster's node list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardPlan {
    pub master: usize,
    pub range: SlotRange,
    pub replicas: Vec<usize>,
}

/// Plans shard ownership for `node_count` nodes with `replicates` replicas
/// per master: the first `node_count / (replicates + 1)` nodes become
/// masters, the remaining nodes replicate them round-robin.
pub fn plan_shards(node_count: usize, replicates: usize) -> Vec<ShardPlan> {
    let masters_count = node_count / (replicates + 1);
    let mut shards: Vec<ShardPlan> = partition(masters_count)
        .into_iter()
        .enumerate()
        .map(|(master, range)| ShardPlan {
            master,
            range,
            replicas: Vec::new(),
        })
        .collect();

    for (offset, node) in (masters_count..node_count).enumerate() {
        shards[offset % masters_count].replicas.push(node);
    }
    shards
}

/// A sharded cluster assembled from independently supervised instances.
///
/// Construction validates the topology parameters; `start` performs the
/// full bootstrap: member startup, join handshake, slot assignment,
/// convergence wait and replica wiring.
#[derive(Debug)]
pub struct Cluster {
    nodes: Vec<Instance>,
    replicates: usize,
    max_retries: usize,
}

impl Cluster {
    pub fn new(
        nodes: Vec<Instance>,
        replicates: usize,
        max_retries: usize,
    ) -> Result<Self, ClusterError> {
        if nodes.len() <= 2 {
            return Err(ClusterError::NotEnoughNodes);
        }
        if replicates < 1 {
            return Err(ClusterError::NotEnoughReplicates);
        }
        if replicates > nodes.len() - 1 {
            return Err(ClusterError::TooManyReplicates);
        }
        if max_retries < 1 {
            return Err(ClusterError::NoRetries);
        }
        Ok(Cluster {
            nodes,
            replicates,
            max_retries,
        })
    }

    pub fn nodes(&self) -> &[Instance] {
        &self.nodes
    }

    /// Starts every member and bootstraps them into one cluster. A member
    /// start failure aborts the whole operation; members that already
    /// started are left running for diagnosis.
    pub async fn start(&self) -> Result<(), ClusterError> {
        for node in &self.nodes {
            node.start().await?;
        }

        let shards = plan_shards(self.nodes.len(), self.replicates);
        self.join_cluster().await?;
        let shards = self.assign_slots(shards).await?;

        debug!(target: LOG_TARGET, "waiting for the cluster to converge");
        self.await_convergence().await?;
        debug!(target: LOG_TARGET, "cluster converged");

        self.assign_replicas(&shards).await?;
        Ok(())
    }

    /// Stops every member. Each member receives a stop attempt even when an
    /// earlier one fails; the first failure is reported afterwards.
    pub async fn stop(&self) -> Result<(), ClusterError> {
        let mut first_err = None;
        for node in &self.nodes {
            if let Err(e) = node.stop().await
                && first_err.is_none()
            {
                first_err = Some(e);
            }
        }
        match first_err {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Active only when every member reports active and the aggregate
    /// cluster state is ok.
    pub async fn is_active(&self) -> bool {
        if !self.nodes.iter().all(|node| node.is_active()) {
            return false;
        }
        matches!(self.aggregate_status().await, Ok(ClusterStatus::Ok))
    }

    pub fn ports(&self) -> Vec<u16> {
        self.nodes.iter().map(|node| node.port()).collect()
    }

    /// Peer discovery is gossip-propagated, so it is enough for every other
    /// node to meet node 0.
    async fn join_cluster(&self) -> Result<(), ClusterError> {
        let first_port = self.nodes[0].port();
        for node in &self.nodes[1..] {
            let mut client = AdminClient::connect(LOCAL_HOST, node.port()).await?;
            client.cluster_meet(LOCAL_HOST, first_port).await?;
        }
        Ok(())
    }

    async fn assign_slots(
        &self,
        shards: Vec<ShardPlan>,
    ) -> Result<Vec<(ShardPlan, String)>, ClusterError> {
        let mut assigned = Vec::with_capacity(shards.len());
        for shard in shards {
            let master = &self.nodes[shard.master];
            let mut client = AdminClient::connect(LOCAL_HOST, master.port()).await?;
            client.cluster_add_slots(&shard.range.slots()).await?;

            let node_id = client.node_id().await?;
            debug!(target: LOG_TARGET, %node_id, range = %shard.range, "slots assigned to master");
            assigned.push((shard, node_id));
        }
        Ok(assigned)
    }

    async fn await_convergence(&self) -> Result<(), ClusterError> {
        let mut retried = 0;
        while self.aggregate_status().await? != ClusterStatus::Ok {
            sleep(CONVERGENCE_POLL_INTERVAL).await;
            retried += 1;
            if retried == self.max_retries {
                return Err(ClusterError::NotConverged { retries: retried });
            }
        }
        Ok(())
    }

    async fn aggregate_status(&self) -> Result<ClusterStatus, ClusterError> {
        let mut client = AdminClient::connect(LOCAL_HOST, self.nodes[0].port()).await?;
        let info = client.cluster_info().await?;
        parse_cluster_info(&info)
    }

    async fn assign_replicas(
        &self,
        shards: &[(ShardPlan, String)],
    ) -> Result<(), ClusterError> {
        for (shard, node_id) in shards {
            for replica in &shard.replicas {
                let mut client =
                    AdminClient::connect(LOCAL_HOST, self.nodes[*replica].port()).await?;
                client.cluster_replicate(node_id).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Node for Cluster {
    type Error = ClusterError;

    async fn start(&self) -> Result<(), ClusterError> {
        Cluster::start(self).await
    }

    async fn stop(&self) -> Result<(), ClusterError> {
        Cluster::stop(self).await
    }

    async fn is_active(&self) -> bool {
        Cluster::is_active(self).await
    }

    fn ports(&self) -> Vec<u16> {
        Cluster::ports(self)
    }

    fn output(&self) -> NodeOutput {
        let sources = self.nodes.iter().map(|node| node.output()).collect();
        Box::new(SequenceReader::new(sources))
    }
}

/// Assembles a [`Cluster`] of identically configured data nodes, one per
/// port, each carrying the settings cluster mode requires.
pub struct ClusterBuilder {
    server_builder: ServerBuilder,
    ports: Vec<u16>,
    replicates: usize,
    max_retries: usize,
}

impl ClusterBuilder {
    pub fn new() -> Self {
        ClusterBuilder {
            server_builder: ServerBuilder::new(),
            ports: Vec::new(),
            replicates: 1,
            max_retries: 5,
        }
    }

    pub fn server_builder(mut self, server_builder: ServerBuilder) -> Self {
        self.server_builder = server_builder;
        self
    }

    pub fn server_ports(mut self, ports: Vec<u16>) -> Self {
        self.ports = ports;
        self
    }

    pub fn replicates(mut self, replicates: usize) -> Self {
        self.replicates = replicates;
        self
    }

    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn build(&self) -> Result<Cluster, ClusterError> {
        let mut nodes = Vec::with_capacity(self.ports.len());
        for port in &self.ports {
            nodes.push(self.build_node(*port)?);
        }
        Cluster::new(nodes, self.replicates, self.max_retries)
    }

    fn build_node(&self, port: u16) -> Result<Instance, ClusterError> {
        let instance = self
            .server_builder
            .clone()
            .setting("cluster-enabled yes")?
            .setting(format!("cluster-config-file nodes-{port}.conf"))?
            .setting("cluster-node-timeout 2000")?
            .setting("appendonly yes")?
            .setting(format!("dbfilename dump-{port}.rdb"))?
            .port(port)
            .build()?;
        Ok(instance)
    }
}

impl Default for ClusterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use regex::Regex;

    use super::*;
    use crate::slots::HASH_SLOTS;

    fn node(port: u16) -> Instance {
        let args = vec!["redis-server".to_string(), "--port".to_string(), port.to_string()];
        Instance::new(args, port, Regex::new("Ready to accept connections").unwrap())
    }

    fn nodes(count: usize) -> Vec<Instance> {
        (0..count).map(|i| node(3000 + i as u16)).collect()
    }

    #[test]
    fn rejects_fewer_than_three_nodes() {
        let err = Cluster::new(nodes(1), 1, 5).unwrap_err();
        assert_eq!(err.to_string(), "a cluster requires at least 3 master nodes");

        let err = Cluster::new(nodes(2), 1, 5).unwrap_err();
        assert_eq!(err.to_string(), "a cluster requires at least 3 master nodes");
    }

    #[test]
    fn rejects_a_zero_replication_factor() {
        let err = Cluster::new(nodes(3), 0, 5).unwrap_err();
        assert_eq!(err.to_string(), "a cluster requires at least 1 replication");
    }

    #[test]
    fn rejects_more_replicates_than_peers() {
        let err = Cluster::new(nodes(3), 10, 5).unwrap_err();
        assert_eq!(
            err.to_string(),
            "a cluster requires the replication factor to be less than the number of nodes"
        );
    }

    #[test]
    fn rejects_an_empty_retry_budget() {
        let err = Cluster::new(nodes(3), 1, 0).unwrap_err();
        assert_eq!(err.to_string(), "a cluster requires a retry budget of at least 1");
    }

    #[test]
    fn accepts_a_minimal_topology() {
        let cluster = Cluster::new(nodes(3), 1, 5).unwrap();
        assert_eq!(cluster.ports(), vec![3000, 3001, 3002]);
    }

    #[test]
    fn four_nodes_with_one_replicate_make_two_shards() {
        let shards = plan_shards(4, 1);
        assert_eq!(shards.len(), 2);
        assert_eq!(shards[0].master, 0);
        assert_eq!(shards[1].master, 1);
        assert_eq!(shards[0].replicas, vec![2]);
        assert_eq!(shards[1].replicas, vec![3]);

        let total: u32 = shards.iter().map(|s| s.range.size()).sum();
        assert_eq!(total, HASH_SLOTS);
    }

    #[test]
    fn replicas_cycle_over_the_masters() {
        let shards = plan_shards(9, 2);
        assert_eq!(shards.len(), 3);
        assert_eq!(shards[0].replicas, vec![3, 6]);
        assert_eq!(shards[1].replicas, vec![4, 7]);
        assert_eq!(shards[2].replicas, vec![5, 8]);
    }

    #[test]
    fn three_nodes_collapse_to_a_single_master() {
        let shards = plan_shards(3, 1);
        assert_eq!(shards.len(), 1);
        assert_eq!(shards[0].range, SlotRange::new(0, 16383));
        assert_eq!(shards[0].replicas, vec![1, 2]);
    }
}

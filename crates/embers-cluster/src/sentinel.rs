use std::time::Duration;

use async_trait::async_trait;

use embers_core::{
    BuildError, EphemeralPortProvider, Instance, InstanceError, Node, NodeOutput,
    PortProvider, PredefinedPortProvider, SentinelBuilder, SequencePortProvider,
    ServerBuilder, node::SequenceReader,
};

/// One named master/replica group, recorded as ports before any instance
/// is built.
#[derive(Debug)]
struct ReplicationGroup {
    master_name: String,
    master_port: u16,
    replica_ports: Vec<u16>,
}

/// Sentinel-monitored replication groups behaving as one composite node:
/// a set of monitor instances watching every group, plus one master and
/// its replicas per group.
pub struct SentinelGroup {
    sentinels: Vec<Instance>,
    servers: Vec<Instance>,
}

impl SentinelGroup {
    pub fn sentinels(&self) -> &[Instance] {
        &self.sentinels
    }

    pub fn servers(&self) -> &[Instance] {
        &self.servers
    }

    pub fn sentinel_ports(&self) -> Vec<u16> {
        self.sentinels.iter().map(|node| node.port()).collect()
    }

    pub fn server_ports(&self) -> Vec<u16> {
        self.servers.iter().map(|node| node.port()).collect()
    }

    fn members(&self) -> impl Iterator<Item = &Instance> {
        self.sentinels.iter().chain(self.servers.iter())
    }

    /// Starts all monitors, then all data nodes.
    pub async fn start(&self) -> Result<(), InstanceError> {
        for member in self.members() {
            member.start().await?;
        }
        Ok(())
    }

    /// Stops all monitors, then all data nodes. Every member receives a
    /// stop attempt; the first failure is reported afterwards.
    pub async fn stop(&self) -> Result<(), InstanceError> {
        let mut first_err = None;
        for member in self.members() {
            if let Err(e) = member.stop().await
                && first_err.is_none()
            {
                first_err = Some(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn is_active(&self) -> bool {
        self.members().all(|member| member.is_active())
    }

    pub fn ports(&self) -> Vec<u16> {
        self.members().map(|member| member.port()).collect()
    }

    pub fn output(&self) -> NodeOutput {
        let sources = self.members().map(|member| member.output()).collect();
        Box::new(SequenceReader::new(sources))
    }
}

#[async_trait]
impl Node for SentinelGroup {
    type Error = InstanceError;

    async fn start(&self) -> Result<(), InstanceError> {
        SentinelGroup::start(self).await
    }

    async fn stop(&self) -> Result<(), InstanceError> {
        SentinelGroup::stop(self).await
    }

    async fn is_active(&self) -> bool {
        SentinelGroup::is_active(self)
    }

    fn ports(&self) -> Vec<u16> {
        SentinelGroup::ports(self)
    }

    fn output(&self) -> NodeOutput {
        SentinelGroup::output(self)
    }
}

/// Assembles a [`SentinelGroup`]. Monitor ports and data-node ports come
/// from independent allocation policies; replication groups draw their
/// master and replica ports at registration time.
#[derive(Debug)]
pub struct SentinelGroupBuilder {
    sentinel_builder: SentinelBuilder,
    server_builder: ServerBuilder,
    sentinel_count: usize,
    quorum_size: u32,
    sentinel_ports: Box<dyn PortProvider>,
    group_ports: Box<dyn PortProvider>,
    groups: Vec<ReplicationGroup>,
}

impl SentinelGroupBuilder {
    pub fn new() -> Self {
        SentinelGroupBuilder {
            sentinel_builder: SentinelBuilder::new(),
            server_builder: ServerBuilder::new(),
            sentinel_count: 1,
            quorum_size: 1,
            sentinel_ports: Box::new(SequencePortProvider::new(26379)),
            group_ports: Box::new(SequencePortProvider::new(6379)),
            groups: Vec::new(),
        }
    }

    pub fn sentinel_builder(mut self, sentinel_builder: SentinelBuilder) -> Self {
        self.sentinel_builder = sentinel_builder;
        self
    }

    pub fn server_builder(mut self, server_builder: ServerBuilder) -> Self {
        self.server_builder = server_builder;
        self
    }

    /// Fixed monitor ports; also pins the monitor count to the list length.
    pub fn sentinel_ports(mut self, ports: Vec<u16>) -> Self {
        self.sentinel_count = ports.len();
        self.sentinel_ports = Box::new(PredefinedPortProvider::new(ports));
        self
    }

    /// Fixed data-node ports for subsequently registered groups.
    pub fn server_ports(mut self, ports: Vec<u16>) -> Self {
        self.group_ports = Box::new(PredefinedPortProvider::new(ports));
        self
    }

    pub fn ephemeral_sentinels(mut self) -> Self {
        self.sentinel_ports = Box::new(EphemeralPortProvider::new());
        self
    }

    pub fn ephemeral_servers(mut self) -> Self {
        self.group_ports = Box::new(EphemeralPortProvider::new());
        self
    }

    pub fn ephemeral(self) -> Self {
        self.ephemeral_sentinels().ephemeral_servers()
    }

    pub fn sentinel_count(mut self, count: usize) -> Self {
        self.sentinel_count = count;
        self
    }

    pub fn sentinel_starting_port(mut self, port: u16) -> Self {
        self.sentinel_ports = Box::new(SequencePortProvider::new(port));
        self
    }

    pub fn quorum_size(mut self, quorum: u32) -> Self {
        self.quorum_size = quorum;
        self
    }

    /// Registers one master/replica group, drawing its ports immediately.
    pub fn replication_group(
        mut self,
        master_name: impl Into<String>,
        replica_count: usize,
    ) -> Result<Self, BuildError> {
        let master_port = self.group_ports.next()?;
        let mut replica_ports = Vec::with_capacity(replica_count);
        for _ in 0..replica_count {
            replica_ports.push(self.group_ports.next()?);
        }
        self.groups.push(ReplicationGroup {
            master_name: master_name.into(),
            master_port,
            replica_ports,
        });
        Ok(self)
    }

    pub fn echo_output(mut self, echo: bool) -> Self {
        self.sentinel_builder = self.sentinel_builder.echo_output(echo);
        self.server_builder = self.server_builder.echo_output(echo);
        self
    }

    pub fn startup_timeout(mut self, startup_timeout: Duration) -> Self {
        self.sentinel_builder = self.sentinel_builder.startup_timeout(startup_timeout);
        self.server_builder = self.server_builder.startup_timeout(startup_timeout);
        self
    }

    pub fn build(mut self) -> Result<SentinelGroup, BuildError> {
        let sentinels = self.build_sentinels()?;
        let servers = self.build_servers()?;
        Ok(SentinelGroup { sentinels, servers })
    }

    fn build_sentinels(&mut self) -> Result<Vec<Instance>, BuildError> {
        let mut sentinels = Vec::with_capacity(self.sentinel_count);
        for _ in 0..self.sentinel_count {
            let port = self.sentinel_ports.next()?;
            let mut builder = self.sentinel_builder.clone().port(port);
            for group in &self.groups {
                builder = builder
                    .master_name(group.master_name.clone())
                    .master_port(group.master_port)
                    .quorum_size(self.quorum_size)
                    .add_replication_group()?;
            }
            sentinels.push(builder.build()?);
        }
        Ok(sentinels)
    }

    fn build_servers(&self) -> Result<Vec<Instance>, BuildError> {
        let mut servers = Vec::new();
        for group in &self.groups {
            servers.push(self.server_builder.clone().port(group.master_port).build()?);
            for replica_port in &group.replica_ports {
                servers.push(
                    self.server_builder
                        .clone()
                        .port(*replica_port)
                        .slave_of("localhost", group.master_port)
                        .build()?,
                );
            }
        }
        Ok(servers)
    }
}

impl Default for SentinelGroupBuilder {
    fn default() -> Self {
        Self::new()
    }
}

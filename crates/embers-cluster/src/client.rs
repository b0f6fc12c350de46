use redis::aio::MultiplexedConnection;

use crate::error::ClusterError;

/// Short-lived administrative connection to one running node.
///
/// Every method maps to a single synchronous cluster-management command.
/// The connection is released when the client is dropped, so callers scope
/// one client per call sequence.
pub struct AdminClient {
    con: MultiplexedConnection,
}

impl AdminClient {
    pub async fn connect(host: &str, port: u16) -> Result<Self, ClusterError> {
        let client = redis::Client::open(format!("redis://{host}:{port}/"))?;
        let con = client.get_multiplexed_async_connection().await?;
        Ok(AdminClient { con })
    }

    /// Raw `CLUSTER INFO` text; the first line carries the aggregate state.
    pub async fn cluster_info(&mut self) -> Result<String, ClusterError> {
        let raw: String = redis::cmd("CLUSTER")
            .arg("INFO")
            .query_async(&mut self.con)
            .await?;
        Ok(raw)
    }

    pub async fn cluster_meet(&mut self, host: &str, port: u16) -> Result<(), ClusterError> {
        let _: () = redis::cmd("CLUSTER")
            .arg("MEET")
            .arg(host)
            .arg(port)
            .query_async(&mut self.con)
            .await?;
        Ok(())
    }

    pub async fn cluster_add_slots(&mut self, slots: &[u16]) -> Result<(), ClusterError> {
        let mut cmd = redis::cmd("CLUSTER");
        cmd.arg("ADDSLOTS");
        for slot in slots {
            cmd.arg(*slot);
        }
        let _: () = cmd.query_async(&mut self.con).await?;
        Ok(())
    }

    /// Raw `CLUSTER NODES` topology text as reported by this node.
    pub async fn cluster_nodes(&mut self) -> Result<String, ClusterError> {
        let raw: String = redis::cmd("CLUSTER")
            .arg("NODES")
            .query_async(&mut self.con)
            .await?;
        Ok(raw)
    }

    /// The identifier this node assigned to itself.
    pub async fn node_id(&mut self) -> Result<String, ClusterError> {
        let raw = self.cluster_nodes().await?;
        Ok(parse_node_id(&raw))
    }

    pub async fn cluster_replicate(&mut self, node_id: &str) -> Result<(), ClusterError> {
        let _: () = redis::cmd("CLUSTER")
            .arg("REPLICATE")
            .arg(node_id)
            .query_async(&mut self.con)
            .await?;
        Ok(())
    }
}

/// First token of `CLUSTER NODES` output, ahead of any space or colon.
pub fn parse_node_id(raw: &str) -> String {
    raw.split([' ', ':']).next().unwrap_or_default().to_string()
}

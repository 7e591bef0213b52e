//! Cluster harness: spin up small clusters on loopback ports.

use crate::config::StoreConfig;
use crate::error::Result;
use crate::store::StoreNode;
use crate::types::Position;
use std::sync::Arc;
use std::time::Duration;

/// Reserve a loopback address with a free port.
///
/// The port is released before the node binds it, so a parallel process
/// could in principle steal it; good enough for tests.
pub fn free_addr() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    addr.to_string()
}

/// Poll a condition until it holds or the deadline passes.
pub async fn wait_until<F>(timeout: Duration, condition: F) -> bool
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// A small cluster of started nodes, joined through the first one.
pub struct TestCluster {
    pub nodes: Vec<Arc<StoreNode>>,
}

impl TestCluster {
    /// Start one node per pinned position and join them all through the
    /// first.
    pub async fn start(
        positions: &[Position],
        redundancy: usize,
        tick: Duration,
    ) -> Result<Self> {
        let mut nodes = Vec::with_capacity(positions.len());
        for position in positions {
            let config = StoreConfig::new(free_addr())
                .with_redundancy(redundancy)
                .with_sync_interval(tick)
                .with_position(*position);
            let node = StoreNode::new(config);
            node.start().await?;
            nodes.push(node);
        }

        let seed = nodes[0].addr().to_string();
        for node in &nodes[1..] {
            node.join(&seed).await?;
        }
        Ok(Self { nodes })
    }

    /// True once every node's ring holds every cluster member.
    pub fn converged(&self) -> bool {
        self.nodes.iter().all(|node| {
            let ring = node.routing().ring();
            ring.len() == self.nodes.len()
                && self.nodes.iter().all(|n| ring.contains_addr(n.addr()))
        })
    }

    /// Stop every node.
    pub fn stop_all(&self) {
        for node in &self.nodes {
            node.stop();
        }
    }
}

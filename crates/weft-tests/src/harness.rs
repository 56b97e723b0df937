//! Multi-node test network.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::info;

use crate::node::TestNode;

/// A set of running test nodes.
pub struct TestNetwork {
    nodes: Vec<Arc<TestNode>>,
}

impl TestNetwork {
    /// Creates an empty test network.
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Starts `count` nodes.
    pub async fn with_nodes(
        count: usize,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let mut network = Self::new();
        for _ in 0..count {
            network.add_node().await?;
        }
        Ok(network)
    }

    /// Starts one more node.
    pub async fn add_node(
        &mut self,
    ) -> Result<Arc<TestNode>, Box<dyn std::error::Error + Send + Sync>> {
        let node = Arc::new(TestNode::start().await?);
        self.nodes.push(node.clone());
        info!(total = self.nodes.len(), "added node to test network");
        Ok(node)
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// All nodes.
    pub fn nodes(&self) -> &[Arc<TestNode>] {
        &self.nodes
    }

    /// A node by index.
    pub fn node(&self, index: usize) -> &Arc<TestNode> {
        &self.nodes[index]
    }

    /// Every node bootstraps to every other; gives deliveries a moment to
    /// land before returning.
    pub async fn bootstrap_mesh(&self) {
        for (i, node) in self.nodes.iter().enumerate() {
            let others: Vec<String> = self
                .nodes
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, other)| other.address())
                .collect();
            node.network.bootstrap(&others).await;
        }
        sleep(Duration::from_millis(100)).await;
    }

    /// Every node except the hub bootstraps to the hub.
    pub async fn bootstrap_star(&self, hub: usize) {
        let hub_address = self.nodes[hub].address();
        for (i, node) in self.nodes.iter().enumerate() {
            if i != hub {
                node.network.bootstrap(&[hub_address.clone()]).await;
            }
        }
        sleep(Duration::from_millis(100)).await;
    }
}

impl Default for TestNetwork {
    fn default() -> Self {
        Self::new()
    }
}

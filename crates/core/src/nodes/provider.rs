//! Node health and topology provider.
//!
//! Liveness is decided elsewhere (heartbeats, stale-node detection). The
//! core only asks which nodes are currently healthy.

use async_trait::async_trait;
use pm_protocol::node_models::{NodeDetails, NodeId};
use std::collections::{BTreeMap, HashSet};
use tokio::sync::RwLock;

#[async_trait]
pub trait NodeProvider: Send + Sync {
    /// All nodes currently considered healthy.
    async fn healthy_nodes(&self) -> Vec<NodeDetails>;

    /// Whether `node` is currently healthy.
    async fn is_healthy(&self, node: &NodeId) -> bool;
}

/// An in-memory node inventory whose health can be toggled.
///
/// Used by the daemon with the inventory from `nodes/*.yaml`, and by tests.
#[derive(Debug, Default)]
pub struct StaticNodeProvider {
    nodes: RwLock<BTreeMap<NodeId, NodeDetails>>,
    unhealthy: RwLock<HashSet<NodeId>>,
}

impl StaticNodeProvider {
    /// Create a provider where every given node starts healthy.
    pub fn new(nodes: impl IntoIterator<Item = NodeDetails>) -> Self {
        Self {
            nodes: RwLock::new(nodes.into_iter().map(|n| (n.id, n)).collect()),
            unhealthy: RwLock::new(HashSet::new()),
        }
    }

    /// Register a node, healthy.
    pub async fn add_node(&self, node: NodeDetails) {
        self.unhealthy.write().await.remove(&node.id);
        self.nodes.write().await.insert(node.id, node);
    }

    /// Mark a node healthy or unhealthy. Unknown nodes are ignored.
    pub async fn set_healthy(&self, node: &NodeId, healthy: bool) {
        if !self.nodes.read().await.contains_key(node) {
            return;
        }
        let mut unhealthy = self.unhealthy.write().await;
        if healthy {
            unhealthy.remove(node);
        } else {
            unhealthy.insert(*node);
        }
    }

    /// Every registered node regardless of health.
    pub async fn all_nodes(&self) -> Vec<NodeDetails> {
        self.nodes.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl NodeProvider for StaticNodeProvider {
    async fn healthy_nodes(&self) -> Vec<NodeDetails> {
        let nodes = self.nodes.read().await;
        let unhealthy = self.unhealthy.read().await;
        nodes
            .values()
            .filter(|n| !unhealthy.contains(&n.id))
            .cloned()
            .collect()
    }

    async fn is_healthy(&self, node: &NodeId) -> bool {
        self.nodes.read().await.contains_key(node) && !self.unhealthy.read().await.contains(node)
    }
}

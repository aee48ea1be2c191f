//! Node selection for new pipelines.
//!
//! Which nodes are chosen is fully determined by the healthy-node pool, the
//! exclusion list and current engagement: eligible nodes are ranked by the
//! number of non-closed pipelines they serve (then by id), distinct network
//! locations are taken first, and remaining slots are filled in rank order.
//! Only the member order of the result is randomized, to spread leadership
//! load; a fixed seed makes that order reproducible too.

use crate::error::{PipelineError, PipelineResult};
use crate::nodes::provider::NodeProvider;
use crate::state::store::PipelineStateStore;
use pm_protocol::node_models::{NodeDetails, NodeId};
use pm_protocol::pipeline_models::{PipelineId, ReplicationConfig};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Nodes and pipelines a selection must avoid.
///
/// Excluding a pipeline excludes every one of its members.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExcludeList {
    pub nodes: HashSet<NodeId>,
    pub pipelines: HashSet<PipelineId>,
}

impl ExcludeList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node(mut self, node: NodeId) -> Self {
        self.nodes.insert(node);
        self
    }

    pub fn with_pipeline(mut self, pipeline: PipelineId) -> Self {
        self.pipelines.insert(pipeline);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.pipelines.is_empty()
    }
}

/// Chooses member nodes for new pipelines.
pub struct NodeSelector {
    provider: Arc<dyn NodeProvider>,
    store: Arc<PipelineStateStore>,
    /// Zero disables the engagement limit.
    max_pipelines_per_node: usize,
    rng: Mutex<StdRng>,
}

impl NodeSelector {
    /// Create a selector.
    ///
    /// # Arguments
    ///
    /// * `provider` - Source of healthy nodes
    /// * `store` - Used to resolve excluded pipelines and node engagement
    /// * `max_pipelines_per_node` - Engagement limit, zero for none
    /// * `seed` - Seed for member ordering; entropy when `None`
    pub fn new(
        provider: Arc<dyn NodeProvider>,
        store: Arc<PipelineStateStore>,
        max_pipelines_per_node: usize,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            provider,
            store,
            max_pipelines_per_node,
            rng: Mutex::new(rng),
        }
    }

    /// Select exactly `config.required_nodes()` distinct healthy nodes.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if the factor is outside the type's domain
    /// - `InsufficientNodes` if fewer eligible nodes exist than required
    pub async fn select(&self, config: ReplicationConfig, exclude: &ExcludeList) -> PipelineResult<Vec<NodeDetails>> {
        if !config.is_valid() {
            return Err(PipelineError::InvalidArgument(format!(
                "factor {:?} is not supported by {:?}",
                config.factor, config.replication_type
            )));
        }

        let mut excluded = exclude.nodes.clone();
        for pipeline in &exclude.pipelines {
            // Unknown pipelines have no members to avoid.
            if let Ok(pipeline) = self.store.get(*pipeline).await {
                excluded.extend(pipeline.node_ids());
            }
        }

        let candidates: Vec<NodeDetails> = self
            .provider
            .healthy_nodes()
            .await
            .into_iter()
            .filter(|node| !excluded.contains(&node.id))
            .collect();
        let ids: Vec<NodeId> = candidates.iter().map(|node| node.id).collect();
        let engagement = self.store.node_engagement(&ids).await;

        let mut eligible: Vec<(usize, NodeDetails)> = candidates
            .into_iter()
            .map(|node| (engagement.get(&node.id).copied().unwrap_or(0), node))
            .filter(|(engaged, _)| self.max_pipelines_per_node == 0 || *engaged < self.max_pipelines_per_node)
            .collect();

        let required = config.required_nodes();
        if eligible.len() < required {
            tracing::debug!(%config, required, available = eligible.len(), "not enough eligible nodes");
            return Err(PipelineError::InsufficientNodes {
                config,
                required,
                available: eligible.len(),
            });
        }

        eligible.sort_by(|(a_engaged, a), (b_engaged, b)| a_engaged.cmp(b_engaged).then(a.id.cmp(&b.id)));
        let mut chosen = spread_across_locations(eligible.into_iter().map(|(_, node)| node), required);

        {
            let mut rng = match self.rng.lock() {
                Ok(rng) => rng,
                Err(poisoned) => poisoned.into_inner(),
            };
            chosen.shuffle(&mut *rng);
        }

        tracing::debug!(%config, nodes = ?chosen.iter().map(|n| n.hostname.as_str()).collect::<Vec<_>>(), "selected pipeline nodes");
        Ok(chosen)
    }
}

/// Take `count` nodes from `ranked`, preferring one node per network location.
fn spread_across_locations(ranked: impl Iterator<Item = NodeDetails>, count: usize) -> Vec<NodeDetails> {
    let mut chosen = Vec::with_capacity(count);
    let mut leftovers = Vec::new();
    let mut locations = HashSet::new();

    for node in ranked {
        if chosen.len() < count && locations.insert(node.network_location.clone()) {
            chosen.push(node);
        } else {
            leftovers.push(node);
        }
    }

    let missing = count.saturating_sub(chosen.len());
    chosen.extend(leftovers.into_iter().take(missing));
    chosen
}

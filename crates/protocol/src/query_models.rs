//! Filter structure for pipeline queries.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::node_models::NodeId;
use crate::pipeline_models::{Pipeline, PipelineId, PipelineState, ReplicationConfig, ReplicationFactor, ReplicationType};

/// Optional filters applied when listing pipelines.
///
/// Every filter left unset matches all pipelines. Exclusion sets drop
/// pipelines that contain any excluded node or whose id is excluded, which
/// lets allocation avoid recently failed nodes and pipelines.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct PipelineQuery {
    #[serde(default)]
    pub replication_type: Option<ReplicationType>,

    #[serde(default)]
    pub factor: Option<ReplicationFactor>,

    #[serde(default)]
    pub state: Option<PipelineState>,

    #[serde(default)]
    pub exclude_nodes: HashSet<NodeId>,

    #[serde(default)]
    pub exclude_pipelines: HashSet<PipelineId>,
}

impl PipelineQuery {
    /// A query matching every pipeline.
    pub fn all() -> Self {
        Self::default()
    }

    /// A query matching one replication descriptor.
    pub fn for_config(config: ReplicationConfig) -> Self {
        Self::default()
            .with_type(config.replication_type)
            .with_factor(config.factor)
    }

    pub fn with_type(mut self, replication_type: ReplicationType) -> Self {
        self.replication_type = Some(replication_type);
        self
    }

    pub fn with_factor(mut self, factor: ReplicationFactor) -> Self {
        self.factor = Some(factor);
        self
    }

    pub fn with_state(mut self, state: PipelineState) -> Self {
        self.state = Some(state);
        self
    }

    /// Exclude pipelines that contain any of the given nodes.
    pub fn excluding_nodes(mut self, nodes: impl IntoIterator<Item = NodeId>) -> Self {
        self.exclude_nodes.extend(nodes);
        self
    }

    /// Exclude the given pipelines by id.
    pub fn excluding_pipelines(mut self, pipelines: impl IntoIterator<Item = PipelineId>) -> Self {
        self.exclude_pipelines.extend(pipelines);
        self
    }

    /// Whether `pipeline` satisfies every filter of this query.
    pub fn matches(&self, pipeline: &Pipeline) -> bool {
        if self.replication_type.is_some_and(|t| t != pipeline.replication_type) {
            return false;
        }
        if self.factor.is_some_and(|f| f != pipeline.factor) {
            return false;
        }
        if self.state.is_some_and(|s| s != pipeline.state) {
            return false;
        }
        if self.exclude_pipelines.contains(&pipeline.id) {
            return false;
        }
        !pipeline.node_ids().any(|n| self.exclude_nodes.contains(&n))
    }
}

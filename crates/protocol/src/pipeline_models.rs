//! Pipeline entity, replication descriptor and lifecycle state.
//!
//! A pipeline is a fixed group of storage nodes that together hold the
//! replicas of a set of containers. Its membership and replication
//! descriptor never change after creation; only its lifecycle state moves.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::node_models::{NodeDetails, NodeId};

/// Globally unique pipeline identifier.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct PipelineId(pub Uuid);

impl PipelineId {
    /// Generate a fresh random pipeline id.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for PipelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a data container.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ContainerId(pub u64);

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Replication protocol used by a pipeline.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReplicationType {
    /// A single node holding the only replica.
    Standalone,

    /// Quorum-based replication across all members.
    Quorum,
}

impl ReplicationType {
    /// Factors this replication type can be configured with.
    pub fn allowed_factors(self) -> &'static [ReplicationFactor] {
        match self {
            ReplicationType::Standalone => &[ReplicationFactor::One],
            ReplicationType::Quorum => &[ReplicationFactor::One, ReplicationFactor::Three],
        }
    }

    /// Whether `factor` lies in this type's factor domain.
    pub fn supports(self, factor: ReplicationFactor) -> bool {
        self.allowed_factors().contains(&factor)
    }
}

/// Number of member nodes of a pipeline.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReplicationFactor {
    One,
    Three,
}

impl ReplicationFactor {
    /// Member count this factor requires.
    pub fn number(self) -> usize {
        match self {
            ReplicationFactor::One => 1,
            ReplicationFactor::Three => 3,
        }
    }
}

/// Replication descriptor: protocol plus degree of redundancy.
///
/// Pools of open pipelines are maintained per descriptor.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub struct ReplicationConfig {
    #[serde(rename = "type")]
    pub replication_type: ReplicationType,
    pub factor: ReplicationFactor,
}

impl ReplicationConfig {
    pub fn new(replication_type: ReplicationType, factor: ReplicationFactor) -> Self {
        Self {
            replication_type,
            factor,
        }
    }

    /// Whether the factor is within the replication type's domain.
    pub fn is_valid(&self) -> bool {
        self.replication_type.supports(self.factor)
    }

    /// Required number of member nodes.
    pub fn required_nodes(&self) -> usize {
        self.factor.number()
    }
}

impl fmt::Display for ReplicationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{:?}", self.replication_type, self.factor)
    }
}

/// Lifecycle state of a pipeline.
///
/// Allowed transitions:
/// - Allocated -> Open (nodes confirmed ready)
/// - Open -> Dormant (deactivated) and Dormant -> Open (activated)
/// - Allocated | Open | Dormant -> Closed (terminal)
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    /// Nodes chosen, not yet confirmed ready.
    Allocated,

    /// Serving and eligible for new container assignment.
    Open,

    /// Temporarily ineligible for new assignment.
    Dormant,

    /// Terminal. Existing containers are kept for read and repair only.
    Closed,
}

impl PipelineState {
    pub const ALL: [PipelineState; 4] = [
        PipelineState::Allocated,
        PipelineState::Open,
        PipelineState::Dormant,
        PipelineState::Closed,
    ];

    /// Whether the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Allocated, Open) | (Open, Dormant) | (Dormant, Open) | (Allocated | Open | Dormant, Closed)
        )
    }

    pub fn is_closed(self) -> bool {
        self == PipelineState::Closed
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Allocated => "ALLOCATED",
            PipelineState::Open => "OPEN",
            PipelineState::Dormant => "DORMANT",
            PipelineState::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

/// A fixed-membership group of storage nodes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct Pipeline {
    /// Unique identifier, generated at creation.
    pub id: PipelineId,

    /// Replication protocol of this pipeline.
    pub replication_type: ReplicationType,

    /// Number of members this pipeline requires.
    pub factor: ReplicationFactor,

    /// Ordered member nodes. Never changes after creation.
    pub nodes: Vec<NodeDetails>,

    /// Current lifecycle state.
    pub state: PipelineState,

    /// When the pipeline was constructed.
    pub created_at: DateTime<Utc>,
}

impl Pipeline {
    /// Construct a new pipeline in the `Allocated` state with a random id.
    pub fn allocated(config: ReplicationConfig, nodes: Vec<NodeDetails>) -> Self {
        Self {
            id: PipelineId::random(),
            replication_type: config.replication_type,
            factor: config.factor,
            nodes,
            state: PipelineState::Allocated,
            created_at: Utc::now(),
        }
    }

    /// The replication descriptor of this pipeline.
    pub fn replication_config(&self) -> ReplicationConfig {
        ReplicationConfig::new(self.replication_type, self.factor)
    }

    /// Whether `node` is a member of this pipeline.
    pub fn contains_node(&self, node: &NodeId) -> bool {
        self.nodes.iter().any(|n| &n.id == node)
    }

    /// Member node ids, in member order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().map(|n| n.id)
    }

    /// Whether the member list matches the factor and has no duplicates.
    pub fn has_valid_membership(&self) -> bool {
        if self.nodes.len() != self.factor.number() {
            return false;
        }
        let mut ids: Vec<NodeId> = self.node_ids().collect();
        ids.sort();
        ids.dedup();
        ids.len() == self.nodes.len()
    }

    pub fn is_open(&self) -> bool {
        self.state == PipelineState::Open
    }

    pub fn is_closed(&self) -> bool {
        self.state.is_closed()
    }
}

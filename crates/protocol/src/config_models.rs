//! Manager configuration models for `.pipeline-manager/config.toml`.
//!
//! This module defines the settings that control pool sizing, placement
//! limits and the background creator's schedule.

use serde::Deserialize;
use serde::Serialize;

use crate::pipeline_models::{ReplicationConfig, ReplicationFactor, ReplicationType};

/// Settings from `.pipeline-manager/config.toml`.
///
/// # Example
///
/// ```toml
/// # .pipeline-manager/config.toml
/// min-pipelines-per-descriptor = 3
/// max-pipelines-per-node = 2
/// creation-interval-secs = 60
/// replace-on-timeout = true
///
/// [[descriptors]]
/// type = "QUORUM"
/// factor = "THREE"
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct ManagerConfig {
    /// Number of ALLOCATED or OPEN pipelines the creator keeps per descriptor.
    #[serde(default = "default_min_pipelines")]
    pub min_pipelines_per_descriptor: usize,

    /// Maximum non-closed pipelines a single node may be a member of.
    ///
    /// Zero disables the limit.
    #[serde(default)]
    pub max_pipelines_per_node: usize,

    /// Period of the background creator, in seconds.
    #[serde(default = "default_creation_interval")]
    pub creation_interval_secs: u64,

    /// Age after which an ALLOCATED pipeline is scrubbed, in seconds.
    #[serde(default = "default_allocated_timeout")]
    pub allocated_timeout_secs: u64,

    /// Whether a close caused by a timeout or health failure requests a
    /// replacement pipeline for the same descriptor.
    #[serde(default = "default_true")]
    pub replace_on_timeout: bool,

    /// Whether pools of factor-one pipelines are maintained as well.
    #[serde(default = "default_true")]
    pub auto_create_factor_one: bool,

    /// Replication descriptors the creator maintains pools for.
    #[serde(default = "default_descriptors")]
    pub descriptors: Vec<ReplicationConfig>,

    /// Seed for the node ordering RNG. Entropy-seeded when absent.
    #[serde(default)]
    pub selection_seed: Option<u64>,

    /// Whether the manager starts in safe mode and waits for the safe-mode
    /// subsystem to release it before creating pipelines.
    #[serde(default = "default_true")]
    pub safe_mode_enabled: bool,
}

fn default_min_pipelines() -> usize {
    2
}

fn default_creation_interval() -> u64 {
    120
}

fn default_allocated_timeout() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

fn default_descriptors() -> Vec<ReplicationConfig> {
    vec![ReplicationConfig::new(ReplicationType::Quorum, ReplicationFactor::Three)]
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            min_pipelines_per_descriptor: default_min_pipelines(),
            max_pipelines_per_node: 0,
            creation_interval_secs: default_creation_interval(),
            allocated_timeout_secs: default_allocated_timeout(),
            replace_on_timeout: true,
            auto_create_factor_one: true,
            descriptors: default_descriptors(),
            selection_seed: None,
            safe_mode_enabled: true,
        }
    }
}

impl ManagerConfig {
    /// Descriptors whose pools are maintained, honoring `auto_create_factor_one`.
    pub fn maintained_descriptors(&self) -> Vec<ReplicationConfig> {
        self.descriptors
            .iter()
            .copied()
            .filter(|d| self.auto_create_factor_one || d.factor != ReplicationFactor::One)
            .collect()
    }
}

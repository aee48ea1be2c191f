//! Test fixtures for creating node inventories and wired-up managers.

use pm_core::nodes::provider::StaticNodeProvider;
use pm_core::state::store::PipelineStateStore;
use pm_core::PipelineManager;
use pm_protocol::config_models::ManagerConfig;
use pm_protocol::events::PipelineEvent;
use pm_protocol::node_models::NodeDetails;
use pm_protocol::pipeline_models::{ReplicationConfig, ReplicationFactor, ReplicationType};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;

pub fn quorum_three() -> ReplicationConfig {
    ReplicationConfig::new(ReplicationType::Quorum, ReplicationFactor::Three)
}

#[allow(dead_code)]
pub fn standalone_one() -> ReplicationConfig {
    ReplicationConfig::new(ReplicationType::Standalone, ReplicationFactor::One)
}

/// Create `count` nodes spread round-robin over `racks` racks.
pub fn create_test_nodes(count: usize, racks: usize) -> Vec<NodeDetails> {
    (0..count)
        .map(|i| {
            NodeDetails::new(
                format!("dn-{i:02}.test.local"),
                format!("10.0.{}.{}", i % racks, i + 10),
                format!("/rack-{}", i % racks),
            )
        })
        .collect()
}

/// Manager settings for tests: out of safe mode, seeded, one maintained
/// quorum/three descriptor with a pool of two.
pub fn test_config() -> ManagerConfig {
    ManagerConfig {
        min_pipelines_per_descriptor: 2,
        descriptors: vec![quorum_three()],
        auto_create_factor_one: false,
        selection_seed: Some(7),
        safe_mode_enabled: false,
        ..ManagerConfig::default()
    }
}

/// A manager wired to an in-memory node inventory and an event receiver.
pub struct TestCluster {
    pub manager: Arc<PipelineManager>,
    pub provider: Arc<StaticNodeProvider>,
    pub store: Arc<PipelineStateStore>,
    pub events: mpsc::UnboundedReceiver<PipelineEvent>,
    pub nodes: Vec<NodeDetails>,
}

impl TestCluster {
    pub fn new(config: ManagerConfig, nodes: Vec<NodeDetails>) -> Self {
        let provider = Arc::new(StaticNodeProvider::new(nodes.clone()));
        let store = Arc::new(PipelineStateStore::new());
        let (events_tx, events) = mpsc::unbounded_channel();
        let manager = Arc::new(PipelineManager::new(config, store.clone(), provider.clone(), events_tx));

        Self {
            manager,
            provider,
            store,
            events,
            nodes,
        }
    }

    /// Default test cluster: nine nodes over three racks.
    pub fn with_defaults() -> Self {
        Self::new(test_config(), create_test_nodes(9, 3))
    }

    /// All events published so far.
    pub fn drain_events(&mut self) -> Vec<PipelineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Create a temporary root with a `.pipeline-manager/` directory holding a
/// config file and a two-file node inventory.
///
/// Returns a TempDir that must be kept alive for the test duration.
#[allow(dead_code)]
pub fn create_test_project() -> std::io::Result<TempDir> {
    let temp_dir = tempfile::tempdir()?;
    let root = temp_dir.path().join(".pipeline-manager");
    std::fs::create_dir_all(root.join("nodes"))?;

    let config_toml = r#"
min-pipelines-per-descriptor = 1
creation-interval-secs = 30
safe-mode-enabled = false
selection-seed = 11

[[descriptors]]
type = "QUORUM"
factor = "THREE"
"#;
    std::fs::write(root.join("config.toml"), config_toml)?;

    let rack_a = r#"
- id: "7a1d3c2e-0000-4000-8000-000000000001"
  hostname: "dn-a1"
  ip-address: "10.1.0.1"
  network-location: "/rack-a"
- id: "7a1d3c2e-0000-4000-8000-000000000002"
  hostname: "dn-a2"
  ip-address: "10.1.0.2"
  network-location: "/rack-a"
"#;
    let rack_b = r#"
- id: "7a1d3c2e-0000-4000-8000-000000000003"
  hostname: "dn-b1"
  ip-address: "10.1.1.1"
  network-location: "/rack-b"
"#;
    std::fs::write(root.join("nodes/rack-a.yaml"), rack_a)?;
    std::fs::write(root.join("nodes/rack-b.yml"), rack_b)?;

    Ok(temp_dir)
}

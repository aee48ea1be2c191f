//! Configuration models that aggregate all settings.
//!
//! `AppConfig` combines the manager settings with the static node
//! inventory into a single configuration object.

use pm_protocol::config_models::ManagerConfig;
use pm_protocol::node_models::NodeDetails;

/// Unified configuration loaded from the `.pipeline-manager/` directory.
///
/// This structure aggregates all configuration sources:
/// - `config.toml`: Manager settings
/// - `nodes/*.yaml`: Static node inventory
///
/// # Example
///
/// ```rust,no_run
/// use pm_core::config::loader::load_config;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new(".")).await?;
/// println!("Loaded {} nodes, pool target {}",
///          config.nodes.len(),
///          config.manager.min_pipelines_per_descriptor);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// Manager settings from `config.toml`.
    pub manager: ManagerConfig,

    /// All nodes loaded from `nodes/*.yaml`.
    pub nodes: Vec<NodeDetails>,
}

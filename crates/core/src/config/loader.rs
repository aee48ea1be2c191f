//! Configuration file loader for the `.pipeline-manager/` directory.
//!
//! This module loads:
//! - `config.toml`: Manager settings
//! - `nodes/*.yaml`: Static node inventory, one YAML list per file

use crate::config::error::ConfigError;
use crate::config::error::ConfigResult;
use crate::config::models::AppConfig;
use pm_protocol::config_models::ManagerConfig;
use pm_protocol::node_models::NodeDetails;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Name of the configuration directory under the root.
pub const CONFIG_DIR: &str = ".pipeline-manager";

/// Loads all configuration from the `.pipeline-manager/` directory.
///
/// # Arguments
///
/// * `root` - Root directory containing the `.pipeline-manager/` folder
///
/// # Returns
///
/// An `AppConfig` containing all loaded configuration. Missing directories
/// or files yield defaults rather than an error.
///
/// # Errors
///
/// Returns `ConfigError` if:
/// - Files exist but cannot be read
/// - Files have invalid TOML or YAML syntax
/// - Settings are out of range
/// - A node id is declared twice in the inventory
///
/// # Example
///
/// ```rust,no_run
/// use pm_core::config::loader::load_config;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new(".")).await?;
/// println!("Loaded {} nodes", config.nodes.len());
/// # Ok(())
/// # }
/// ```
pub async fn load_config(root: &Path) -> ConfigResult<AppConfig> {
    let pm_dir = root.join(CONFIG_DIR);

    if !pm_dir.exists() {
        return Ok(AppConfig::default());
    }

    let manager = load_manager_config(&pm_dir)?;
    let nodes = load_nodes(&pm_dir)?;

    Ok(AppConfig { manager, nodes })
}

/// Loads manager settings from `config.toml`.
fn load_manager_config(pm_dir: &Path) -> ConfigResult<ManagerConfig> {
    let config_path = pm_dir.join("config.toml");

    if !config_path.exists() {
        return Ok(ManagerConfig::default());
    }

    let content =
        std::fs::read_to_string(&config_path).map_err(|source| ConfigError::Unreadable {
            path: config_path.clone(),
            source,
        })?;

    let config: ManagerConfig =
        toml::from_str(&content).map_err(|source| ConfigError::SettingsParse {
            path: config_path.clone(),
            source,
        })?;

    validate_manager_config(&config).map_err(|reason| ConfigError::InvalidSettings {
        path: config_path,
        reason,
    })?;

    Ok(config)
}

fn validate_manager_config(config: &ManagerConfig) -> Result<(), String> {
    if config.creation_interval_secs == 0 {
        return Err("creation-interval-secs must be greater than zero".to_string());
    }
    if config.allocated_timeout_secs == 0 {
        return Err("allocated-timeout-secs must be greater than zero".to_string());
    }
    if let Some(bad) = config.descriptors.iter().find(|d| !d.is_valid()) {
        return Err(format!("descriptor {bad} is outside its replication type's factor domain"));
    }
    Ok(())
}

/// Loads the node inventory from `nodes/*.yaml`.
fn load_nodes(pm_dir: &Path) -> ConfigResult<Vec<NodeDetails>> {
    let nodes_dir = pm_dir.join("nodes");

    if !nodes_dir.exists() {
        return Ok(Vec::new());
    }

    let mut nodes: Vec<NodeDetails> = Vec::new();
    let mut seen: HashMap<_, PathBuf> = HashMap::new();

    for entry in WalkDir::new(&nodes_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
    {
        let entry = entry.map_err(|source| ConfigError::InventoryWalk {
            path: nodes_dir.clone(),
            source,
        })?;

        let path = entry.path();

        let ext = path.extension().and_then(|s| s.to_str());
        if ext != Some("yaml") && ext != Some("yml") {
            continue;
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;

        let batch: Vec<NodeDetails> =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::InventoryParse {
                path: path.to_path_buf(),
                source,
            })?;

        for node in batch {
            if let Some(first) = seen.insert(node.id, path.to_path_buf()) {
                return Err(ConfigError::DuplicateNode {
                    path: path.to_path_buf(),
                    node: node.id,
                    first,
                });
            }
            nodes.push(node);
        }
    }

    Ok(nodes)
}

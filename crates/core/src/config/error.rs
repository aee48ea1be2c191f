//! Errors raised while loading `.pipeline-manager/`.
//!
//! Two sources can fail: `config.toml` with the manager settings, and the
//! node inventory under `nodes/`. Every variant carries the offending path.

use pm_protocol::NodeId;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    /// A settings or inventory file exists but could not be read.
    #[error("Cannot read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    /// `config.toml` is not valid manager settings.
    #[error("Malformed manager settings in {path}: {source}")]
    SettingsParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Settings parsed but a value is out of range.
    #[error("Rejected manager settings in {path}: {reason}")]
    InvalidSettings { path: PathBuf, reason: String },

    /// A node inventory file is not a YAML list of nodes.
    #[error("Malformed node inventory {path}: {source}")]
    InventoryParse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    /// The `nodes/` directory could not be listed.
    #[error("Cannot list node inventory in {path}: {source}")]
    InventoryWalk {
        path: PathBuf,
        source: walkdir::Error,
    },

    /// The same node id appears twice across the inventory.
    #[error("Node {node} in {path} was already declared in {first}")]
    DuplicateNode {
        path: PathBuf,
        node: NodeId,
        first: PathBuf,
    },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

//! Storage node references.
//!
//! Nodes are owned by the cluster's node manager; the pipeline manager only
//! holds references to them and consumes their health as reported by an
//! external provider.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier of a storage node.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Generate a fresh random node id.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Describes a storage node that can become a pipeline member.
///
/// # Example
///
/// ```yaml
/// # .pipeline-manager/nodes/rack-a.yaml
/// - id: "5f0c7a3e-6f43-4a55-9b61-1f1f6b8d2c01"
///   hostname: "dn-01.cluster.local"
///   ip-address: "10.0.1.11"
///   network-location: "/rack-a"
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct NodeDetails {
    /// Stable identity of the node.
    pub id: NodeId,

    /// Hostname the node registered with.
    pub hostname: String,

    /// Address the node registered with.
    pub ip_address: String,

    /// Failure domain of the node, usually its rack path.
    ///
    /// Placement spreads pipeline members across distinct locations when
    /// enough of them are available.
    #[serde(default = "default_network_location")]
    pub network_location: String,
}

fn default_network_location() -> String {
    "/default-rack".to_string()
}

impl NodeDetails {
    /// Create a node with a random id in the given network location.
    pub fn new(hostname: impl Into<String>, ip_address: impl Into<String>, network_location: impl Into<String>) -> Self {
        Self {
            id: NodeId::random(),
            hostname: hostname.into(),
            ip_address: ip_address.into(),
            network_location: network_location.into(),
        }
    }
}

impl fmt::Display for NodeDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.hostname, self.id)
    }
}

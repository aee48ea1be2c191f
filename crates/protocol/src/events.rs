//! Lifecycle notifications and inbound cluster signals.
//!
//! The core publishes a `PipelineEvent` for every committed lifecycle or
//! membership change so that downstream subsystems (container management,
//! replication monitoring) can react without polling the store.
//!
//! Uses tagged enum serialization:
//! ```json
//! {
//!   "type": "pipelineClosed",
//!   "payload": {
//!     "pipeline_id": "uuid-here",
//!     "on_timeout": true,
//!     "containers": [12, 17]
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::pipeline_models::{ContainerId, PipelineId, ReplicationConfig};

/// Events emitted by the pipeline manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum PipelineEvent {
    /// A pipeline was registered in the `Allocated` state.
    PipelineCreated {
        pipeline_id: PipelineId,
        config: ReplicationConfig,
    },

    /// Node-side readiness was confirmed and the pipeline is serving.
    PipelineOpened { pipeline_id: PipelineId },

    /// A dormant pipeline became eligible for assignment again.
    PipelineActivated { pipeline_id: PipelineId },

    /// An open pipeline was taken out of the assignment pool.
    PipelineDeactivated { pipeline_id: PipelineId },

    /// A pipeline reached its terminal state.
    ///
    /// Carries the containers that were in the pipeline at close time; they
    /// must stop accepting writes but remain readable.
    PipelineClosed {
        pipeline_id: PipelineId,
        on_timeout: bool,
        containers: Vec<ContainerId>,
    },

    /// A closed pipeline was removed from the store.
    PipelineDestroyed { pipeline_id: PipelineId },

    /// A container was assigned to a pipeline.
    ContainerAdded {
        pipeline_id: PipelineId,
        container_id: ContainerId,
    },

    /// A container was removed from a pipeline.
    ContainerRemoved {
        pipeline_id: PipelineId,
        container_id: ContainerId,
    },
}

impl PipelineEvent {
    /// The pipeline this event concerns.
    pub fn pipeline_id(&self) -> PipelineId {
        match self {
            PipelineEvent::PipelineCreated { pipeline_id, .. }
            | PipelineEvent::PipelineOpened { pipeline_id }
            | PipelineEvent::PipelineActivated { pipeline_id }
            | PipelineEvent::PipelineDeactivated { pipeline_id }
            | PipelineEvent::PipelineClosed { pipeline_id, .. }
            | PipelineEvent::PipelineDestroyed { pipeline_id }
            | PipelineEvent::ContainerAdded { pipeline_id, .. }
            | PipelineEvent::ContainerRemoved { pipeline_id, .. } => *pipeline_id,
        }
    }
}

/// Safe-mode status delivered by the cluster's safe-mode subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafeModeStatus {
    /// Whether the cluster is still in its startup/recovery phase.
    pub in_safe_mode: bool,
}

impl SafeModeStatus {
    pub fn entered() -> Self {
        Self { in_safe_mode: true }
    }

    pub fn exited() -> Self {
        Self { in_safe_mode: false }
    }
}

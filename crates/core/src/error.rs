//! Error types for pipeline lifecycle and membership operations.
//!
//! Every failure is reported synchronously to the caller of the operation
//! that detected it. The core never retries on its own.

use pm_protocol::{ContainerId, PipelineId, PipelineState, ReplicationConfig};
use thiserror::Error;

/// Errors returned by the state store, node selector and pipeline manager.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// No pipeline with this id is registered.
    #[error("Pipeline {0} not found")]
    PipelineNotFound(PipelineId),

    /// A pipeline with this id is already registered.
    #[error("Pipeline {0} already exists")]
    DuplicatePipeline(PipelineId),

    /// The container is not a member of the pipeline.
    #[error("Container {container} is not assigned to pipeline {pipeline}")]
    ContainerNotFound {
        pipeline: PipelineId,
        container: ContainerId,
    },

    /// The container is already a member of another pipeline.
    #[error("Container {container} is already assigned to pipeline {owner}")]
    ContainerAlreadyAssigned {
        container: ContainerId,
        owner: PipelineId,
    },

    /// The lifecycle does not allow this transition.
    #[error("Pipeline {pipeline} cannot move from {from} to {to}")]
    InvalidStateTransition {
        pipeline: PipelineId,
        from: PipelineState,
        to: PipelineState,
    },

    /// The pipeline is closed and accepts no new containers.
    #[error("Pipeline {0} is closed")]
    PipelineClosed(PipelineId),

    /// The pipeline is dormant and temporarily out of the assignment pool.
    #[error("Pipeline {0} is dormant and accepts no new containers")]
    PipelineDormant(PipelineId),

    /// Only closed pipelines may be destroyed.
    #[error("Pipeline {pipeline} is {state}, only closed pipelines can be destroyed")]
    PipelineNotClosed {
        pipeline: PipelineId,
        state: PipelineState,
    },

    /// Member nodes have not confirmed readiness.
    #[error("Pipeline {pipeline} is not ready: {unready} member node(s) unavailable")]
    PipelineNotReady { pipeline: PipelineId, unready: usize },

    /// Not enough eligible nodes for the requested descriptor.
    #[error("Cannot create {config} pipeline: {required} nodes required, {available} eligible")]
    InsufficientNodes {
        config: ReplicationConfig,
        required: usize,
        available: usize,
    },

    /// Malformed input.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Pipeline creation is suspended while the cluster is in safe mode.
    #[error("Pipeline creation is suspended while in safe mode")]
    SafeModeActive,
}

/// Broad failure category, for callers that branch on the kind of error
/// rather than the exact variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Duplicate,
    InvalidStateTransition,
    InsufficientResources,
    InvalidArgument,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::PipelineNotFound(_) | PipelineError::ContainerNotFound { .. } => ErrorKind::NotFound,
            PipelineError::DuplicatePipeline(_) | PipelineError::ContainerAlreadyAssigned { .. } => {
                ErrorKind::Duplicate
            }
            PipelineError::InvalidStateTransition { .. }
            | PipelineError::PipelineClosed(_)
            | PipelineError::PipelineDormant(_)
            | PipelineError::PipelineNotClosed { .. }
            | PipelineError::PipelineNotReady { .. }
            | PipelineError::SafeModeActive => ErrorKind::InvalidStateTransition,
            PipelineError::InsufficientNodes { .. } => ErrorKind::InsufficientResources,
            PipelineError::InvalidArgument(_) => ErrorKind::InvalidArgument,
        }
    }
}

/// Type alias for Result with PipelineError.
pub type PipelineResult<T> = Result<T, PipelineError>;

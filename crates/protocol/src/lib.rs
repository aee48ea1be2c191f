//! # pm-protocol
//!
//! Shared data models for the pipeline manager.
//!
//! This crate defines the structures exchanged between the control-plane
//! core and its collaborators:
//! - Storage node references
//! - Pipelines, replication descriptors and lifecycle states
//! - Query filters used by allocation paths
//! - Lifecycle events and safe-mode signals
//! - Manager configuration
//!
//! ## Modules
//!
//! - [`node_models`]: Node identity and placement location
//! - [`pipeline_models`]: Pipeline entity and state machine table
//! - [`query_models`]: Optional-filter pipeline query
//! - [`events`]: Lifecycle events and safe-mode status
//! - [`config_models`]: Settings from config.toml
//!
//! ## Design Principles
//!
//! - Minimal dependencies: Only serde, uuid and chrono
//! - Independent compilation: No dependencies on other pipeline-manager crates

pub mod config_models;
pub mod events;
pub mod node_models;
pub mod pipeline_models;
pub mod query_models;

// Re-export all public types for convenience
pub use config_models::*;
pub use events::*;
pub use node_models::*;
pub use pipeline_models::*;
pub use query_models::*;

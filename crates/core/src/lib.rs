//! # pm-core
//!
//! Pipeline lifecycle management for the storage control plane.
//!
//! This crate provides:
//! - Configuration loading from the `.pipeline-manager/` directory
//! - A concurrency-safe pipeline state store with secondary indices
//! - Node selection honoring health, exclusions and engagement limits
//! - The pipeline manager and its background pool creator
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and management
//! - [`error`]: Error taxonomy of pipeline operations
//! - [`manager`]: Pipeline manager and background creator
//! - [`metrics`]: Allocation counters
//! - [`nodes`]: Node health provider and node selection
//! - [`state`]: Lifecycle rules and the pipeline state store

pub mod config;
pub mod error;
pub mod manager;
pub mod metrics;
pub mod nodes;
pub mod state;

pub use error::{ErrorKind, PipelineError, PipelineResult};
pub use manager::PipelineManager;

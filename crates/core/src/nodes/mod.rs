//! Storage node access and placement.
//!
//! This module provides:
//! - The `NodeProvider` seam to the external health/topology collaborator
//! - `NodeSelector`, which picks members for new pipelines

pub mod provider;
pub mod selector;

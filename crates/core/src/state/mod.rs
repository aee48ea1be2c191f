//! Pipeline state management.
//!
//! This module provides:
//! - Lifecycle transition rules
//! - PipelineStateStore, the concurrency-safe pipeline registry

pub mod lifecycle;
pub mod store;

//! Common test utilities shared by the integration tests.
//!
//! This module provides:
//! - Test fixtures (node inventories, configs, a wired-up test cluster)
//! - Custom assertions over events and store consistency

pub mod assertions;
pub mod fixtures;

#[allow(unused_imports)]
pub use assertions::*;
pub use fixtures::*;

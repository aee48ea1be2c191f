//! Configuration loading and management.
//!
//! This module loads the manager settings and node inventory from the
//! `.pipeline-manager/` directory structure.

pub mod error;
pub mod loader;
pub mod models;

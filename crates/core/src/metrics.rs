//! Metrics hook consumed by allocation paths.
//!
//! Emission is fire-and-forget: implementations must not panic or block
//! the caller, and nothing is returned.

use pm_protocol::PipelineId;
use std::collections::HashMap;
use std::sync::Mutex;

/// Sink for per-pipeline counters.
pub trait MetricsSink: Send + Sync {
    /// Record one block allocated on `pipeline`.
    fn inc_blocks_allocated(&self, pipeline: PipelineId);
}

/// A sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn inc_blocks_allocated(&self, _pipeline: PipelineId) {}
}

/// In-memory per-pipeline counters.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    blocks_allocated: Mutex<HashMap<PipelineId, u64>>,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks allocated on `pipeline` so far.
    pub fn blocks_allocated(&self, pipeline: PipelineId) -> u64 {
        match self.blocks_allocated.lock() {
            Ok(counters) => counters.get(&pipeline).copied().unwrap_or(0),
            Err(poisoned) => poisoned.into_inner().get(&pipeline).copied().unwrap_or(0),
        }
    }
}

impl MetricsSink for PipelineMetrics {
    fn inc_blocks_allocated(&self, pipeline: PipelineId) {
        // A poisoned lock only means another recorder panicked; the map is still usable.
        let mut counters = match self.blocks_allocated.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *counters.entry(pipeline).or_insert(0) += 1;
    }
}

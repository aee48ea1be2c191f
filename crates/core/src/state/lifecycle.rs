//! Pipeline lifecycle rules.
//!
//! The transition table itself lives on `PipelineState`; this module adds
//! the checks operations apply on top of it (which source states a given
//! operation accepts) and maps violations to `PipelineError`.

use crate::error::{PipelineError, PipelineResult};
use pm_protocol::pipeline_models::{Pipeline, PipelineState};

/// A lifecycle operation and the source states it accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Allocated -> Open, once member nodes confirmed readiness.
    Open,
    /// Open -> Dormant.
    Deactivate,
    /// Dormant -> Open.
    Activate,
    /// Allocated | Open | Dormant -> Closed.
    Close,
    /// Any move the lifecycle table allows.
    To(PipelineState),
}

impl Transition {
    /// The state this transition ends in.
    pub fn target(self) -> PipelineState {
        match self {
            Transition::Open | Transition::Activate => PipelineState::Open,
            Transition::Deactivate => PipelineState::Dormant,
            Transition::Close => PipelineState::Closed,
            Transition::To(state) => state,
        }
    }

    /// Whether this operation may start from `from`.
    pub fn accepts(self, from: PipelineState) -> bool {
        let source_ok = match self {
            Transition::Open => from == PipelineState::Allocated,
            Transition::Deactivate => from == PipelineState::Open,
            Transition::Activate => from == PipelineState::Dormant,
            Transition::Close | Transition::To(_) => true,
        };
        source_ok && from.can_transition_to(self.target())
    }
}

/// Check that `transition` may be applied to `pipeline` in its current state.
pub fn check_transition(pipeline: &Pipeline, transition: Transition) -> PipelineResult<()> {
    if transition.accepts(pipeline.state) {
        Ok(())
    } else {
        Err(PipelineError::InvalidStateTransition {
            pipeline: pipeline.id,
            from: pipeline.state,
            to: transition.target(),
        })
    }
}

/// Check that `pipeline` accepts new containers.
///
/// Only `Allocated` and `Open` pipelines do. Removal is not restricted.
pub fn check_accepts_containers(pipeline: &Pipeline) -> PipelineResult<()> {
    match pipeline.state {
        PipelineState::Allocated | PipelineState::Open => Ok(()),
        PipelineState::Dormant => Err(PipelineError::PipelineDormant(pipeline.id)),
        PipelineState::Closed => Err(PipelineError::PipelineClosed(pipeline.id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pm_protocol::{NodeDetails, ReplicationConfig, ReplicationFactor, ReplicationType};

    fn pipeline_in(state: PipelineState) -> Pipeline {
        let node = NodeDetails::new("dn-0", "10.0.0.1", "/rack-a");
        let mut pipeline = Pipeline::allocated(
            ReplicationConfig::new(ReplicationType::Standalone, ReplicationFactor::One),
            vec![node],
        );
        pipeline.state = state;
        pipeline
    }

    #[test]
    fn test_open_only_from_allocated() {
        assert!(check_transition(&pipeline_in(PipelineState::Allocated), Transition::Open).is_ok());

        let err = check_transition(&pipeline_in(PipelineState::Dormant), Transition::Open)
            .expect_err("open from dormant must go through activate");
        assert!(matches!(
            err,
            PipelineError::InvalidStateTransition {
                from: PipelineState::Dormant,
                to: PipelineState::Open,
                ..
            }
        ));
    }

    #[test]
    fn test_activate_and_deactivate_toggle() {
        assert!(check_transition(&pipeline_in(PipelineState::Open), Transition::Deactivate).is_ok());
        assert!(check_transition(&pipeline_in(PipelineState::Dormant), Transition::Activate).is_ok());
        assert!(check_transition(&pipeline_in(PipelineState::Allocated), Transition::Deactivate).is_err());
        assert!(check_transition(&pipeline_in(PipelineState::Open), Transition::Activate).is_err());
    }

    #[test]
    fn test_closed_is_terminal() {
        let closed = pipeline_in(PipelineState::Closed);
        for transition in [
            Transition::Open,
            Transition::Activate,
            Transition::Deactivate,
            Transition::Close,
            Transition::To(PipelineState::Allocated),
        ] {
            assert!(check_transition(&closed, transition).is_err(), "{transition:?}");
        }
    }

    #[test]
    fn test_generic_transition_follows_table() {
        assert!(check_transition(&pipeline_in(PipelineState::Dormant), Transition::To(PipelineState::Open)).is_ok());
        assert!(check_transition(&pipeline_in(PipelineState::Allocated), Transition::To(PipelineState::Dormant)).is_err());
    }

    #[test]
    fn test_only_assignable_states_accept_containers() {
        assert!(check_accepts_containers(&pipeline_in(PipelineState::Allocated)).is_ok());
        assert!(check_accepts_containers(&pipeline_in(PipelineState::Open)).is_ok());

        let dormant = pipeline_in(PipelineState::Dormant);
        let err = check_accepts_containers(&dormant).expect_err("dormant pipelines are out of the pool");
        assert_eq!(err, PipelineError::PipelineDormant(dormant.id));
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidStateTransition);

        let closed = pipeline_in(PipelineState::Closed);
        assert_eq!(
            check_accepts_containers(&closed),
            Err(PipelineError::PipelineClosed(closed.id))
        );
    }
}

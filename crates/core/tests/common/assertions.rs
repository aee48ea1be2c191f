//! Custom assertion helpers for integration tests.

use pm_core::state::store::PipelineStateStore;
use pm_protocol::events::PipelineEvent;
use pm_protocol::pipeline_models::PipelineId;
use pm_protocol::query_models::PipelineQuery;
use std::collections::HashSet;

/// Names of the events concerning `id`, in publication order.
pub fn event_names_for(events: &[PipelineEvent], id: PipelineId) -> Vec<&'static str> {
    events
        .iter()
        .filter(|e| e.pipeline_id() == id)
        .map(|e| match e {
            PipelineEvent::PipelineCreated { .. } => "created",
            PipelineEvent::PipelineOpened { .. } => "opened",
            PipelineEvent::PipelineActivated { .. } => "activated",
            PipelineEvent::PipelineDeactivated { .. } => "deactivated",
            PipelineEvent::PipelineClosed { .. } => "closed",
            PipelineEvent::PipelineDestroyed { .. } => "destroyed",
            PipelineEvent::ContainerAdded { .. } => "container-added",
            PipelineEvent::ContainerRemoved { .. } => "container-removed",
        })
        .collect()
}

/// Count events matching `predicate`.
pub fn count_events(events: &[PipelineEvent], predicate: impl Fn(&PipelineEvent) -> bool) -> usize {
    events.iter().filter(|e| predicate(e)).count()
}

/// Assert the store's membership invariants:
/// - every pipeline has exactly `factor` distinct member nodes
/// - every container is owned by exactly the pipeline listing it
pub async fn assert_store_consistent(store: &PipelineStateStore) {
    let mut seen = HashSet::new();
    for pipeline in store.list(&PipelineQuery::all()).await {
        assert!(
            pipeline.has_valid_membership(),
            "pipeline {} has invalid membership: {:?}",
            pipeline.id,
            pipeline.nodes
        );

        let containers = store
            .containers_of(pipeline.id)
            .await
            .expect("listed pipeline must exist");
        for container in containers {
            assert!(seen.insert(container), "container {container} is in two pipelines");
            assert_eq!(
                store.container_owner(container).await,
                Some(pipeline.id),
                "owner index disagrees for container {container}"
            );
        }
    }
}

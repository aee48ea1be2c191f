//! Concurrency-safe registry of all pipelines.
//!
//! The store keeps one snapshot of every pipeline together with the
//! secondary indices used by filtered queries and the container membership
//! maps. All of these live behind a single `RwLock` whose write side is
//! only ever held for the in-memory commit of one mutation, never across an
//! await point. A mutation's index updates are therefore applied as one
//! unit: readers observe either the state before or the state after.
//!
//! Mutations of one pipeline are additionally serialized by a per-pipeline
//! mutex (`PipelineGuard`). Callers that need several steps on the same
//! pipeline (check readiness, transition, publish an event) hold the guard
//! for the whole sequence, while operations on different pipelines proceed
//! independently.

use crate::error::{PipelineError, PipelineResult};
use crate::state::lifecycle::{check_accepts_containers, check_transition, Transition};
use pm_protocol::node_models::NodeId;
use pm_protocol::pipeline_models::{
    ContainerId, Pipeline, PipelineId, PipelineState, ReplicationConfig, ReplicationType,
};
use pm_protocol::query_models::PipelineQuery;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// Outcome of a committed lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    /// State before the transition.
    pub from: PipelineState,
    /// Snapshot of the pipeline after the transition.
    pub pipeline: Pipeline,
    /// Containers of the pipeline at commit time.
    pub containers: BTreeSet<ContainerId>,
}

/// Registry of pipelines, their indices and container membership.
#[derive(Default)]
pub struct PipelineStateStore {
    registry: RwLock<Registry>,
}

struct PipelineEntry {
    pipeline: Pipeline,
    containers: BTreeSet<ContainerId>,
    /// Serializes mutations of this pipeline.
    lock: Arc<Mutex<()>>,
}

#[derive(Default)]
struct Registry {
    pipelines: HashMap<PipelineId, PipelineEntry>,
    by_type: HashMap<ReplicationType, BTreeSet<PipelineId>>,
    by_config: HashMap<ReplicationConfig, BTreeSet<PipelineId>>,
    by_state: HashMap<(ReplicationConfig, PipelineState), BTreeSet<PipelineId>>,
    by_node: HashMap<NodeId, BTreeSet<PipelineId>>,
    container_owner: HashMap<ContainerId, PipelineId>,
}

fn attach<K: Hash + Eq>(index: &mut HashMap<K, BTreeSet<PipelineId>>, key: K, id: PipelineId) {
    index.entry(key).or_default().insert(id);
}

fn detach<K: Hash + Eq>(index: &mut HashMap<K, BTreeSet<PipelineId>>, key: &K, id: &PipelineId) {
    if let Some(ids) = index.get_mut(key) {
        ids.remove(id);
        if ids.is_empty() {
            index.remove(key);
        }
    }
}

impl Registry {
    fn insert(&mut self, pipeline: Pipeline) {
        let id = pipeline.id;
        let config = pipeline.replication_config();
        attach(&mut self.by_type, config.replication_type, id);
        attach(&mut self.by_config, config, id);
        attach(&mut self.by_state, (config, pipeline.state), id);
        for node in pipeline.node_ids() {
            attach(&mut self.by_node, node, id);
        }
        self.pipelines.insert(
            id,
            PipelineEntry {
                pipeline,
                containers: BTreeSet::new(),
                lock: Arc::new(Mutex::new(())),
            },
        );
    }

    fn remove(&mut self, id: &PipelineId) -> Option<PipelineEntry> {
        let entry = self.pipelines.remove(id)?;
        let config = entry.pipeline.replication_config();
        detach(&mut self.by_type, &config.replication_type, id);
        detach(&mut self.by_config, &config, id);
        detach(&mut self.by_state, &(config, entry.pipeline.state), id);
        for node in entry.pipeline.node_ids() {
            detach(&mut self.by_node, &node, id);
        }
        for container in &entry.containers {
            self.container_owner.remove(container);
        }
        Some(entry)
    }

    fn entry(&self, id: &PipelineId) -> PipelineResult<&PipelineEntry> {
        self.pipelines.get(id).ok_or(PipelineError::PipelineNotFound(*id))
    }

    fn transition(&mut self, id: PipelineId, transition: Transition) -> PipelineResult<StateChange> {
        let entry = self
            .pipelines
            .get_mut(&id)
            .ok_or(PipelineError::PipelineNotFound(id))?;
        check_transition(&entry.pipeline, transition)?;

        let from = entry.pipeline.state;
        entry.pipeline.state = transition.target();
        let change = StateChange {
            from,
            pipeline: entry.pipeline.clone(),
            containers: entry.containers.clone(),
        };

        let config = change.pipeline.replication_config();
        detach(&mut self.by_state, &(config, from), &id);
        attach(&mut self.by_state, (config, change.pipeline.state), id);
        Ok(change)
    }

    fn add_container(&mut self, id: PipelineId, container: ContainerId) -> PipelineResult<bool> {
        let entry = self
            .pipelines
            .get_mut(&id)
            .ok_or(PipelineError::PipelineNotFound(id))?;
        check_accepts_containers(&entry.pipeline)?;

        match self.container_owner.get(&container).copied() {
            Some(owner) if owner == id => Ok(false),
            Some(owner) => Err(PipelineError::ContainerAlreadyAssigned { container, owner }),
            None => {
                entry.containers.insert(container);
                self.container_owner.insert(container, id);
                Ok(true)
            }
        }
    }

    fn remove_container(&mut self, id: PipelineId, container: ContainerId) -> PipelineResult<()> {
        let entry = self
            .pipelines
            .get_mut(&id)
            .ok_or(PipelineError::PipelineNotFound(id))?;
        if !entry.containers.remove(&container) {
            return Err(PipelineError::ContainerNotFound {
                pipeline: id,
                container,
            });
        }
        self.container_owner.remove(&container);
        Ok(())
    }

    /// Ids worth inspecting for `query`, narrowed by the most specific index.
    fn candidates(&self, query: &PipelineQuery) -> Vec<PipelineId> {
        let from_index = |ids: Option<&BTreeSet<PipelineId>>| -> Vec<PipelineId> {
            ids.map(|ids| ids.iter().copied().collect()).unwrap_or_default()
        };
        match (query.replication_type, query.factor, query.state) {
            (Some(replication_type), Some(factor), Some(state)) => {
                let config = ReplicationConfig::new(replication_type, factor);
                from_index(self.by_state.get(&(config, state)))
            }
            (Some(replication_type), Some(factor), None) => {
                from_index(self.by_config.get(&ReplicationConfig::new(replication_type, factor)))
            }
            (Some(replication_type), None, _) => from_index(self.by_type.get(&replication_type)),
            _ => self.pipelines.keys().copied().collect(),
        }
    }
}

impl PipelineStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new pipeline.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if the member list does not match the factor, has
    ///   duplicate nodes, or the factor is outside the type's domain
    /// - `DuplicatePipeline` if the id is already registered
    pub async fn add(&self, pipeline: Pipeline) -> PipelineResult<()> {
        if !pipeline.replication_config().is_valid() {
            return Err(PipelineError::InvalidArgument(format!(
                "factor {:?} is not supported by {:?}",
                pipeline.factor, pipeline.replication_type
            )));
        }
        if !pipeline.has_valid_membership() {
            return Err(PipelineError::InvalidArgument(format!(
                "pipeline {} needs {} distinct nodes, got {}",
                pipeline.id,
                pipeline.factor.number(),
                pipeline.nodes.len()
            )));
        }

        let mut registry = self.registry.write().await;
        if registry.pipelines.contains_key(&pipeline.id) {
            return Err(PipelineError::DuplicatePipeline(pipeline.id));
        }
        registry.insert(pipeline);
        Ok(())
    }

    /// Acquire exclusive mutation rights over one pipeline.
    ///
    /// Concurrent callers locking the same id queue up; the next holder
    /// observes every change the previous one committed.
    pub async fn lock(&self, id: PipelineId) -> PipelineResult<PipelineGuard<'_>> {
        let lock = {
            let registry = self.registry.read().await;
            Arc::clone(&registry.entry(&id)?.lock)
        };
        let permit = lock.lock_owned().await;
        Ok(PipelineGuard {
            store: self,
            id,
            _permit: permit,
        })
    }

    pub async fn get(&self, id: PipelineId) -> PipelineResult<Pipeline> {
        let registry = self.registry.read().await;
        Ok(registry.entry(&id)?.pipeline.clone())
    }

    pub async fn contains(&self, id: PipelineId) -> bool {
        self.registry.read().await.pipelines.contains_key(&id)
    }

    /// Point-in-time snapshot of every pipeline matching `query`, oldest first.
    pub async fn list(&self, query: &PipelineQuery) -> Vec<Pipeline> {
        let registry = self.registry.read().await;
        let mut pipelines: Vec<Pipeline> = registry
            .candidates(query)
            .iter()
            .filter_map(|id| registry.pipelines.get(id))
            .map(|entry| &entry.pipeline)
            .filter(|pipeline| query.matches(pipeline))
            .cloned()
            .collect();
        pipelines.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        pipelines
    }

    /// Number of pipelines matching `query`.
    pub async fn count(&self, query: &PipelineQuery) -> usize {
        let registry = self.registry.read().await;
        registry
            .candidates(query)
            .iter()
            .filter_map(|id| registry.pipelines.get(id))
            .filter(|entry| query.matches(&entry.pipeline))
            .count()
    }

    /// Total number of registered pipelines.
    pub async fn len(&self) -> usize {
        self.registry.read().await.pipelines.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Apply a lifecycle transition allowed by the state table.
    pub async fn set_state(&self, id: PipelineId, state: PipelineState) -> PipelineResult<StateChange> {
        self.lock(id).await?.transition(Transition::To(state)).await
    }

    /// Assign `container` to pipeline `id`.
    ///
    /// Returns `false` when the container was already in this pipeline.
    pub async fn add_container(&self, id: PipelineId, container: ContainerId) -> PipelineResult<bool> {
        self.lock(id).await?.add_container(container).await
    }

    /// Remove `container` from pipeline `id`.
    ///
    /// # Errors
    ///
    /// `ContainerNotFound` if the container is not a member of this pipeline.
    pub async fn remove_container(&self, id: PipelineId, container: ContainerId) -> PipelineResult<()> {
        self.lock(id).await?.remove_container(container).await
    }

    /// Containers currently assigned to pipeline `id`.
    pub async fn containers_of(&self, id: PipelineId) -> PipelineResult<BTreeSet<ContainerId>> {
        let registry = self.registry.read().await;
        Ok(registry.entry(&id)?.containers.clone())
    }

    /// The pipeline `container` is assigned to, if any.
    pub async fn container_owner(&self, container: ContainerId) -> Option<PipelineId> {
        self.registry.read().await.container_owner.get(&container).copied()
    }

    /// Remove a closed pipeline, releasing its container assignments.
    pub async fn remove(&self, id: PipelineId) -> PipelineResult<Pipeline> {
        self.lock(id).await?.destroy().await
    }

    /// Every pipeline, in any state, that `node` is a member of.
    pub async fn pipelines_of_node(&self, node: &NodeId) -> Vec<Pipeline> {
        let registry = self.registry.read().await;
        registry
            .by_node
            .get(node)
            .into_iter()
            .flatten()
            .filter_map(|id| registry.pipelines.get(id))
            .map(|entry| entry.pipeline.clone())
            .collect()
    }

    /// Number of non-closed pipelines each of `nodes` is a member of.
    pub async fn node_engagement(&self, nodes: &[NodeId]) -> HashMap<NodeId, usize> {
        let registry = self.registry.read().await;
        nodes
            .iter()
            .map(|node| {
                let engaged = registry
                    .by_node
                    .get(node)
                    .into_iter()
                    .flatten()
                    .filter_map(|id| registry.pipelines.get(id))
                    .filter(|entry| !entry.pipeline.is_closed())
                    .count();
                (*node, engaged)
            })
            .collect()
    }

    /// Number of pipelines in each lifecycle state.
    pub async fn state_counts(&self) -> BTreeMap<PipelineState, usize> {
        let registry = self.registry.read().await;
        let mut counts: BTreeMap<PipelineState, usize> =
            PipelineState::ALL.iter().map(|state| (*state, 0)).collect();
        for entry in registry.pipelines.values() {
            *counts.entry(entry.pipeline.state).or_insert(0) += 1;
        }
        counts
    }
}

/// Exclusive mutation rights over one pipeline.
///
/// Obtained from [`PipelineStateStore::lock`]. Dropping the guard lets the
/// next queued caller proceed.
pub struct PipelineGuard<'a> {
    store: &'a PipelineStateStore,
    id: PipelineId,
    _permit: OwnedMutexGuard<()>,
}

impl PipelineGuard<'_> {
    pub fn id(&self) -> PipelineId {
        self.id
    }

    /// Current snapshot of the guarded pipeline.
    pub async fn pipeline(&self) -> PipelineResult<Pipeline> {
        self.store.get(self.id).await
    }

    pub async fn transition(&self, transition: Transition) -> PipelineResult<StateChange> {
        self.store.registry.write().await.transition(self.id, transition)
    }

    pub async fn add_container(&self, container: ContainerId) -> PipelineResult<bool> {
        self.store.registry.write().await.add_container(self.id, container)
    }

    pub async fn remove_container(&self, container: ContainerId) -> PipelineResult<()> {
        self.store.registry.write().await.remove_container(self.id, container)
    }

    pub async fn containers(&self) -> PipelineResult<BTreeSet<ContainerId>> {
        self.store.containers_of(self.id).await
    }

    /// Remove the guarded pipeline. Only closed pipelines can be destroyed.
    pub async fn destroy(self) -> PipelineResult<Pipeline> {
        let mut registry = self.store.registry.write().await;
        let state = registry.entry(&self.id)?.pipeline.state;
        if !state.is_closed() {
            return Err(PipelineError::PipelineNotClosed {
                pipeline: self.id,
                state,
            });
        }
        registry
            .remove(&self.id)
            .map(|entry| entry.pipeline)
            .ok_or(PipelineError::PipelineNotFound(self.id))
    }
}

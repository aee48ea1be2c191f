//! Pipeline manager: the public control-plane surface.
//!
//! The PipelineManager is the orchestrator consumed by block allocation and
//! by cluster health monitoring. It creates pipelines (node selection plus
//! registration), drives lifecycle transitions, keeps container membership,
//! maintains pools of pipelines per replication descriptor and reacts to
//! safe-mode changes.

pub mod creator;

use crate::error::{PipelineError, PipelineResult};
use crate::manager::creator::{BackgroundPipelineCreator, CreatorHandle};
use crate::metrics::{MetricsSink, NoopMetrics};
use crate::nodes::provider::NodeProvider;
use crate::nodes::selector::{ExcludeList, NodeSelector};
use crate::state::lifecycle::{check_transition, Transition};
use crate::state::store::{PipelineStateStore, StateChange};
use chrono::Utc;
use pm_protocol::config_models::ManagerConfig;
use pm_protocol::events::{PipelineEvent, SafeModeStatus};
use pm_protocol::node_models::{NodeDetails, NodeId};
use pm_protocol::pipeline_models::{ContainerId, Pipeline, PipelineId, PipelineState, ReplicationConfig};
use pm_protocol::query_models::PipelineQuery;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// Orchestrates pipeline creation, lifecycle and membership.
pub struct PipelineManager {
    config: ManagerConfig,

    /// Shared registry of every pipeline.
    store: Arc<PipelineStateStore>,

    selector: NodeSelector,

    /// Health source used to confirm readiness before opening.
    nodes: Arc<dyn NodeProvider>,

    metrics: Arc<dyn MetricsSink>,

    /// Channel for lifecycle notifications.
    events_tx: mpsc::UnboundedSender<PipelineEvent>,

    in_safe_mode: AtomicBool,

    /// Held from node selection until the new pipeline is registered, so
    /// engagement counts read by the selector are never stale.
    placement: Mutex<()>,

    /// Serializes pool-size decisions per replication descriptor.
    pool_locks: Mutex<HashMap<ReplicationConfig, Arc<Mutex<()>>>>,

    /// Handle of the running background creator, if started.
    creator: Mutex<Option<CreatorHandle>>,
}

impl PipelineManager {
    /// Create a new PipelineManager.
    ///
    /// The manager starts in safe mode when `config.safe_mode_enabled` is
    /// set; creation stays suspended until the safe-mode subsystem reports
    /// an exit through [`PipelineManager::on_safe_mode_status_change`].
    ///
    /// # Arguments
    ///
    /// * `config` - Pool, placement and scheduling settings
    /// * `store` - The pipeline registry shared with other collaborators
    /// * `nodes` - Node health/topology provider
    /// * `events_tx` - Channel for lifecycle notifications
    pub fn new(
        config: ManagerConfig,
        store: Arc<PipelineStateStore>,
        nodes: Arc<dyn NodeProvider>,
        events_tx: mpsc::UnboundedSender<PipelineEvent>,
    ) -> Self {
        let selector = NodeSelector::new(
            Arc::clone(&nodes),
            Arc::clone(&store),
            config.max_pipelines_per_node,
            config.selection_seed,
        );
        let in_safe_mode = AtomicBool::new(config.safe_mode_enabled);

        Self {
            config,
            store,
            selector,
            nodes,
            metrics: Arc::new(NoopMetrics),
            events_tx,
            in_safe_mode,
            placement: Mutex::new(()),
            pool_locks: Mutex::new(HashMap::new()),
            creator: Mutex::new(None),
        }
    }

    /// Set the sink receiving allocation counters.
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<PipelineStateStore> {
        &self.store
    }

    fn publish(&self, event: PipelineEvent) {
        // Nobody listening is not an error for the core.
        let _ = self.events_tx.send(event);
    }

    // ---- creation ----------------------------------------------------------

    /// Create a pipeline on nodes chosen by the selector.
    ///
    /// The pipeline is registered in the `Allocated` state.
    ///
    /// # Errors
    ///
    /// - `SafeModeActive` while the cluster is in safe mode
    /// - `InsufficientNodes` / `InvalidArgument` from node selection
    /// - `DuplicatePipeline` from the store
    pub async fn create_pipeline(&self, config: ReplicationConfig) -> PipelineResult<Pipeline> {
        self.create_pipeline_excluding(config, &ExcludeList::new()).await
    }

    /// Like [`create_pipeline`](Self::create_pipeline), avoiding the given nodes and pipelines.
    pub async fn create_pipeline_excluding(
        &self,
        config: ReplicationConfig,
        exclude: &ExcludeList,
    ) -> PipelineResult<Pipeline> {
        if self.safe_mode_status() {
            return Err(PipelineError::SafeModeActive);
        }
        self.allocate(config, exclude).await
    }

    /// Create a pipeline on explicitly given nodes, bypassing selection.
    ///
    /// Used for bootstrapping and tests.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` unless exactly `factor` distinct nodes are given.
    pub async fn create_pipeline_with_nodes(
        &self,
        config: ReplicationConfig,
        nodes: Vec<NodeDetails>,
    ) -> PipelineResult<Pipeline> {
        if nodes.len() != config.required_nodes() {
            return Err(PipelineError::InvalidArgument(format!(
                "{config} pipeline needs {} nodes, got {}",
                config.required_nodes(),
                nodes.len()
            )));
        }
        let distinct: HashSet<NodeId> = nodes.iter().map(|n| n.id).collect();
        if distinct.len() != nodes.len() {
            return Err(PipelineError::InvalidArgument(format!(
                "{config} pipeline members must be distinct"
            )));
        }
        let _placement = self.placement.lock().await;
        self.register(Pipeline::allocated(config, nodes)).await
    }

    async fn allocate(&self, config: ReplicationConfig, exclude: &ExcludeList) -> PipelineResult<Pipeline> {
        let _placement = self.placement.lock().await;
        let nodes = self.selector.select(config, exclude).await?;
        self.register(Pipeline::allocated(config, nodes)).await
    }

    async fn register(&self, pipeline: Pipeline) -> PipelineResult<Pipeline> {
        self.store.add(pipeline.clone()).await?;
        tracing::info!(
            pipeline = %pipeline.id,
            config = %pipeline.replication_config(),
            nodes = ?pipeline.nodes.iter().map(|n| n.hostname.as_str()).collect::<Vec<_>>(),
            "created pipeline"
        );
        self.publish(PipelineEvent::PipelineCreated {
            pipeline_id: pipeline.id,
            config: pipeline.replication_config(),
        });
        Ok(pipeline)
    }

    // ---- lifecycle ---------------------------------------------------------

    /// Move an `Allocated` pipeline to `Open` once all members are healthy.
    ///
    /// # Errors
    ///
    /// - `PipelineNotFound` for unknown ids
    /// - `InvalidStateTransition` unless the pipeline is `Allocated`
    /// - `PipelineNotReady` if any member is not healthy
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn open_pipeline(&self, id: PipelineId) -> PipelineResult<()> {
        let guard = self.store.lock(id).await?;
        let pipeline = guard.pipeline().await?;
        check_transition(&pipeline, Transition::Open)?;

        let mut unready = 0;
        for node in pipeline.node_ids() {
            if !self.nodes.is_healthy(&node).await {
                unready += 1;
            }
        }
        if unready > 0 {
            tracing::debug!(pipeline = %id, unready, "pipeline members not ready");
            return Err(PipelineError::PipelineNotReady { pipeline: id, unready });
        }

        guard.transition(Transition::Open).await?;
        self.publish(PipelineEvent::PipelineOpened { pipeline_id: id });
        tracing::info!(pipeline = %id, "opened pipeline");
        Ok(())
    }

    /// Close a pipeline. Its containers stay in the pipeline for reads and
    /// repair but no further containers can be added.
    ///
    /// `on_timeout` marks closes caused by timeouts or health failures; with
    /// `replace_on_timeout` configured they request a replacement pipeline
    /// for the same descriptor.
    ///
    /// # Errors
    ///
    /// - `PipelineNotFound` for unknown ids
    /// - `InvalidStateTransition` if the pipeline is already closed
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn close_pipeline(&self, id: PipelineId, on_timeout: bool) -> PipelineResult<()> {
        self.close_and_replace(id, on_timeout, &ExcludeList::new()).await
    }

    /// Close `id`; a replacement, if one is requested, avoids `exclude`.
    async fn close_and_replace(&self, id: PipelineId, on_timeout: bool, exclude: &ExcludeList) -> PipelineResult<()> {
        let change = {
            let guard = self.store.lock(id).await?;
            let change = guard.transition(Transition::Close).await?;
            self.publish(PipelineEvent::PipelineClosed {
                pipeline_id: id,
                on_timeout,
                containers: change.containers.iter().copied().collect(),
            });
            change
        };
        tracing::info!(
            pipeline = %id,
            from = %change.from,
            on_timeout,
            containers = change.containers.len(),
            "closed pipeline"
        );

        if on_timeout && self.config.replace_on_timeout && !self.safe_mode_status() {
            let created = self.fill_pool(change.pipeline.replication_config(), exclude).await;
            tracing::debug!(pipeline = %id, created, "requested replacement after timeout close");
        }
        Ok(())
    }

    /// Put a `Dormant` pipeline back into service.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn activate_pipeline(&self, id: PipelineId) -> PipelineResult<()> {
        self.toggle(id, Transition::Activate).await?;
        self.publish(PipelineEvent::PipelineActivated { pipeline_id: id });
        Ok(())
    }

    /// Take an `Open` pipeline out of the assignment pool without closing it.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn deactivate_pipeline(&self, id: PipelineId) -> PipelineResult<()> {
        self.toggle(id, Transition::Deactivate).await?;
        self.publish(PipelineEvent::PipelineDeactivated { pipeline_id: id });
        Ok(())
    }

    async fn toggle(&self, id: PipelineId, transition: Transition) -> PipelineResult<StateChange> {
        let change = self.store.lock(id).await?.transition(transition).await?;
        tracing::info!(pipeline = %id, from = %change.from, to = %change.pipeline.state, "pipeline state changed");
        Ok(change)
    }

    /// Remove a closed pipeline from the registry.
    ///
    /// # Errors
    ///
    /// `PipelineNotClosed` unless the pipeline is `Closed`.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn destroy_pipeline(&self, id: PipelineId) -> PipelineResult<()> {
        let removed = self.store.lock(id).await?.destroy().await?;
        self.publish(PipelineEvent::PipelineDestroyed { pipeline_id: id });
        tracing::info!(pipeline = %id, config = %removed.replication_config(), "destroyed pipeline");
        Ok(())
    }

    /// Close every non-closed pipeline that `node` is a member of.
    ///
    /// Closes are flagged as timeouts. Replacements never use `node`, even
    /// if the provider still reports it healthy. Pipelines closed
    /// concurrently by another caller are skipped.
    pub async fn close_pipelines_on_node(&self, node: &NodeId) -> PipelineResult<Vec<PipelineId>> {
        let exclude = ExcludeList::new().with_node(*node);
        let mut closed = Vec::new();
        for pipeline in self.store.pipelines_of_node(node).await {
            if pipeline.is_closed() {
                continue;
            }
            match self.close_and_replace(pipeline.id, true, &exclude).await {
                Ok(()) => closed.push(pipeline.id),
                Err(PipelineError::InvalidStateTransition { .. } | PipelineError::PipelineNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        if !closed.is_empty() {
            tracing::warn!(node = %node, closed = closed.len(), "closed pipelines on failed node");
        }
        Ok(closed)
    }

    /// Close `Allocated` pipelines of `config` that never opened within
    /// `allocated_timeout_secs`.
    pub async fn scrub_pipelines(&self, config: ReplicationConfig) -> PipelineResult<Vec<PipelineId>> {
        let timeout = i64::try_from(self.config.allocated_timeout_secs).unwrap_or(i64::MAX);
        let now = Utc::now();
        let query = PipelineQuery::for_config(config).with_state(PipelineState::Allocated);

        let mut scrubbed = Vec::new();
        for pipeline in self.store.list(&query).await {
            if now.signed_duration_since(pipeline.created_at).num_seconds() < timeout {
                continue;
            }
            match self.close_pipeline(pipeline.id, true).await {
                Ok(()) => scrubbed.push(pipeline.id),
                Err(PipelineError::InvalidStateTransition { .. } | PipelineError::PipelineNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        if !scrubbed.is_empty() {
            tracing::info!(%config, scrubbed = scrubbed.len(), "scrubbed stale allocated pipelines");
        }
        Ok(scrubbed)
    }

    // ---- queries -----------------------------------------------------------

    pub async fn get_pipeline(&self, id: PipelineId) -> PipelineResult<Pipeline> {
        self.store.get(id).await
    }

    /// Snapshot of every pipeline matching `query`.
    pub async fn get_pipelines(&self, query: &PipelineQuery) -> Vec<Pipeline> {
        self.store.list(query).await
    }

    pub async fn contains_pipeline(&self, id: PipelineId) -> bool {
        self.store.contains(id).await
    }

    /// Number of pipelines in each lifecycle state.
    pub async fn pipeline_info(&self) -> BTreeMap<PipelineState, usize> {
        self.store.state_counts().await
    }

    // ---- container membership ----------------------------------------------

    /// Assign a container to a pipeline.
    ///
    /// Re-adding a container already in this pipeline succeeds without change.
    ///
    /// # Errors
    ///
    /// - `PipelineNotFound` for unknown ids
    /// - `PipelineDormant` if the pipeline is dormant
    /// - `PipelineClosed` if the pipeline is closed
    /// - `ContainerAlreadyAssigned` if another pipeline owns the container
    pub async fn add_container_to_pipeline(&self, id: PipelineId, container: ContainerId) -> PipelineResult<()> {
        let guard = self.store.lock(id).await?;
        if guard.add_container(container).await? {
            self.publish(PipelineEvent::ContainerAdded {
                pipeline_id: id,
                container_id: container,
            });
            tracing::debug!(pipeline = %id, %container, "added container");
        }
        Ok(())
    }

    /// Remove a container from a pipeline.
    ///
    /// # Errors
    ///
    /// - `PipelineNotFound` for unknown ids
    /// - `ContainerNotFound` if the container is not in this pipeline
    pub async fn remove_container_from_pipeline(&self, id: PipelineId, container: ContainerId) -> PipelineResult<()> {
        let guard = self.store.lock(id).await?;
        guard.remove_container(container).await?;
        self.publish(PipelineEvent::ContainerRemoved {
            pipeline_id: id,
            container_id: container,
        });
        tracing::debug!(pipeline = %id, %container, "removed container");
        Ok(())
    }

    pub async fn get_containers_in_pipeline(&self, id: PipelineId) -> PipelineResult<BTreeSet<ContainerId>> {
        self.store.containers_of(id).await
    }

    pub async fn get_number_of_containers(&self, id: PipelineId) -> PipelineResult<usize> {
        Ok(self.store.containers_of(id).await?.len())
    }

    /// Count one allocated block against `id`. Never fails.
    pub fn inc_blocks_allocated(&self, id: PipelineId) {
        self.metrics.inc_blocks_allocated(id);
    }

    // ---- pools and safe mode -----------------------------------------------

    pub fn safe_mode_status(&self) -> bool {
        self.in_safe_mode.load(Ordering::SeqCst)
    }

    /// React to a safe-mode status change.
    ///
    /// Leaving safe mode triggers pipeline creation; the number of
    /// pipelines created by that trigger is returned.
    pub async fn on_safe_mode_status_change(&self, status: SafeModeStatus) -> usize {
        let was_in_safe_mode = self.in_safe_mode.swap(status.in_safe_mode, Ordering::SeqCst);
        if was_in_safe_mode == status.in_safe_mode {
            return 0;
        }
        tracing::info!(in_safe_mode = status.in_safe_mode, "safe mode status changed");
        if status.in_safe_mode {
            return 0;
        }
        self.trigger_pipeline_creation().await
    }

    /// Fill the pool of every maintained descriptor up to
    /// `min_pipelines_per_descriptor`. No-op in safe mode.
    ///
    /// Returns the number of pipelines created.
    pub async fn trigger_pipeline_creation(&self) -> usize {
        if self.safe_mode_status() {
            tracing::debug!("skipping pipeline creation while in safe mode");
            return 0;
        }
        let mut created = 0;
        for config in self.config.maintained_descriptors() {
            created += self.fill_pool(config, &ExcludeList::new()).await;
        }
        created
    }

    async fn pool_lock(&self, config: ReplicationConfig) -> Arc<Mutex<()>> {
        let mut locks = self.pool_locks.lock().await;
        Arc::clone(locks.entry(config).or_default())
    }

    /// Create pipelines for `config` until the pool target is met.
    ///
    /// Allocated pipelines count towards the pool so that triggers racing
    /// ahead of node readiness never overshoot. The count is re-read under
    /// the descriptor's lock, so concurrent triggers cannot both create the
    /// same missing pipeline.
    async fn fill_pool(&self, config: ReplicationConfig, exclude: &ExcludeList) -> usize {
        let lock = self.pool_lock(config).await;
        let _pool = lock.lock().await;

        let pooled = PipelineQuery::for_config(config);
        let current = self.store.count(&pooled.clone().with_state(PipelineState::Allocated)).await
            + self.store.count(&pooled.with_state(PipelineState::Open)).await;

        let mut created = 0;
        while current + created < self.config.min_pipelines_per_descriptor {
            if self.safe_mode_status() {
                break;
            }
            match self.allocate(config, exclude).await {
                Ok(_) => created += 1,
                Err(PipelineError::InsufficientNodes { available, .. }) => {
                    tracing::debug!(%config, available, "pool fill stopped: not enough nodes");
                    break;
                }
                Err(e) => {
                    tracing::warn!(%config, error = %e, "pool fill failed");
                    break;
                }
            }
        }
        created
    }

    /// One scheduled pass of the background creator: scrub stale allocated
    /// pipelines, then refill pools.
    pub async fn run_creator_pass(&self) -> usize {
        for config in self.config.maintained_descriptors() {
            if let Err(e) = self.scrub_pipelines(config).await {
                tracing::warn!(%config, error = %e, "scrub failed");
            }
        }
        self.trigger_pipeline_creation().await
    }

    /// Start the periodic background creator. Calling it again while the
    /// creator runs has no effect.
    pub async fn start_pipeline_creator(self: &Arc<Self>) {
        let mut creator = self.creator.lock().await;
        if creator.is_some() {
            return;
        }
        let interval = Duration::from_secs(self.config.creation_interval_secs.max(1));
        *creator = Some(BackgroundPipelineCreator::spawn(self, interval));
        tracing::info!(interval_secs = interval.as_secs(), "started background pipeline creator");
    }

    /// Ask a running background creator for an immediate pass.
    pub async fn notify_pipeline_creator(&self) -> bool {
        match self.creator.lock().await.as_ref() {
            Some(handle) => {
                handle.trigger();
                true
            }
            None => false,
        }
    }

    /// Stop the background creator, waiting for an in-flight pass to finish.
    pub async fn close(&self) {
        let handle = self.creator.lock().await.take();
        if let Some(handle) = handle {
            handle.shutdown().await;
            tracing::info!("stopped background pipeline creator");
        }
    }
}

//! Integration tests for pool maintenance and safe-mode gating.
//!
//! These tests verify:
//! - Pool filling up to the per-descriptor target
//! - Safe-mode suspension and resumption of creation
//! - Replacement of pipelines closed on timeout
//! - Scrubbing of stale allocated pipelines
//! - The periodic background creator

mod common;

use chrono::Utc;
use common::*;
use pm_core::PipelineError;
use pm_protocol::config_models::ManagerConfig;
use pm_protocol::events::SafeModeStatus;
use pm_protocol::pipeline_models::{Pipeline, PipelineState};
use pm_protocol::query_models::PipelineQuery;
use std::time::Duration;

async fn pooled(cluster: &TestCluster) -> usize {
    let query = PipelineQuery::for_config(quorum_three());
    cluster.store.count(&query.clone().with_state(PipelineState::Allocated)).await
        + cluster.store.count(&query.with_state(PipelineState::Open)).await
}

#[tokio::test]
async fn test_trigger_fills_pool_to_target() {
    let cluster = TestCluster::with_defaults();

    assert_eq!(cluster.manager.trigger_pipeline_creation().await, 2);
    assert_eq!(pooled(&cluster).await, 2);

    // A satisfied pool is left alone
    assert_eq!(cluster.manager.trigger_pipeline_creation().await, 0);
    assert_eq!(cluster.store.len().await, 2);
    assert_store_consistent(&cluster.store).await;
}

#[tokio::test]
async fn test_open_pipelines_count_towards_pool() {
    let cluster = TestCluster::with_defaults();
    let manager = &cluster.manager;

    let pipeline = manager.create_pipeline(quorum_three()).await.unwrap();
    manager.open_pipeline(pipeline.id).await.unwrap();
    let dormant = manager.create_pipeline(quorum_three()).await.unwrap();
    manager.open_pipeline(dormant.id).await.unwrap();
    manager.deactivate_pipeline(dormant.id).await.unwrap();

    // Dormant pipelines are out of the assignment pool
    assert_eq!(manager.trigger_pipeline_creation().await, 1);
    assert_eq!(pooled(&cluster).await, 2);
}

#[tokio::test]
async fn test_pool_fill_stops_at_node_shortage() {
    let config = ManagerConfig {
        min_pipelines_per_descriptor: 5,
        max_pipelines_per_node: 1,
        ..test_config()
    };
    let cluster = TestCluster::new(config, create_test_nodes(7, 3));

    // Seven nodes with one pipeline each fit two quorum/three pipelines
    assert_eq!(cluster.manager.trigger_pipeline_creation().await, 2);
    assert_eq!(cluster.store.len().await, 2);

    let engagement = cluster
        .store
        .node_engagement(&cluster.nodes.iter().map(|n| n.id).collect::<Vec<_>>())
        .await;
    assert!(engagement.values().all(|count| *count <= 1));
}

#[tokio::test]
async fn test_safe_mode_gates_creation() {
    let config = ManagerConfig {
        safe_mode_enabled: true,
        ..test_config()
    };
    let cluster = TestCluster::new(config, create_test_nodes(9, 3));
    let manager = &cluster.manager;

    assert!(manager.safe_mode_status());
    assert_eq!(manager.trigger_pipeline_creation().await, 0);
    assert_eq!(
        manager.create_pipeline(quorum_three()).await.unwrap_err(),
        PipelineError::SafeModeActive
    );
    assert!(cluster.store.is_empty().await);

    // Explicit placement is still allowed for bootstrapping
    manager
        .create_pipeline_with_nodes(quorum_three(), cluster.nodes[..3].to_vec())
        .await
        .unwrap();

    // Leaving safe mode fills the pool right away
    assert_eq!(manager.on_safe_mode_status_change(SafeModeStatus::exited()).await, 1);
    assert!(!manager.safe_mode_status());
    assert_eq!(pooled(&cluster).await, 2);

    // Repeated notifications are no-ops
    assert_eq!(manager.on_safe_mode_status_change(SafeModeStatus::exited()).await, 0);

    assert_eq!(manager.on_safe_mode_status_change(SafeModeStatus::entered()).await, 0);
    assert!(manager.safe_mode_status());
    assert_eq!(manager.trigger_pipeline_creation().await, 0);
}

#[tokio::test]
async fn test_timeout_close_requests_replacement() {
    let cluster = TestCluster::with_defaults();
    let manager = &cluster.manager;
    manager.trigger_pipeline_creation().await;

    let victim = manager
        .get_pipelines(&PipelineQuery::for_config(quorum_three()))
        .await
        .remove(0);
    manager.close_pipeline(victim.id, true).await.unwrap();

    assert!(manager.get_pipeline(victim.id).await.unwrap().is_closed());
    assert_eq!(pooled(&cluster).await, 2);
    assert_eq!(cluster.store.len().await, 3);
}

#[tokio::test]
async fn test_regular_close_does_not_replace() {
    let cluster = TestCluster::with_defaults();
    let manager = &cluster.manager;
    manager.trigger_pipeline_creation().await;

    let victim = manager
        .get_pipelines(&PipelineQuery::for_config(quorum_three()))
        .await
        .remove(0);
    manager.close_pipeline(victim.id, false).await.unwrap();

    assert_eq!(pooled(&cluster).await, 1);
}

#[tokio::test]
async fn test_replacement_disabled_by_config() {
    let config = ManagerConfig {
        replace_on_timeout: false,
        ..test_config()
    };
    let cluster = TestCluster::new(config, create_test_nodes(9, 3));
    let manager = &cluster.manager;
    manager.trigger_pipeline_creation().await;

    let victim = manager
        .get_pipelines(&PipelineQuery::for_config(quorum_three()))
        .await
        .remove(0);
    manager.close_pipeline(victim.id, true).await.unwrap();

    assert_eq!(pooled(&cluster).await, 1);
}

#[tokio::test]
async fn test_scrub_closes_stale_allocated_pipelines() {
    let config = ManagerConfig {
        replace_on_timeout: false,
        allocated_timeout_secs: 60,
        ..test_config()
    };
    let cluster = TestCluster::new(config, create_test_nodes(9, 3));
    let manager = &cluster.manager;

    let mut stale = Pipeline::allocated(quorum_three(), cluster.nodes[..3].to_vec());
    stale.created_at = Utc::now() - chrono::Duration::seconds(600);
    cluster.store.add(stale.clone()).await.unwrap();

    let mut stale_but_open = Pipeline::allocated(quorum_three(), cluster.nodes[3..6].to_vec());
    stale_but_open.created_at = Utc::now() - chrono::Duration::seconds(600);
    cluster.store.add(stale_but_open.clone()).await.unwrap();
    manager.open_pipeline(stale_but_open.id).await.unwrap();

    let fresh = manager.create_pipeline(quorum_three()).await.unwrap();

    let scrubbed = manager.scrub_pipelines(quorum_three()).await.unwrap();
    assert_eq!(scrubbed, vec![stale.id]);
    assert!(manager.get_pipeline(stale.id).await.unwrap().is_closed());
    assert!(manager.get_pipeline(stale_but_open.id).await.unwrap().is_open());
    assert_eq!(
        manager.get_pipeline(fresh.id).await.unwrap().state,
        PipelineState::Allocated
    );
}

#[tokio::test]
async fn test_background_creator_fills_and_stops() {
    let config = ManagerConfig {
        creation_interval_secs: 3600,
        ..test_config()
    };
    let cluster = TestCluster::new(config, create_test_nodes(9, 3));
    let manager = &cluster.manager;

    manager.start_pipeline_creator().await;
    // Starting twice keeps the single running creator
    manager.start_pipeline_creator().await;

    // The first tick fires immediately
    tokio::time::timeout(Duration::from_secs(5), async {
        while pooled(&cluster).await < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("creator should fill the pool");

    let victim = manager
        .get_pipelines(&PipelineQuery::for_config(quorum_three()))
        .await
        .remove(0);
    manager.close_pipeline(victim.id, false).await.unwrap();
    assert!(manager.notify_pipeline_creator().await);

    tokio::time::timeout(Duration::from_secs(5), async {
        while pooled(&cluster).await < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("an explicit trigger should refill the pool");

    manager.close().await;
    assert!(!manager.notify_pipeline_creator().await);
    assert_eq!(pooled(&cluster).await, 2);
}

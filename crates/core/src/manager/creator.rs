//! Background pipeline creator.
//!
//! A periodic task that scrubs stale allocated pipelines and refills the
//! pools of every maintained descriptor. Passes run on a fixed interval and
//! on demand; pool-size decisions are serialized inside the manager, so a
//! pass racing an explicit trigger never overshoots the pool target.

use crate::manager::PipelineManager;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Periodic creation task.
///
/// Holds a weak reference so that dropping the manager ends the task.
pub struct BackgroundPipelineCreator {
    manager: Weak<PipelineManager>,
    interval: Duration,
    trigger: Arc<Notify>,
    /// Shutdown signal.
    shutdown: watch::Receiver<bool>,
}

/// Control handle of a spawned creator.
pub struct CreatorHandle {
    trigger: Arc<Notify>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl BackgroundPipelineCreator {
    /// Spawn the creator for `manager`, running a pass every `interval`.
    pub fn spawn(manager: &Arc<PipelineManager>, interval: Duration) -> CreatorHandle {
        let (shutdown_tx, shutdown) = watch::channel(false);
        let trigger = Arc::new(Notify::new());
        let creator = Self {
            manager: Arc::downgrade(manager),
            interval,
            trigger: Arc::clone(&trigger),
            shutdown,
        };
        CreatorHandle {
            trigger,
            shutdown_tx,
            task: tokio::spawn(creator.run()),
        }
    }

    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.trigger.notified() => {}
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            let Some(manager) = self.manager.upgrade() else {
                break;
            };
            let created = manager.run_creator_pass().await;
            if created > 0 {
                tracing::info!(created, "background creator filled pipeline pools");
            }
        }
        tracing::debug!("background pipeline creator shutdown");
    }
}

impl CreatorHandle {
    /// Request an immediate pass. Requests arriving during a pass coalesce
    /// into one follow-up pass.
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    /// Signal shutdown and wait for the task to finish its current pass.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "background pipeline creator task failed");
        }
    }
}

// Copyright (c) 2026 Warden Contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Dependency-ordered startup and graceful shutdown of a workspace's
//! subsystems, section 4.8. Opening the durable stores themselves
//! (`SessionManager`, `ConversationArchiver`, `SubAgentStore`) is inherently
//! async and happens before a `LifecycleManager` is constructed; `start()`
//! below picks up at "create channels and register handlers".
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use warden_channels::Channel;
use warden_config::LanesConfig;
use warden_core::{ApprovalGate, LaneQueue, MessageProcessor, QueueManager};

use crate::scheduler::{CronScheduler, HeartbeatScheduler};
use crate::subagent::{SubAgentRunner, SubAgentStore};

const CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);
const APPROVAL_GRACE: Duration = Duration::from_secs(10 * 60);
const SUBAGENT_KEEP: usize = 200;

/// Everything a workspace needs started in order and stopped in reverse.
/// Assembled once at process startup from already-constructed components;
/// owns none of the construction logic for the LLM boundary or the channel
/// transport, both of which are external collaborators handed in ready to
/// use.
pub struct LifecycleManager {
    workspace_name: String,
    channel: Arc<dyn Channel>,
    lane_queue: Arc<LaneQueue>,
    lanes_config: LanesConfig,
    message_processor: Arc<MessageProcessor>,
    approval_gate: Arc<ApprovalGate>,
    subagent_store: Arc<SubAgentStore>,
    heartbeat: Option<Arc<HeartbeatScheduler>>,
    cron: Option<Arc<CronScheduler>>,
    lane_worker_handles: Mutex<Vec<JoinHandle<()>>>,
    cleanup_handle: Mutex<Option<JoinHandle<()>>>,
}

impl LifecycleManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        workspace_name: impl Into<String>,
        channel: Arc<dyn Channel>,
        lane_queue: Arc<LaneQueue>,
        lanes_config: LanesConfig,
        message_processor: Arc<MessageProcessor>,
        approval_gate: Arc<ApprovalGate>,
        subagent_store: Arc<SubAgentStore>,
        heartbeat: Option<Arc<HeartbeatScheduler>>,
        cron: Option<Arc<CronScheduler>>,
    ) -> Self {
        Self {
            workspace_name: workspace_name.into(),
            channel,
            lane_queue,
            lanes_config,
            message_processor,
            approval_gate,
            subagent_store,
            heartbeat,
            cron,
            lane_worker_handles: Mutex::new(Vec::new()),
            cleanup_handle: Mutex::new(None),
        }
    }

    /// Step order: start the channel, start cron, start heartbeat, spin up
    /// the main-lane workers, spin up the periodic cleanup task. Each step
    /// is best-effort: a failure is logged and startup continues, matching
    /// the reference's per-subsystem try/except around each setup call.
    pub async fn start(self: &Arc<Self>) {
        if let Err(err) = self.channel.start().await {
            error!(workspace = %self.workspace_name, %err, "failed to start channel");
        } else {
            info!(workspace = %self.workspace_name, channel = self.channel.name(), "channel started");
        }

        if let Some(cron) = &self.cron {
            cron.start().await;
        }

        if let Some(heartbeat) = &self.heartbeat {
            heartbeat.start().await;
        }

        let processor = Arc::clone(&self.message_processor);
        let handles = self.lane_queue.spawn_workers(
            "main",
            self.lanes_config.main,
            move |item| {
                let processor = Arc::clone(&processor);
                async move {
                    processor.process_batch(&item.session_key, &item.messages).await;
                }
            },
        );
        *self.lane_worker_handles.lock().await = handles;
        info!(workspace = %self.workspace_name, workers = self.lanes_config.main, "main lane workers started");

        let this = Arc::clone(self);
        let cleanup = tokio::spawn(async move { this.run_cleanup_loop().await });
        *self.cleanup_handle.lock().await = Some(cleanup);

        info!(workspace = %self.workspace_name, "workspace startup complete");
    }

    async fn run_cleanup_loop(&self) {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            let cleared = self.approval_gate.sweep_stale_approvals(APPROVAL_GRACE).await;
            let dropped = self.subagent_store.trim_finished(SUBAGENT_KEEP).await;
            if cleared > 0 || dropped > 0 {
                info!(workspace = %self.workspace_name, cleared, dropped, "periodic cleanup swept stale state");
            }
        }
    }

    /// Shutdown is strict reverse of `start()`, with one extra step between
    /// stopping the channel and considering the durable stores closed:
    /// archive every active conversation tagged `"shutdown"`. Each step is
    /// best-effort so one broken subsystem never blocks the rest from
    /// stopping cleanly.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.cleanup_handle.lock().await.take() {
            handle.abort();
        }

        for handle in self.lane_worker_handles.lock().await.drain(..) {
            handle.abort();
        }
        info!(workspace = %self.workspace_name, "main lane workers stopped");

        if let Some(heartbeat) = &self.heartbeat {
            heartbeat.stop().await;
        }

        if let Some(cron) = &self.cron {
            cron.stop().await;
        }

        if let Err(err) = self.channel.stop().await {
            warn!(workspace = %self.workspace_name, %err, "failed to stop channel cleanly");
        } else {
            info!(workspace = %self.workspace_name, "channel stopped");
        }

        self.message_processor.archive_all_active("shutdown").await;

        self.approval_gate.cleanup().await;

        info!(workspace = %self.workspace_name, "workspace shutdown complete");
    }
}

// Copyright (c) 2026 Warden Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};
use warden_config::{QueueMode, ToolTimeoutsConfig};
use warden_tools::{timeout_for, ToolCall, ToolContinuation, ToolOutput};

use crate::approval::ApprovalGate;
use crate::message::Message;
use crate::prompts::STEER_SKIP_MESSAGE;
use crate::queue::QueueManager;

/// A control-flow signal a middleware raises instead of a normal tool
/// result. Propagates out of the whole chain to the turn loop.
#[derive(Debug)]
pub enum MiddlewareSignal {
    Interrupted(Vec<(String, Message)>),
    ApprovalRequired(crate::approval::PendingApproval),
}

/// Per-turn context the chain needs; set before each `AgentRunner::run` and
/// cleared after, mirroring the queue-aware/approval middleware's own
/// `set_context`/`reset` lifecycle in the reference implementation.
#[derive(Debug, Clone)]
pub struct MiddlewareContext {
    pub session_key: String,
    pub thread_id: String,
    pub queue_mode: QueueMode,
}

#[derive(Default)]
struct TurnState {
    context: Option<MiddlewareContext>,
    steered: bool,
    pending_steer_message: Option<Vec<(String, Message)>>,
}

/// The fixed-order tool-execution middleware chain: per-call timeout →
/// queue-aware steer/interrupt → approval gate.
pub struct MiddlewareChain {
    tool_timeouts: ToolTimeoutsConfig,
    queue_manager: Arc<QueueManager>,
    approval_gate: Arc<ApprovalGate>,
    state: Mutex<TurnState>,
}

impl MiddlewareChain {
    pub fn new(tool_timeouts: ToolTimeoutsConfig, queue_manager: Arc<QueueManager>, approval_gate: Arc<ApprovalGate>) -> Self {
        Self {
            tool_timeouts,
            queue_manager,
            approval_gate,
            state: Mutex::new(TurnState::default()),
        }
    }

    pub async fn set_context(&self, context: MiddlewareContext) {
        let mut state = self.state.lock().await;
        state.context = Some(context);
        state.steered = false;
        state.pending_steer_message = None;
    }

    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        *state = TurnState::default();
    }

    pub async fn was_steered(&self) -> bool {
        self.state.lock().await.steered
    }

    pub async fn take_pending_steer_message(&self) -> Option<Vec<(String, Message)>> {
        self.state.lock().await.pending_steer_message.take()
    }

    /// Run `call` through the whole chain against `continuation`.
    pub async fn run_tool(&self, call: &ToolCall, continuation: &dyn ToolContinuation) -> Result<ToolOutput, MiddlewareSignal> {
        let timeout = timeout_for(&self.tool_timeouts, &call.name);
        match tokio::time::timeout(timeout, self.run_queue_aware(call, continuation)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(tool = %call.name, seconds = timeout.as_secs(), "tool call timed out");
                Ok(ToolOutput::err(format!(
                    "[Tool '{}' timed out after {}s. Try a different approach or break the operation into smaller steps.]",
                    call.name,
                    timeout.as_secs()
                )))
            }
        }
    }

    async fn run_queue_aware(&self, call: &ToolCall, continuation: &dyn ToolContinuation) -> Result<ToolOutput, MiddlewareSignal> {
        let context = self.state.lock().await.context.clone();
        let Some(context) = context else {
            return self.run_approval(call, continuation).await;
        };

        if context.queue_mode == QueueMode::Collect {
            return self.run_approval(call, continuation).await;
        }

        let has_pending = self.queue_manager.peek_pending(&context.session_key).await;
        debug!(tool = %call.name, session_key = %context.session_key, has_pending, "queue-aware middleware check");
        if !has_pending {
            return self.run_approval(call, continuation).await;
        }

        match context.queue_mode {
            QueueMode::Steer | QueueMode::SteerBacklog => {
                let mut state = self.state.lock().await;
                if !state.steered {
                    drop(state);
                    let pending = self.queue_manager.consume_pending(&context.session_key).await;
                    if context.queue_mode == QueueMode::SteerBacklog {
                        for (channel, message) in &pending {
                            self.queue_manager
                                .submit(&context.session_key, channel, message.clone(), Some(QueueMode::Followup))
                                .await;
                        }
                    }
                    info!(tool = %call.name, count = pending.len(), "steer triggered, skipping tool");
                    let mut state = self.state.lock().await;
                    state.pending_steer_message = Some(pending);
                    state.steered = true;
                } else {
                    drop(state);
                }
                Ok(ToolOutput::ok(STEER_SKIP_MESSAGE))
            }
            QueueMode::Interrupt => {
                let pending = self.queue_manager.consume_pending(&context.session_key).await;
                info!(tool = %call.name, count = pending.len(), "interrupt triggered, aborting tool");
                Err(MiddlewareSignal::Interrupted(pending))
            }
            _ => self.run_approval(call, continuation).await,
        }
    }

    async fn run_approval(&self, call: &ToolCall, continuation: &dyn ToolContinuation) -> Result<ToolOutput, MiddlewareSignal> {
        let context = self.state.lock().await.context.clone();
        let Some(context) = context else {
            return Ok(continuation.invoke(call).await);
        };

        if !self.approval_gate.requires_approval(&call.name) {
            return Ok(continuation.invoke(call).await);
        }

        if self.approval_gate.check_recent_approval(&context.session_key, &call.name).await {
            info!(tool = %call.name, session_key = %context.session_key, "recent approval bypass, executing without prompt");
            let result = continuation.invoke(call).await;
            self.approval_gate.clear_recent_approval(&context.session_key, &call.name).await;
            return Ok(result);
        }

        let approval = self
            .approval_gate
            .request_approval(&call.name, call.args.clone(), &context.session_key, &context.thread_id)
            .await;
        info!(tool = %call.name, approval_id = %approval.id, "approval required");
        Err(MiddlewareSignal::ApprovalRequired(approval))
    }
}

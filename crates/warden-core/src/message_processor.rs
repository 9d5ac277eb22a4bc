// Copyright (c) 2026 Warden Contributors
//
// SPDX-License-Identifier: Apache-2.0
//! The turn loop: coordinates auto-compact, followup chains, steer
//! redirects, interrupt handling, and approval pauses around
//! [`AgentRunner`] invocations. Runs on the `main` lane worker once a batch
//! of coalesced messages has been handed to it.
use std::sync::Arc;

use tracing::{error, info, warn};
use warden_channels::{parse_command, Channel, Command, SendOptions};
use warden_config::{AutoCompactConfig, QueueMode};

use crate::agent_runner::{AgentRunner, FollowupRequest, TurnOutcome};
use crate::approval::ApprovalGate;
use crate::archive::ConversationArchiver;
use crate::message::Message;
use crate::middleware::{MiddlewareChain, MiddlewareContext};
use crate::prompts::{compacted_template, followup_template, tool_denied_template, SUMMARIZE_PROMPT};
use crate::queue::QueueManager;
use crate::session::SessionManager;

const MAX_FOLLOWUP_DEPTH: u32 = 5;

const WELCOME_TEXT: &str = "Warden is running. Send a message to start a conversation, or /help to see framework commands.";

const HELP_TEXT: &str = "Available commands:\n\
/new - archive the current conversation and start a fresh one\n\
/compact - summarise and archive the current conversation, continuing with the summary\n\
/queue <collect|steer|followup|interrupt|default|reset> - set this session's queue mode\n\
/status - report workspace, model, conversation, and usage info\n\
/model [provider:model] - show or note the active model\n\
/approve <id> - approve a pending tool call\n\
/deny <id> - deny a pending tool call";

/// Assembled once per workspace and handed one coalesced batch at a time by
/// the `main` lane worker.
pub struct MessageProcessor {
    workspace_name: String,
    model_label: String,
    session_manager: Arc<SessionManager>,
    queue_manager: Arc<QueueManager>,
    archiver: Arc<ConversationArchiver>,
    approval_gate: Arc<ApprovalGate>,
    middleware: Arc<MiddlewareChain>,
    agent_runner: Arc<dyn AgentRunner>,
    channel: Arc<dyn Channel>,
    auto_compact: AutoCompactConfig,
    notify_auto_compact: bool,
}

impl MessageProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        workspace_name: impl Into<String>,
        model_label: impl Into<String>,
        session_manager: Arc<SessionManager>,
        queue_manager: Arc<QueueManager>,
        archiver: Arc<ConversationArchiver>,
        approval_gate: Arc<ApprovalGate>,
        middleware: Arc<MiddlewareChain>,
        agent_runner: Arc<dyn AgentRunner>,
        channel: Arc<dyn Channel>,
        auto_compact: AutoCompactConfig,
        notify_auto_compact: bool,
    ) -> Self {
        Self {
            workspace_name: workspace_name.into(),
            model_label: model_label.into(),
            session_manager,
            queue_manager,
            archiver,
            approval_gate,
            middleware,
            agent_runner,
            channel,
            auto_compact,
            notify_auto_compact,
        }
    }

    /// Run one batch of coalesced messages through a full turn, including
    /// followups, steer redirects, interrupts, and approval pauses. Never
    /// returns an error: every failure path ends in a user-visible message
    /// or a logged, swallowed failure, matching the lane loop's "handler
    /// exceptions must never stop draining" contract.
    pub async fn process_batch(&self, session_key: &str, messages: &[Message]) {
        if let [message] = messages {
            if let Some(command) = parse_command(&message.content) {
                self.handle_command(session_key, command).await;
                return;
            }
        }

        let mut combined = join_message_contents(messages);

        let mut thread_id = match self.session_manager.get_thread_id(session_key).await {
            Ok(id) => id,
            Err(err) => {
                error!(session_key, %err, "failed to resolve thread id, dropping batch");
                return;
            }
        };

        if let Err(err) = self.session_manager.increment_message_count(session_key).await {
            warn!(session_key, %err, "failed to persist message count");
        }

        if self.auto_compact.enabled {
            thread_id = self.maybe_auto_compact(session_key, &thread_id).await;
        }

        let mut followup_depth: u32 = 0;

        loop {
            let session_mode = self.queue_manager.get_session_mode(session_key).await;
            self.middleware
                .set_context(MiddlewareContext {
                    session_key: session_key.to_string(),
                    thread_id: thread_id.clone(),
                    queue_mode: session_mode,
                })
                .await;

            match self.agent_runner.run(&combined, &thread_id).await {
                Ok(TurnOutcome::Completed(response)) => {
                    let (steered, steer_messages) = self.post_run_steer_check(session_key, session_mode).await;
                    self.middleware.reset().await;

                    if steered {
                        combined = join_pending_contents(&steer_messages);
                        followup_depth = 0;
                        continue;
                    }

                    if !response.trim().is_empty() {
                        if let Err(err) = self.channel.send_message(session_key, &response, SendOptions::default()).await {
                            error!(session_key, %err, "failed to send turn response, ending turn");
                            break;
                        }
                    }

                    match self.agent_runner.take_followup_request() {
                        Some(FollowupRequest::Immediate(prompt)) => {
                            followup_depth += 1;
                            if followup_depth > MAX_FOLLOWUP_DEPTH {
                                warn!(session_key, depth = followup_depth, "followup depth exceeded, ending turn");
                                break;
                            }
                            combined = followup_template(followup_depth, &prompt);
                            continue;
                        }
                        Some(FollowupRequest::Delayed { .. }) => {
                            // Scheduling the one-shot delayed followup is the scheduler's
                            // job (warden-runtime); the request has already been taken
                            // above for whichever caller wires request_followup through.
                            break;
                        }
                        None => break,
                    }
                }
                Ok(TurnOutcome::ApprovalRequired(pending)) => {
                    self.middleware.reset().await;
                    if let Err(err) = self
                        .channel
                        .send_approval_request(session_key, &pending.id, &pending.tool_name, &pending.tool_args, true)
                        .await
                    {
                        error!(session_key, %err, "failed to send approval request, ending turn");
                        break;
                    }
                    let approved = self.approval_gate.wait_for_resolution(&pending.id).await;
                    combined = if approved {
                        combined
                    } else {
                        tool_denied_template(&pending.tool_name)
                    };
                    continue;
                }
                Ok(TurnOutcome::Interrupted(pending_messages)) => {
                    self.middleware.reset().await;
                    if let Err(err) = self
                        .channel
                        .send_message(session_key, "[Run interrupted — processing new message]", SendOptions::default())
                        .await
                    {
                        error!(session_key, %err, "failed to notify interrupt, ending turn");
                        break;
                    }
                    combined = join_pending_contents(&pending_messages);
                    followup_depth = 0;
                    continue;
                }
                Err(err) => {
                    self.middleware.reset().await;
                    error!(session_key, %err, "agent run failed, ending turn");
                    let _ = self
                        .channel
                        .send_message(session_key, &format!("Error: {err}"), SendOptions::default())
                        .await;
                    break;
                }
            }
        }
    }

    /// Post-run steer check: a message may have arrived mid-run, after the
    /// last tool call, so the middleware never saw it. Only relevant in
    /// `steer`/`interrupt` mode; `interrupt` is checked here too since an
    /// interrupt arriving after the last tool call has nothing left to
    /// abort but should still redirect the next turn.
    async fn post_run_steer_check(&self, session_key: &str, session_mode: QueueMode) -> (bool, Vec<(String, Message)>) {
        if self.middleware.was_steered().await {
            return (true, self.middleware.take_pending_steer_message().await.unwrap_or_default());
        }

        if matches!(session_mode, QueueMode::Steer | QueueMode::Interrupt | QueueMode::SteerBacklog)
            && self.queue_manager.peek_pending(session_key).await
        {
            return (true, self.queue_manager.consume_pending(session_key).await);
        }

        (false, Vec::new())
    }

    /// Dispatch a recognised framework command, section 6. Replies go
    /// straight to the channel; none of these run the agent, except
    /// `/compact`'s summarisation sub-call.
    async fn handle_command(&self, session_key: &str, command: Command) {
        match command {
            Command::Start => self.reply(session_key, WELCOME_TEXT).await,
            Command::Help => self.reply(session_key, HELP_TEXT).await,
            Command::New => self.handle_new_command(session_key).await,
            Command::Compact => self.handle_compact_command(session_key).await,
            Command::Queue(args) => self.handle_queue_command(session_key, &args).await,
            Command::Status => self.handle_status_command(session_key).await,
            Command::Model(target) => self.handle_model_command(session_key, target).await,
            Command::Approve(id) => self.handle_approval_command(session_key, id, true).await,
            Command::Deny(id) => self.handle_approval_command(session_key, id, false).await,
        }
    }

    async fn reply(&self, session_key: &str, content: &str) {
        if let Err(err) = self.channel.send_message(session_key, content, SendOptions::default()).await {
            error!(session_key, %err, "failed to send command reply");
        }
    }

    /// `/new`: archive the outgoing conversation tagged `manual` and rotate
    /// to a fresh thread. Testable property #6.
    async fn handle_new_command(&self, session_key: &str) {
        let thread_id = match self.session_manager.get_thread_id(session_key).await {
            Ok(id) => id,
            Err(err) => {
                error!(session_key, %err, "failed to resolve thread id for /new");
                self.reply(session_key, "Failed to start a new conversation.").await;
                return;
            }
        };
        let history = self.agent_runner.history(&thread_id).await.unwrap_or_default();

        let old_conversation_id = match self.session_manager.new_conversation(session_key).await {
            Ok(id) => id,
            Err(err) => {
                error!(session_key, %err, "failed to rotate conversation for /new");
                self.reply(session_key, "Failed to start a new conversation.").await;
                return;
            }
        };

        if let Err(err) = self
            .archiver
            .archive(session_key, &old_conversation_id, &history, None, vec!["manual".to_string()])
            .await
        {
            warn!(session_key, %err, "failed to archive conversation for /new");
        }

        self.reply(session_key, "Started a new conversation.").await;
    }

    /// `/compact`: summarise via the agent, archive tagged `compact`, rotate,
    /// and seed the new thread with the compaction template. Testable
    /// property #7.
    async fn handle_compact_command(&self, session_key: &str) {
        let thread_id = match self.session_manager.get_thread_id(session_key).await {
            Ok(id) => id,
            Err(err) => {
                error!(session_key, %err, "failed to resolve thread id for /compact");
                self.reply(session_key, "Failed to compact the conversation.").await;
                return;
            }
        };

        let summary = match self.agent_runner.run(SUMMARIZE_PROMPT, &thread_id).await {
            Ok(TurnOutcome::Completed(summary)) => summary,
            _ => {
                self.reply(session_key, "Could not summarise the conversation, compaction aborted.").await;
                return;
            }
        };

        let history = self.agent_runner.history(&thread_id).await.unwrap_or_default();
        let old_conversation_id = thread_id.rsplit_once(':').map(|(_, id)| id.to_string()).unwrap_or_default();
        if let Err(err) = self
            .archiver
            .archive(session_key, &old_conversation_id, &history, Some(summary.clone()), vec!["compact".to_string()])
            .await
        {
            warn!(session_key, %err, "failed to archive conversation for /compact");
        }

        if let Err(err) = self.session_manager.new_conversation(session_key).await {
            error!(session_key, %err, "failed to rotate conversation for /compact");
            self.reply(session_key, "Failed to compact the conversation.").await;
            return;
        }

        let new_thread_id = match self.session_manager.get_thread_id(session_key).await {
            Ok(id) => id,
            Err(err) => {
                error!(session_key, %err, "failed to read rotated thread id for /compact");
                return;
            }
        };

        if let Err(err) = self.agent_runner.run(&compacted_template(&summary), &new_thread_id).await {
            warn!(session_key, %err, "failed to seed compacted thread with summary");
        }

        self.reply(session_key, "Conversation compacted.").await;
    }

    async fn handle_queue_command(&self, session_key: &str, args: &str) {
        let requested = args.trim().to_lowercase();
        match requested.as_str() {
            "" => {
                let mode = self.queue_manager.get_session_mode(session_key).await;
                self.reply(session_key, &format!("Queue mode: {mode:?}")).await;
            }
            "default" | "reset" => {
                let mode = self.queue_manager.default_mode();
                self.queue_manager.set_session_mode(session_key, mode).await;
                self.reply(session_key, &format!("Queue mode reset to default ({mode:?}).")).await;
            }
            "collect" => self.set_queue_mode(session_key, QueueMode::Collect).await,
            "steer" => self.set_queue_mode(session_key, QueueMode::Steer).await,
            "followup" => self.set_queue_mode(session_key, QueueMode::Followup).await,
            "interrupt" => self.set_queue_mode(session_key, QueueMode::Interrupt).await,
            "steer-backlog" | "steer_backlog" => self.set_queue_mode(session_key, QueueMode::SteerBacklog).await,
            _ => {
                self.reply(session_key, "Usage: /queue <collect|steer|followup|interrupt|default|reset>").await;
            }
        }
    }

    async fn set_queue_mode(&self, session_key: &str, mode: QueueMode) {
        self.queue_manager.set_session_mode(session_key, mode).await;
        self.reply(session_key, &format!("Queue mode set to {mode:?}.")).await;
    }

    async fn handle_status_command(&self, session_key: &str) {
        let state = self.session_manager.get_state(session_key).await;
        let pending_approvals = self.approval_gate.get_pending(Some(session_key)).await.len();
        let last_metrics = self.agent_runner.last_metrics();

        let mut lines = vec![format!("Workspace: {}", self.workspace_name), format!("Model: {}", self.model_label)];

        match state {
            Some(state) => {
                lines.push(format!("Conversation: {}", state.conversation_id));
                lines.push(format!("Messages this conversation: {}", state.message_count));
            }
            None => lines.push("Conversation: none started yet".to_string()),
        }

        lines.push(format!("Pending approvals: {pending_approvals}"));
        match last_metrics {
            Some(metrics) => lines.push(format!(
                "Last turn tokens: {} in / {} out",
                metrics.input_tokens, metrics.output_tokens
            )),
            None => lines.push("Last turn tokens: n/a".to_string()),
        }

        self.reply(session_key, &lines.join("\n")).await;
    }

    /// Runtime model overrides are out of scope for the stateless boundary
    /// this crate is built against (section 6: "stateless factory agents
    /// always use configured"); `/model` only ever reports the configured
    /// model here.
    async fn handle_model_command(&self, session_key: &str, target: Option<String>) {
        match target {
            None => self.reply(session_key, &format!("Active model: {}", self.model_label)).await,
            Some(_) => {
                self.reply(
                    session_key,
                    &format!("Active model: {} (runtime model switching is not supported by this agent)", self.model_label),
                )
                .await;
            }
        }
    }

    async fn handle_approval_command(&self, session_key: &str, approval_id: Option<String>, approved: bool) {
        let Some(approval_id) = approval_id else {
            self.reply(session_key, "Usage: /approve <id> or /deny <id>").await;
            return;
        };

        if self.approval_gate.resolve(&approval_id, approved).await {
            let verb = if approved { "approved" } else { "denied" };
            self.reply(session_key, &format!("Approval {approval_id} {verb}.")).await;
        } else {
            self.reply(session_key, &format!("No pending approval found for id {approval_id}.")).await;
        }
    }

    /// Archive every session's active conversation, tagged `tag`. Called once
    /// during `LifecycleManager` shutdown, after channels have stopped
    /// accepting new inbound messages but before durable stores close.
    /// Best-effort per session: one session's unreadable history does not
    /// stop the rest from being archived.
    pub async fn archive_all_active(&self, tag: &str) {
        for (session_key, state) in self.session_manager.list_sessions().await {
            let thread_id = format!("{session_key}:{}", state.conversation_id);
            match self.agent_runner.history(&thread_id).await {
                Ok(history) => {
                    if let Err(err) = self
                        .archiver
                        .archive(&session_key, &state.conversation_id, &history, None, vec![tag.to_string()])
                        .await
                    {
                        warn!(session_key, %err, "failed to archive conversation during shutdown");
                    }
                }
                Err(err) => warn!(session_key, %err, "failed to read conversation history for shutdown archive"),
            }
        }
    }

    /// Utilisation pre-check: summarise, archive the outgoing conversation,
    /// rotate to a fresh thread, and seed it with the summary. Returns the
    /// thread id the turn should actually run against — unchanged if
    /// compaction didn't trigger or failed partway.
    async fn maybe_auto_compact(&self, session_key: &str, thread_id: &str) -> String {
        let info = self.agent_runner.context_info(thread_id).await;
        if info.utilization() < self.auto_compact.trigger {
            return thread_id.to_string();
        }

        info!(session_key, utilization = info.utilization(), "auto-compact triggered");

        let summary = match self.agent_runner.run(SUMMARIZE_PROMPT, thread_id).await {
            Ok(TurnOutcome::Completed(summary)) => summary,
            _ => {
                warn!(session_key, "auto-compact summarisation did not complete cleanly, skipping compaction");
                return thread_id.to_string();
            }
        };

        let history = self.agent_runner.history(thread_id).await.unwrap_or_default();
        let old_conversation_id = thread_id.rsplit_once(':').map(|(_, id)| id.to_string()).unwrap_or_default();
        if let Err(err) = self
            .archiver
            .archive(session_key, &old_conversation_id, &history, Some(summary.clone()), vec!["auto-compact".to_string()])
            .await
        {
            warn!(session_key, %err, "failed to archive conversation during auto-compact");
        }

        if let Err(err) = self.session_manager.new_conversation(session_key).await {
            warn!(session_key, %err, "failed to rotate conversation during auto-compact, continuing on old thread");
            return thread_id.to_string();
        }

        let new_thread_id = match self.session_manager.get_thread_id(session_key).await {
            Ok(id) => id,
            Err(err) => {
                warn!(session_key, %err, "failed to read rotated thread id, continuing on old thread");
                return thread_id.to_string();
            }
        };

        if let Err(err) = self.agent_runner.run(&compacted_template(&summary), &new_thread_id).await {
            warn!(session_key, %err, "failed to seed compacted thread with summary");
        }

        if self.notify_auto_compact {
            let _ = self
                .channel
                .send_message(session_key, "[Conversation auto-compacted]", SendOptions::default())
                .await;
        }

        new_thread_id
    }
}

fn join_message_contents(messages: &[Message]) -> String {
    messages.iter().map(|m| m.content.as_str()).collect::<Vec<_>>().join("\n")
}

fn join_pending_contents(messages: &[(String, Message)]) -> String {
    messages.iter().map(|(_, m)| m.content.as_str()).collect::<Vec<_>>().join("\n")
}

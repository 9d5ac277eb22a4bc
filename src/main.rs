// Copyright (c) 2026 Warden Contributors
//
// SPDX-License-Identifier: Apache-2.0
mod cli;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands};
use warden_channels::{Channel, InboundMessage, MemoryChannel};
use warden_config::Config;
use warden_core::{
    AgentRunError, AgentRunner, ApprovalGate, ArchivedTurn, ConversationArchiver, FollowupRequest, LaneQueue,
    Message, MessageProcessor, MiddlewareChain, QueueItem, QueueManager, RunMetrics, SessionManager, TurnAccount,
    TurnOutcome,
};
use warden_runtime::{
    AgentFactory, CronJob, CronScheduler, HeartbeatScheduler, LifecycleManager, SubAgentResultSink, SubAgentRunner,
    SubAgentStore, SystemEventSink,
};

/// The LLM call itself is an external collaborator this crate never
/// constructs; a real deployment supplies its own [`AgentRunner`] wired to
/// whatever model driver it uses. This placeholder exists only so `warden
/// run` has something to hand every subsystem that needs an `AgentRunner`,
/// and fails loudly rather than silently producing empty responses.
struct UnconfiguredAgentRunner;

#[async_trait]
impl AgentRunner for UnconfiguredAgentRunner {
    async fn run(&self, _input: &str, _thread_id: &str) -> Result<TurnOutcome, AgentRunError> {
        Err(AgentRunError::Failed(anyhow::anyhow!(
            "no AgentRunner configured: integrate a model driver before running this workspace"
        )))
    }

    async fn context_info(&self, _thread_id: &str) -> TurnAccount {
        TurnAccount {
            message_count: 0,
            approx_tokens: 0,
            max_input_tokens: 1,
            schema_overhead: 0,
            calibration_factor: 1.0,
            cache_read_total: 0,
            cache_write_total: 0,
        }
    }

    async fn history(&self, _thread_id: &str) -> Result<Vec<ArchivedTurn>, AgentRunError> {
        Ok(Vec::new())
    }

    fn last_metrics(&self) -> Option<RunMetrics> {
        None
    }

    fn take_followup_request(&self) -> Option<FollowupRequest> {
        None
    }
}

struct UnconfiguredAgentFactory;

impl AgentFactory for UnconfiguredAgentFactory {
    fn create(&self) -> Arc<dyn AgentRunner> {
        Arc::new(UnconfiguredAgentRunner)
    }
}

/// Delivers scheduler and sub-agent results back into a session's own queue
/// as a non-steerable system event, bypassing the pre-lane debounce buffer
/// since these are not user input.
struct LaneSystemEventSink {
    lane_queue: Arc<LaneQueue>,
    channel_name: String,
}

#[async_trait]
impl SystemEventSink for LaneSystemEventSink {
    async fn deliver(&self, session_key: &str, content: String) {
        let message = Message::inbound(&self.channel_name, session_key, "system", content);
        self.lane_queue
            .enqueue(QueueItem::system_event(session_key, &self.channel_name, vec![message]), "main")
            .await;
    }
}

#[async_trait]
impl SubAgentResultSink for LaneSystemEventSink {
    async fn deliver(&self, parent_session_key: &str, label: &str, content: String) {
        let formatted = format!("[sub-agent '{label}' finished]\n\n{content}");
        SystemEventSink::deliver(self, parent_session_key, formatted).await;
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warden=info,warn",
        1 => "warden=debug,info",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry().with(filter).with(fmt::layer()).init();
}

fn load_config(path: &std::path::Path) -> Result<Config> {
    let existing = path.exists().then_some(path);
    warden_config::load(existing).with_context(|| format!("loading configuration from {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match &cli.command {
        Commands::ShowConfig => {
            let config = load_config(&cli.config_path())?;
            println!("{}", serde_yaml::to_string(&config)?);
            Ok(())
        }
        Commands::Completions { shell } => {
            cli::print_completions(*shell);
            Ok(())
        }
        Commands::Run => run_workspace(&cli).await,
    }
}

async fn run_workspace(cli: &Cli) -> Result<()> {
    let workspace_dir = cli.workspace_dir();
    let config = load_config(&cli.config_path())?;
    let workspace_name = workspace_dir
        .canonicalize()
        .unwrap_or_else(|_| workspace_dir.clone())
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "workspace".to_string());

    info!(workspace = %workspace_name, channel_type = %config.channel.type_, "starting workspace");

    let channel: Arc<dyn Channel> = Arc::new(MemoryChannel::new(&config.channel.type_));
    let mut channels: HashMap<String, Arc<dyn Channel>> = HashMap::new();
    channels.insert(channel.name().to_string(), channel.clone());

    let lane_queue = Arc::new(LaneQueue::new(config.lanes.main, config.lanes.subagent, config.lanes.cron));
    let queue_manager = Arc::new(QueueManager::new(lane_queue.clone(), config.queue.clone()));
    let session_manager = Arc::new(
        SessionManager::new(&workspace_dir)
            .await
            .context("opening session store")?,
    );
    let archiver = Arc::new(
        ConversationArchiver::new(&workspace_dir, workspace_name.clone())
            .await
            .context("opening conversation archive")?,
    );
    let approval_gate = ApprovalGate::new(config.approval_gates.clone());

    {
        let queue_manager = queue_manager.clone();
        channel
            .on_message(Arc::new(move |inbound: InboundMessage| {
                let queue_manager = queue_manager.clone();
                Box::pin(async move {
                    let session_key = inbound.session_key.clone();
                    let channel_name = inbound.channel.clone();
                    let message = Message::inbound(&inbound.channel, &inbound.session_key, &inbound.user_id, inbound.content);
                    queue_manager.submit(&session_key, &channel_name, message, None).await;
                })
            }))
            .await;
    }
    {
        let approval_gate = approval_gate.clone();
        channel
            .on_approval(Arc::new(move |approval_id: String, approved: bool| {
                let approval_gate = approval_gate.clone();
                Box::pin(async move {
                    approval_gate.resolve(&approval_id, approved).await;
                })
            }))
            .await;
    }

    let middleware = Arc::new(MiddlewareChain::new(
        config.tool_timeouts.clone(),
        queue_manager.clone(),
        approval_gate.clone(),
    ));
    let agent_runner: Arc<dyn AgentRunner> = Arc::new(UnconfiguredAgentRunner);
    let model_label = format!("{}:{}", config.model.provider, config.model.name);
    let message_processor = Arc::new(MessageProcessor::new(
        workspace_name.clone(),
        model_label,
        session_manager,
        queue_manager,
        archiver,
        approval_gate.clone(),
        middleware,
        agent_runner,
        channel.clone(),
        config.auto_compact.clone(),
        config.lifecycle.notify_auto_compact,
    ));

    let factory: Arc<dyn AgentFactory> = Arc::new(UnconfiguredAgentFactory);
    let sink = Arc::new(LaneSystemEventSink {
        lane_queue: lane_queue.clone(),
        channel_name: channel.name().to_string(),
    });

    let subagent_store = Arc::new(
        SubAgentStore::new(&workspace_dir)
            .await
            .context("opening sub-agent store")?,
    );
    // Kept alive for the process lifetime so a `spawn_subagent` tool (built
    // by whatever supplies the concrete AgentRunner) has a runner to reach
    // for; this binary itself never calls `spawn`.
    let _subagent_runner = Arc::new(SubAgentRunner::with_max_concurrent(
        subagent_store.clone(),
        factory.clone(),
        sink.clone(),
        config.lanes.subagent,
    ));

    let heartbeat = if config.heartbeat.enabled {
        Some(Arc::new(
            HeartbeatScheduler::new(
                workspace_name.clone(),
                factory.clone(),
                channels.clone(),
                sink.clone(),
                config.heartbeat.clone(),
                &config.timezone,
            )
            .context("configuring heartbeat scheduler")?,
        ))
    } else {
        None
    };

    let cron = if config.crons.is_empty() {
        None
    } else {
        let jobs = config
            .crons
            .iter()
            .map(|job| CronJob::from_config(job, &config.timezone))
            .collect::<Result<Vec<_>, _>>()
            .context("configuring cron jobs")?;
        Some(Arc::new(CronScheduler::new(
            workspace_name.clone(),
            jobs,
            factory.clone(),
            channels.clone(),
            sink.clone(),
        )))
    };

    let lifecycle = Arc::new(LifecycleManager::new(
        workspace_name.clone(),
        channel.clone(),
        lane_queue,
        config.lanes.clone(),
        message_processor,
        approval_gate,
        subagent_store,
        heartbeat,
        cron,
    ));

    lifecycle.start().await;
    info!(workspace = %workspace_name, "workspace running, press ctrl-c to stop");

    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    info!(workspace = %workspace_name, "shutdown signal received");

    lifecycle.shutdown().await;
    Ok(())
}

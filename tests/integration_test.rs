// Copyright (c) 2026 Warden Contributors
//
// SPDX-License-Identifier: Apache-2.0
//! End-to-end wiring test: a workspace assembled the same way `warden run`
//! assembles one, driven through a full lane-worker turn via
//! `LifecycleManager`, using the in-memory channel and a scripted
//! `AgentRunner` double in place of a real model driver.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use warden_channels::{Channel, InboundMessage, MemoryChannel};
use warden_config::{ApprovalGatesConfig, AutoCompactConfig, Config, LanesConfig, QueueConfig};
use warden_core::{
    AgentRunError, AgentRunner, ApprovalGate, ArchivedTurn, ConversationArchiver, FollowupRequest, LaneQueue,
    Message, MessageProcessor, MiddlewareChain, QueueManager, RunMetrics, SessionManager, TurnAccount, TurnOutcome,
};
use warden_runtime::{AgentFactory, LifecycleManager, SubAgentStore};

struct EchoRunner;

#[async_trait]
impl AgentRunner for EchoRunner {
    async fn run(&self, input: &str, _thread_id: &str) -> Result<TurnOutcome, AgentRunError> {
        Ok(TurnOutcome::Completed(format!("echo: {input}")))
    }

    async fn context_info(&self, _thread_id: &str) -> TurnAccount {
        TurnAccount {
            message_count: 1,
            approx_tokens: 10,
            max_input_tokens: 10_000,
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

struct EchoFactory;
impl AgentFactory for EchoFactory {
    fn create(&self) -> Arc<dyn AgentRunner> {
        Arc::new(EchoRunner)
    }
}

#[tokio::test]
async fn workspace_processes_a_message_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        lanes: LanesConfig { main: 1, subagent: 2, cron: 1 },
        queue: QueueConfig { debounce_ms: 5, ..QueueConfig::default() },
        ..Config::default()
    };

    let channel = Arc::new(MemoryChannel::new("test"));
    let lane_queue = Arc::new(LaneQueue::new(config.lanes.main, config.lanes.subagent, config.lanes.cron));
    let queue_manager = Arc::new(QueueManager::new(lane_queue.clone(), config.queue.clone()));
    let session_manager = Arc::new(SessionManager::new(dir.path()).await.unwrap());
    let archiver = Arc::new(ConversationArchiver::new(dir.path(), "test-workspace").await.unwrap());
    let approval_gate = ApprovalGate::new(ApprovalGatesConfig::default());
    let middleware = Arc::new(MiddlewareChain::new(
        Default::default(),
        queue_manager.clone(),
        approval_gate.clone(),
    ));
    let message_processor = Arc::new(MessageProcessor::new(
        "test-workspace",
        "test:echo",
        session_manager,
        queue_manager.clone(),
        archiver,
        approval_gate.clone(),
        middleware,
        Arc::new(EchoRunner),
        channel.clone() as Arc<dyn Channel>,
        AutoCompactConfig { enabled: false, trigger: 0.8 },
        false,
    ));
    let subagent_store = Arc::new(SubAgentStore::new(dir.path()).await.unwrap());

    let lifecycle = Arc::new(LifecycleManager::new(
        "test-workspace",
        channel.clone() as Arc<dyn Channel>,
        lane_queue,
        config.lanes.clone(),
        message_processor,
        approval_gate,
        subagent_store,
        None,
        None,
    ));

    lifecycle.start().await;

    let message = Message::inbound("test", "test:1", "u1", "hello there");
    queue_manager.submit("test:1", "test", message, None).await;

    let mut reply = None;
    for _ in 0..100 {
        if let Some(sent) = channel.last_sent() {
            reply = Some(sent);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let reply = reply.expect("expected the echo runner's reply to reach the channel");
    assert_eq!(reply.session_key, "test:1");
    assert_eq!(reply.content, "echo: hello there");

    lifecycle.shutdown().await;
}

#[tokio::test]
async fn channel_inbound_handler_reaches_the_queue_and_gets_a_reply() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        lanes: LanesConfig { main: 1, subagent: 2, cron: 1 },
        queue: QueueConfig { debounce_ms: 5, ..QueueConfig::default() },
        ..Config::default()
    };

    let channel = Arc::new(MemoryChannel::new("test"));
    let lane_queue = Arc::new(LaneQueue::new(config.lanes.main, config.lanes.subagent, config.lanes.cron));
    let queue_manager = Arc::new(QueueManager::new(lane_queue.clone(), config.queue.clone()));
    let session_manager = Arc::new(SessionManager::new(dir.path()).await.unwrap());
    let archiver = Arc::new(ConversationArchiver::new(dir.path(), "test-workspace").await.unwrap());
    let approval_gate = ApprovalGate::new(ApprovalGatesConfig::default());
    let middleware = Arc::new(MiddlewareChain::new(
        Default::default(),
        queue_manager.clone(),
        approval_gate.clone(),
    ));
    let message_processor = Arc::new(MessageProcessor::new(
        "test-workspace",
        "test:echo",
        session_manager,
        queue_manager.clone(),
        archiver,
        approval_gate.clone(),
        middleware,
        Arc::new(EchoRunner),
        channel.clone() as Arc<dyn Channel>,
        AutoCompactConfig { enabled: false, trigger: 0.8 },
        false,
    ));
    let subagent_store = Arc::new(SubAgentStore::new(dir.path()).await.unwrap());

    let lifecycle = Arc::new(LifecycleManager::new(
        "test-workspace",
        channel.clone() as Arc<dyn Channel>,
        lane_queue,
        config.lanes.clone(),
        message_processor,
        approval_gate,
        subagent_store,
        None,
        None,
    ));

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

    lifecycle.start().await;

    channel
        .simulate_inbound(InboundMessage {
            channel: "test".to_string(),
            session_key: "test:1".to_string(),
            user_id: "u1".to_string(),
            content: "hello from the wire".to_string(),
        })
        .await;

    let mut reply = None;
    for _ in 0..100 {
        if let Some(sent) = channel.last_sent() {
            reply = Some(sent);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let reply = reply.expect("expected the handler-submitted message to produce a reply");
    assert_eq!(reply.content, "echo: hello from the wire");

    lifecycle.shutdown().await;
}

#[tokio::test]
async fn heartbeat_disabled_by_default_never_starts_loop() {
    let config = Config::default();
    assert!(!config.heartbeat.enabled, "heartbeat should be opt-in");
    assert!(config.crons.is_empty(), "no cron jobs configured by default");
}

#[test]
fn agent_factory_builds_independent_runners() {
    let factory = EchoFactory;
    let a = factory.create();
    let b = factory.create();
    assert!(!Arc::ptr_eq(&a, &b));
}

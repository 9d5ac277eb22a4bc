// Copyright (c) 2026 Warden Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;
use warden_config::{DropPolicy, QueueConfig, QueueMode};

use super::lane::{LaneQueue, QueueItem};
use crate::message::Message;

/// Plugged in to replace drop-oldest with an actual summary when
/// `drop_policy = summarize` trims a session's pre-lane buffer. `None` by
/// default, in which case `summarize` behaves as drop-oldest.
pub trait SummarizeHook: Send + Sync {
    fn summarize(&self, dropped: (&str, &Message)) -> Option<Message>;
}

struct SessionQueue {
    messages: VecDeque<(String, Message)>,
    mode: QueueMode,
    debounce_ms: u64,
    cap: usize,
    drop_policy: DropPolicy,
    debounce_task: Option<JoinHandle<()>>,
}

impl SessionQueue {
    fn new(defaults: &QueueConfig) -> Self {
        Self {
            messages: VecDeque::new(),
            mode: defaults.mode,
            debounce_ms: defaults.debounce_ms,
            cap: defaults.cap,
            drop_policy: defaults.drop_policy,
            debounce_task: None,
        }
    }
}

/// Coordinates the pre-lane debounce/coalescing buffer and the underlying
/// [`LaneQueue`]. `submit` is the single entry point channels call for every
/// inbound message; `steer`/`interrupt` modes bypass debouncing entirely and
/// go straight to the lane, `collect`/`followup`/`steer-backlog` coalesce.
pub struct QueueManager {
    lane_queue: Arc<LaneQueue>,
    defaults: QueueConfig,
    sessions: Mutex<HashMap<String, SessionQueue>>,
    summarize_hook: Option<Arc<dyn SummarizeHook>>,
}

impl QueueManager {
    pub fn new(lane_queue: Arc<LaneQueue>, defaults: QueueConfig) -> Self {
        Self {
            lane_queue,
            defaults,
            sessions: Mutex::new(HashMap::new()),
            summarize_hook: None,
        }
    }

    pub fn with_summarize_hook(mut self, hook: Arc<dyn SummarizeHook>) -> Self {
        self.summarize_hook = Some(hook);
        self
    }

    pub fn lane_queue(&self) -> &Arc<LaneQueue> {
        &self.lane_queue
    }

    /// Submit an inbound message for `session_key`. `mode_override` takes
    /// precedence over the session's configured mode for this one message.
    pub async fn submit(
        self: &Arc<Self>,
        session_key: &str,
        channel: &str,
        message: Message,
        mode_override: Option<QueueMode>,
    ) {
        let effective_mode = {
            let mut sessions = self.sessions.lock().await;
            let session = sessions
                .entry(session_key.to_string())
                .or_insert_with(|| SessionQueue::new(&self.defaults));
            mode_override.unwrap_or(session.mode)
        };

        match effective_mode {
            QueueMode::Steer => self.enqueue_immediate(session_key, channel, message, QueueMode::Steer).await,
            QueueMode::Interrupt => self.enqueue_immediate(session_key, channel, message, QueueMode::Interrupt).await,
            _ => self.collect_message(session_key, channel, message).await,
        }
    }

    async fn enqueue_immediate(&self, session_key: &str, channel: &str, message: Message, mode: QueueMode) {
        let mut item = QueueItem::new(session_key, channel, vec![message]);
        item.mode = mode;
        self.lane_queue.enqueue(item, "main").await;
    }

    async fn collect_message(self: &Arc<Self>, session_key: &str, channel: &str, message: Message) {
        let debounce_ms = {
            let mut sessions = self.sessions.lock().await;
            let session = sessions
                .entry(session_key.to_string())
                .or_insert_with(|| SessionQueue::new(&self.defaults));

            if session.messages.len() >= session.cap {
                self.apply_drop_policy(session, channel);
                if session.drop_policy == DropPolicy::New {
                    // Incoming message is dropped outright; nothing more to append.
                    if let Some(task) = session.debounce_task.take() {
                        task.abort();
                    }
                    let debounce_ms = session.debounce_ms;
                    let this = Arc::clone(self);
                    let key = session_key.to_string();
                    session.debounce_task = Some(tokio::spawn(async move {
                        tokio::time::sleep(Duration::from_millis(debounce_ms)).await;
                        this.flush_session(&key).await;
                    }));
                    return;
                }
            }

            session.messages.push_back((channel.to_string(), message));
            if let Some(task) = session.debounce_task.take() {
                task.abort();
            }
            session.debounce_ms
        };

        let this = Arc::clone(self);
        let key = session_key.to_string();
        let task = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(debounce_ms)).await;
            this.flush_session(&key).await;
        });

        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get_mut(session_key) {
            session.debounce_task = Some(task);
        }
    }

    fn apply_drop_policy(&self, session: &mut SessionQueue, _incoming_channel: &str) {
        match session.drop_policy {
            DropPolicy::Old => {
                session.messages.pop_front();
            }
            DropPolicy::New => {
                // Handled by the caller: the incoming message is never appended.
            }
            DropPolicy::Summarize => {
                if let Some((dropped_channel, dropped_msg)) = session.messages.pop_front() {
                    if let Some(hook) = &self.summarize_hook {
                        if let Some(summary) = hook.summarize((&dropped_channel, &dropped_msg)) {
                            session.messages.push_front((dropped_channel, summary));
                        }
                    }
                }
            }
        }
    }

    async fn flush_session(&self, session_key: &str) {
        let grouped = {
            let mut sessions = self.sessions.lock().await;
            let Some(session) = sessions.get_mut(session_key) else {
                return;
            };
            session.debounce_task = None;
            if session.messages.is_empty() {
                return;
            }
            let mode = session.mode;
            let mut order: Vec<String> = Vec::new();
            let mut by_channel: HashMap<String, Vec<Message>> = HashMap::new();
            for (channel, message) in session.messages.drain(..) {
                by_channel.entry(channel.clone()).or_insert_with(|| {
                    order.push(channel.clone());
                    Vec::new()
                });
                by_channel.get_mut(&channel).unwrap().push(message);
            }
            (mode, order, by_channel)
        };

        let (mode, order, mut by_channel) = grouped;
        for channel in order {
            if let Some(messages) = by_channel.remove(&channel) {
                let mut item = QueueItem::new(session_key, &channel, messages);
                item.mode = mode;
                debug!(session_key, channel = %channel, "flushing coalesced messages to main lane");
                self.lane_queue.enqueue(item, "main").await;
            }
        }
    }

    pub async fn get_session_mode(&self, session_key: &str) -> QueueMode {
        self.sessions.lock().await.get(session_key).map(|s| s.mode).unwrap_or(self.defaults.mode)
    }

    /// The workspace-configured default mode, used by `/queue default|reset`
    /// to restore a session that was given a per-session override.
    pub fn default_mode(&self) -> QueueMode {
        self.defaults.mode
    }

    pub async fn set_session_mode(&self, session_key: &str, mode: QueueMode) {
        let mut sessions = self.sessions.lock().await;
        sessions
            .entry(session_key.to_string())
            .or_insert_with(|| SessionQueue::new(&self.defaults))
            .mode = mode;
    }

    pub async fn set_session_config(
        &self,
        session_key: &str,
        debounce_ms: Option<u64>,
        cap: Option<usize>,
        drop_policy: Option<DropPolicy>,
    ) {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .entry(session_key.to_string())
            .or_insert_with(|| SessionQueue::new(&self.defaults));
        if let Some(v) = debounce_ms {
            session.debounce_ms = v;
        }
        if let Some(v) = cap {
            session.cap = v;
        }
        if let Some(v) = drop_policy {
            session.drop_policy = v;
        }
    }

    /// True if there is a pending message anywhere in the pipeline for this
    /// session: the pre-debounce buffer, or already-flushed steer-eligible
    /// items sitting in the main lane.
    pub async fn peek_pending(&self, session_key: &str) -> bool {
        {
            let sessions = self.sessions.lock().await;
            if let Some(session) = sessions.get(session_key) {
                if !session.messages.is_empty() {
                    return true;
                }
            }
        }
        self.lane_queue.peek_session_pending(session_key, "main").await
    }

    /// Drain every pending message for this session from both the
    /// pre-debounce buffer and the main lane, returning `(channel, Message)`
    /// pairs in FIFO order by source.
    pub async fn consume_pending(&self, session_key: &str) -> Vec<(String, Message)> {
        let mut messages = Vec::new();

        {
            let mut sessions = self.sessions.lock().await;
            if let Some(session) = sessions.get_mut(session_key) {
                if let Some(task) = session.debounce_task.take() {
                    task.abort();
                }
                messages.extend(session.messages.drain(..));
            }
        }

        let lane_items = self.lane_queue.consume_session_pending(session_key, "main").await;
        for item in lane_items {
            for message in item.messages {
                messages.push((item.channel.clone(), message));
            }
        }

        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use std::time::Duration as StdDuration;

    fn queue_config(debounce_ms: u64, cap: usize, drop_policy: DropPolicy) -> QueueConfig {
        QueueConfig {
            mode: QueueMode::Collect,
            debounce_ms,
            cap,
            drop_policy,
        }
    }

    #[tokio::test]
    async fn collect_mode_coalesces_until_debounce_fires() {
        let lanes = Arc::new(LaneQueue::new(4, 8, 2));
        let manager = Arc::new(QueueManager::new(lanes.clone(), queue_config(20, 20, DropPolicy::Old)));

        manager
            .submit("s1", "telegram", Message::inbound("telegram", "s1", "u1", "one"), None)
            .await;
        manager
            .submit("s1", "telegram", Message::inbound("telegram", "s1", "u1", "two"), None)
            .await;

        assert!(manager.peek_pending("s1").await);
        assert!(!lanes.peek_session_pending("s1", "main").await);

        tokio::time::sleep(StdDuration::from_millis(60)).await;
        assert!(lanes.peek_session_pending("s1", "main").await);
        let consumed = lanes.consume_session_pending("s1", "main").await;
        assert_eq!(consumed.len(), 1);
        assert_eq!(consumed[0].messages.len(), 2);
    }

    #[tokio::test]
    async fn steer_mode_bypasses_debounce() {
        let lanes = Arc::new(LaneQueue::new(4, 8, 2));
        let manager = Arc::new(QueueManager::new(lanes.clone(), queue_config(1000, 20, DropPolicy::Old)));

        manager
            .submit(
                "s1",
                "telegram",
                Message::inbound("telegram", "s1", "u1", "steer me"),
                Some(QueueMode::Steer),
            )
            .await;

        assert!(lanes.peek_session_pending("s1", "main").await);
    }

    #[tokio::test]
    async fn drop_policy_new_skips_incoming_message() {
        let lanes = Arc::new(LaneQueue::new(4, 8, 2));
        let manager = Arc::new(QueueManager::new(lanes, queue_config(1000, 1, DropPolicy::New)));

        manager
            .submit("s1", "telegram", Message::inbound("telegram", "s1", "u1", "first"), None)
            .await;
        manager
            .submit("s1", "telegram", Message::inbound("telegram", "s1", "u1", "second"), None)
            .await;

        let consumed = manager.consume_pending("s1").await;
        assert_eq!(consumed.len(), 1);
        assert_eq!(consumed[0].1.content, "first");
    }

    #[tokio::test]
    async fn drop_policy_old_drops_oldest() {
        let lanes = Arc::new(LaneQueue::new(4, 8, 2));
        let manager = Arc::new(QueueManager::new(lanes, queue_config(1000, 1, DropPolicy::Old)));

        manager
            .submit("s1", "telegram", Message::inbound("telegram", "s1", "u1", "first"), None)
            .await;
        manager
            .submit("s1", "telegram", Message::inbound("telegram", "s1", "u1", "second"), None)
            .await;

        let consumed = manager.consume_pending("s1").await;
        assert_eq!(consumed.len(), 1);
        assert_eq!(consumed[0].1.content, "second");
    }

    #[tokio::test]
    async fn default_mode_reports_configured_default() {
        let lanes = Arc::new(LaneQueue::new(4, 8, 2));
        let manager = QueueManager::new(lanes, queue_config(1000, 20, DropPolicy::Old));
        assert_eq!(manager.default_mode(), QueueMode::Collect);
    }

    #[tokio::test]
    async fn consume_pending_drains_buffer_and_lane() {
        let lanes = Arc::new(LaneQueue::new(4, 8, 2));
        let manager = Arc::new(QueueManager::new(lanes.clone(), queue_config(10, 20, DropPolicy::Old)));

        manager
            .submit("s1", "telegram", Message::inbound("telegram", "s1", "u1", "buffered"), None)
            .await;
        tokio::time::sleep(StdDuration::from_millis(30)).await;
        manager
            .submit("s1", "telegram", Message::inbound("telegram", "s1", "u1", "still buffering"), None)
            .await;

        let consumed = manager.consume_pending("s1").await;
        assert_eq!(consumed.len(), 2);
        assert!(!manager.peek_pending("s1").await);
    }
}

// Copyright (c) 2026 Warden Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};
use warden_config::QueueMode;

use crate::message::Message;

/// An item waiting in a lane. `steer_eligible == false` marks a system event
/// (sub-agent result, scheduler injection) that must reach the agent as its
/// own turn and never be coalesced or treated as a steer of an unrelated run.
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub session_key: String,
    pub channel: String,
    pub messages: Vec<Message>,
    pub mode: QueueMode,
    pub steer_eligible: bool,
}

impl QueueItem {
    pub fn new(session_key: impl Into<String>, channel: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            session_key: session_key.into(),
            channel: channel.into(),
            messages,
            mode: QueueMode::Collect,
            steer_eligible: true,
        }
    }

    pub fn system_event(session_key: impl Into<String>, channel: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            steer_eligible: false,
            ..Self::new(session_key, channel, messages)
        }
    }
}

struct LaneState {
    queue: VecDeque<QueueItem>,
    active_count: usize,
}

struct Lane {
    max_concurrency: usize,
    state: Mutex<LaneState>,
    item_available: Notify,
}

impl Lane {
    fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency,
            state: Mutex::new(LaneState {
                queue: VecDeque::new(),
                active_count: 0,
            }),
            item_available: Notify::new(),
        }
    }
}

/// Lane-aware FIFO queue draining each lane at its own concurrency cap.
///
/// Session-specific serialization is layered on top by callers: a handler
/// acquires the per-session mutex ([`LaneQueue::session_lock`]) before
/// running an agent turn, guaranteeing one active run per session across
/// every lane it might appear in.
pub struct LaneQueue {
    lanes: Mutex<HashMap<String, Arc<Lane>>>,
    session_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

#[derive(Debug, Clone, Copy)]
pub struct LaneStats {
    pub queued: usize,
    pub active: usize,
    pub max_concurrency: usize,
}

impl LaneQueue {
    pub fn new(main_concurrency: usize, subagent_concurrency: usize, cron_concurrency: usize) -> Self {
        let mut lanes = HashMap::new();
        lanes.insert("main".to_string(), Arc::new(Lane::new(main_concurrency)));
        lanes.insert("subagent".to_string(), Arc::new(Lane::new(subagent_concurrency)));
        lanes.insert("cron".to_string(), Arc::new(Lane::new(cron_concurrency)));
        Self {
            lanes: Mutex::new(lanes),
            session_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Get or lazily create a lane. Unknown lane names (e.g. a per-session
    /// `session:<key>` lane) default to a concurrency cap of 1.
    async fn get_lane(&self, name: &str) -> Arc<Lane> {
        let mut lanes = self.lanes.lock().await;
        lanes
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Lane::new(1)))
            .clone()
    }

    /// Get or lazily create the mutex serializing runs for one session. Never
    /// removed: a session that goes quiet keeps its slot for the lifetime of
    /// the process, matching the contract's "never garbage-collected" note.
    pub async fn session_lock(&self, session_key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.session_locks.lock().await;
        locks
            .entry(session_key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub async fn enqueue(&self, item: QueueItem, lane_name: &str) {
        let lane = self.get_lane(lane_name).await;
        let mut state = lane.state.lock().await;
        state.queue.push_back(item);
        lane.item_available.notify_one();
    }

    /// Drain `lane_name` forever, running `handler` for each popped item with
    /// the lane's concurrency respected. Intended to be run as one of
    /// `max_concurrency` concurrent workers per lane (see
    /// [`LaneQueue::spawn_workers`]); a single call to this method processes
    /// at most one item at a time.
    pub async fn process<F, Fut>(&self, lane_name: &str, handler: F)
    where
        F: Fn(QueueItem) -> Fut,
        Fut: Future<Output = ()>,
    {
        let lane = self.get_lane(lane_name).await;
        loop {
            let item = {
                let mut state = lane.state.lock().await;
                let item = if state.active_count < lane.max_concurrency {
                    state.queue.pop_front()
                } else {
                    None
                };
                if item.is_some() {
                    state.active_count += 1;
                }
                item
            };

            let Some(item) = item else {
                lane.item_available.notified().await;
                continue;
            };

            let session_lock = self.session_lock(&item.session_key).await;
            {
                let _guard = session_lock.lock().await;
                handler(item).await;
            }

            let mut state = lane.state.lock().await;
            state.active_count -= 1;
        }
    }

    /// Spawn `count` concurrent [`LaneQueue::process`] workers for `lane_name`
    /// on an already-`Arc`-wrapped queue; this is the usual way a lane's
    /// configured concurrency is realized.
    pub fn spawn_workers<F, Fut>(self: &Arc<Self>, lane_name: &str, count: usize, handler: F) -> Vec<tokio::task::JoinHandle<()>>
    where
        F: Fn(QueueItem) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        (0..count)
            .map(|_| {
                let queue = Arc::clone(self);
                let lane_name = lane_name.to_string();
                let handler = handler.clone();
                tokio::spawn(async move { queue.process(&lane_name, handler).await })
            })
            .collect()
    }

    /// Non-destructive check for steer/interrupt middleware: true iff a
    /// steer-eligible item for `session_key` is queued in `lane_name`.
    pub async fn peek_session_pending(&self, session_key: &str, lane_name: &str) -> bool {
        let lane = self.get_lane(lane_name).await;
        let state = lane.state.lock().await;
        state
            .queue
            .iter()
            .any(|item| item.session_key == session_key && item.steer_eligible)
    }

    /// Remove and return every steer-eligible item for `session_key`,
    /// leaving non-steer-eligible (system event) items in place.
    pub async fn consume_session_pending(&self, session_key: &str, lane_name: &str) -> Vec<QueueItem> {
        let lane = self.get_lane(lane_name).await;
        let mut state = lane.state.lock().await;
        let (consumed, remaining): (VecDeque<_>, VecDeque<_>) = state
            .queue
            .drain(..)
            .partition(|item| item.session_key == session_key && item.steer_eligible);
        state.queue = remaining;
        consumed.into_iter().collect()
    }

    pub async fn get_stats(&self) -> HashMap<String, LaneStats> {
        let lanes = self.lanes.lock().await;
        let mut stats = HashMap::new();
        for (name, lane) in lanes.iter() {
            let state = lane.state.lock().await;
            stats.insert(
                name.clone(),
                LaneStats {
                    queued: state.queue.len(),
                    active: state.active_count,
                    max_concurrency: lane.max_concurrency,
                },
            );
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn enqueue_then_peek_and_consume() {
        let q = LaneQueue::new(4, 8, 2);
        q.enqueue(QueueItem::new("s1", "telegram", vec![]), "main").await;
        assert!(q.peek_session_pending("s1", "main").await);
        assert!(!q.peek_session_pending("s2", "main").await);

        let consumed = q.consume_session_pending("s1", "main").await;
        assert_eq!(consumed.len(), 1);
        assert!(!q.peek_session_pending("s1", "main").await);
    }

    #[tokio::test]
    async fn system_events_are_not_steer_eligible() {
        let q = LaneQueue::new(4, 8, 2);
        q.enqueue(QueueItem::system_event("s1", "telegram", vec![]), "main").await;
        assert!(!q.peek_session_pending("s1", "main").await);
        assert!(q.consume_session_pending("s1", "main").await.is_empty());
    }

    #[tokio::test]
    async fn unknown_lane_defaults_to_concurrency_one() {
        let q = LaneQueue::new(4, 8, 2);
        q.enqueue(QueueItem::new("s1", "telegram", vec![]), "session:s1").await;
        let stats = q.get_stats().await;
        assert_eq!(stats["session:s1"].max_concurrency, 1);
    }

    #[tokio::test]
    async fn process_drains_items_respecting_concurrency() {
        let q = Arc::new(LaneQueue::new(1, 8, 2));
        let (tx, mut rx) = mpsc::unbounded_channel();

        q.enqueue(QueueItem::new("s1", "telegram", vec![]), "main").await;
        q.enqueue(QueueItem::new("s2", "telegram", vec![]), "main").await;

        let workers = q.spawn_workers("main", 1, move |item| {
            let tx = tx.clone();
            async move {
                tx.send(item.session_key.clone()).unwrap();
            }
        });

        let first = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        let second = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(first, "s1");
        assert_eq!(second, "s2");

        for w in workers {
            w.abort();
        }
    }

    #[tokio::test]
    async fn same_session_runs_are_serialized_by_session_lock() {
        let q = Arc::new(LaneQueue::new(4, 8, 2));
        let lock_a = q.session_lock("s1").await;
        let lock_b = q.session_lock("s1").await;
        assert!(Arc::ptr_eq(&lock_a, &lock_b));
    }
}

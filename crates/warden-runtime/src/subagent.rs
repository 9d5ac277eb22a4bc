// Copyright (c) 2026 Warden Contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Background worker pool for sub-agent spawn requests, section 4.6. A
//! sub-agent runs a fresh, stateless [`AgentRunner`] under an overall
//! timeout; its outcome is delivered back to the parent session as a
//! steer-ineligible system event via [`SubAgentResultSink`], never by direct
//! reference — the parent learns about sub-agents only through injected
//! turns and through querying this store by id.
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tracing::{error, info, warn};
use warden_core::{AgentRunError, TurnOutcome};

use crate::factory::AgentFactory;

const STATE_DIR: &str = ".warden";
const STATE_FILE: &str = "subagents.json";
const DEFAULT_MAX_CONCURRENT: usize = 8;

#[derive(Debug, Error)]
pub enum SubAgentError {
    #[error("failed to persist sub-agent store to {path}: {source}")]
    Write { path: PathBuf, source: std::io::Error },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubAgentStatus {
    Pending,
    Running,
    Completed,
    Failed,
    TimedOut,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubAgentRequest {
    pub id: String,
    pub label: String,
    pub parent_session_key: String,
    pub prompt: String,
    pub timeout_seconds: u64,
    pub created_at: DateTime<Utc>,
    pub status: SubAgentStatus,
    pub result: Option<String>,
    pub error: Option<String>,
}

/// Delivers a sub-agent's outcome back into the parent session's queue as a
/// non-steerable system event. Implemented by the `WorkspaceRunner`
/// equivalent that owns a [`warden_core::QueueManager`]; kept as a trait so
/// this crate never depends on the concrete wiring.
#[async_trait]
pub trait SubAgentResultSink: Send + Sync {
    async fn deliver(&self, parent_session_key: &str, label: &str, content: String);
}

/// Durable map of sub-agent requests, mirroring `SessionManager`'s
/// write-temp-then-rename persistence so a parent can query completed
/// sub-agents after a restart.
pub struct SubAgentStore {
    state_file: PathBuf,
    requests: Mutex<HashMap<String, SubAgentRequest>>,
}

impl SubAgentStore {
    pub async fn new(workspace_path: impl AsRef<Path>) -> Result<Self, SubAgentError> {
        let state_dir = workspace_path.as_ref().join(STATE_DIR);
        tokio::fs::create_dir_all(&state_dir)
            .await
            .map_err(|source| SubAgentError::Write { path: state_dir.clone(), source })?;
        let state_file = state_dir.join(STATE_FILE);
        let requests = Self::load(&state_file).await;
        Ok(Self {
            state_file,
            requests: Mutex::new(requests),
        })
    }

    async fn load(state_file: &Path) -> HashMap<String, SubAgentRequest> {
        if !state_file.exists() {
            return HashMap::new();
        }
        match tokio::fs::read_to_string(state_file).await {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_default(),
            Err(_) => HashMap::new(),
        }
    }

    async fn save(&self, requests: &HashMap<String, SubAgentRequest>) -> Result<(), SubAgentError> {
        let json = serde_json::to_string_pretty(requests).expect("sub-agent store is always serializable");
        let tmp_path = self.state_file.with_extension("tmp");
        tokio::fs::write(&tmp_path, json)
            .await
            .map_err(|source| SubAgentError::Write { path: tmp_path.clone(), source })?;
        tokio::fs::rename(&tmp_path, &self.state_file)
            .await
            .map_err(|source| SubAgentError::Write { path: self.state_file.clone(), source })?;
        Ok(())
    }

    async fn insert(&self, request: SubAgentRequest) {
        let mut requests = self.requests.lock().await;
        requests.insert(request.id.clone(), request);
        let _ = self.save(&requests).await;
    }

    async fn update<F: FnOnce(&mut SubAgentRequest)>(&self, id: &str, f: F) {
        let mut requests = self.requests.lock().await;
        if let Some(request) = requests.get_mut(id) {
            f(request);
        }
        let _ = self.save(&requests).await;
    }

    pub async fn get(&self, id: &str) -> Option<SubAgentRequest> {
        self.requests.lock().await.get(id).cloned()
    }

    pub async fn list_for_session(&self, parent_session_key: &str) -> Vec<SubAgentRequest> {
        self.requests
            .lock()
            .await
            .values()
            .filter(|r| r.parent_session_key == parent_session_key)
            .cloned()
            .collect()
    }

    /// Trim completed/failed/timed-out entries beyond `keep`, oldest first.
    /// Used by the periodic cleanup task; in-flight (`pending`/`running`)
    /// entries are never dropped.
    pub async fn trim_finished(&self, keep: usize) -> usize {
        let mut requests = self.requests.lock().await;
        let mut finished: Vec<(String, DateTime<Utc>)> = requests
            .values()
            .filter(|r| matches!(r.status, SubAgentStatus::Completed | SubAgentStatus::Failed | SubAgentStatus::TimedOut))
            .map(|r| (r.id.clone(), r.created_at))
            .collect();
        if finished.len() <= keep {
            return 0;
        }
        finished.sort_by_key(|(_, created_at)| *created_at);
        let drop_count = finished.len() - keep;
        for (id, _) in finished.into_iter().take(drop_count) {
            requests.remove(&id);
        }
        let _ = self.save(&requests).await;
        drop_count
    }
}

/// Worker pool bounded by `max_concurrent` (default 8, section 4.6).
/// `spawn` returns a request id immediately; the run happens on a detached
/// task.
pub struct SubAgentRunner {
    store: Arc<SubAgentStore>,
    factory: Arc<dyn AgentFactory>,
    sink: Arc<dyn SubAgentResultSink>,
    permits: Arc<Semaphore>,
}

impl SubAgentRunner {
    pub fn new(store: Arc<SubAgentStore>, factory: Arc<dyn AgentFactory>, sink: Arc<dyn SubAgentResultSink>) -> Self {
        Self::with_max_concurrent(store, factory, sink, DEFAULT_MAX_CONCURRENT)
    }

    pub fn with_max_concurrent(
        store: Arc<SubAgentStore>,
        factory: Arc<dyn AgentFactory>,
        sink: Arc<dyn SubAgentResultSink>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            store,
            factory,
            sink,
            permits: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    /// Schedule the work and return its request id immediately. The caller's
    /// own tool set never includes this capability for the spawned
    /// sub-agent: nesting is capped at one level by construction, since a
    /// stateless sub-agent has no spawn tool to reach for.
    pub async fn spawn(self: &Arc<Self>, label: &str, parent_session_key: &str, prompt: &str, timeout_seconds: u64) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let request = SubAgentRequest {
            id: id.clone(),
            label: label.to_string(),
            parent_session_key: parent_session_key.to_string(),
            prompt: prompt.to_string(),
            timeout_seconds,
            created_at: Utc::now(),
            status: SubAgentStatus::Pending,
            result: None,
            error: None,
        };
        self.store.insert(request).await;

        let runner = Arc::clone(self);
        let id_for_task = id.clone();
        tokio::spawn(async move { runner.run(&id_for_task).await });

        id
    }

    async fn run(self: Arc<Self>, id: &str) {
        let Ok(_permit) = self.permits.clone().acquire_owned().await else {
            return;
        };

        let Some(request) = self.store.get(id).await else {
            return;
        };

        self.store.update(id, |r| r.status = SubAgentStatus::Running).await;
        info!(id, label = %request.label, "sub-agent started");

        let agent = self.factory.create();
        let outcome = tokio::time::timeout(
            Duration::from_secs(request.timeout_seconds),
            agent.run(&request.prompt, id),
        )
        .await;

        let (status, content) = match outcome {
            Ok(Ok(TurnOutcome::Completed(text))) => (SubAgentStatus::Completed, text),
            Ok(Ok(other)) => {
                let message = format!("sub-agent produced an unexpected control-flow outcome: {other:?}");
                warn!(id, %message);
                (SubAgentStatus::Failed, message)
            }
            Ok(Err(AgentRunError::Failed(err))) => {
                error!(id, %err, "sub-agent run failed");
                (SubAgentStatus::Failed, err.to_string())
            }
            Err(_) => {
                warn!(id, timeout_seconds = request.timeout_seconds, "sub-agent timed out");
                (SubAgentStatus::TimedOut, "sub-agent timed out".to_string())
            }
        };

        match status {
            SubAgentStatus::Completed => {
                self.store
                    .update(id, |r| {
                        r.status = status;
                        r.result = Some(content.clone());
                    })
                    .await;
            }
            _ => {
                self.store
                    .update(id, |r| {
                        r.status = status;
                        r.error = Some(content.clone());
                    })
                    .await;
            }
        }

        self.sink.deliver(&request.parent_session_key, &request.label, content).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex as AsyncMutex;
    use warden_core::{AgentRunError as CoreAgentRunError, ArchivedTurn, RunMetrics, TurnAccount};

    struct InstantRunner {
        response: String,
    }

    #[async_trait]
    impl warden_core::AgentRunner for InstantRunner {
        async fn run(&self, _input: &str, _thread_id: &str) -> Result<TurnOutcome, CoreAgentRunError> {
            Ok(TurnOutcome::Completed(self.response.clone()))
        }
        async fn context_info(&self, _thread_id: &str) -> TurnAccount {
            TurnAccount {
                message_count: 0,
                approx_tokens: 0,
                max_input_tokens: 1000,
                schema_overhead: 0,
                calibration_factor: 1.0,
                cache_read_total: 0,
                cache_write_total: 0,
            }
        }
        async fn history(&self, _thread_id: &str) -> Result<Vec<ArchivedTurn>, CoreAgentRunError> {
            Ok(Vec::new())
        }
        fn last_metrics(&self) -> Option<RunMetrics> {
            None
        }
        fn take_followup_request(&self) -> Option<warden_core::FollowupRequest> {
            None
        }
    }

    struct StallingRunner;

    #[async_trait]
    impl warden_core::AgentRunner for StallingRunner {
        async fn run(&self, _input: &str, _thread_id: &str) -> Result<TurnOutcome, CoreAgentRunError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(TurnOutcome::Completed("too late".to_string()))
        }
        async fn context_info(&self, _thread_id: &str) -> TurnAccount {
            unreachable!()
        }
        async fn history(&self, _thread_id: &str) -> Result<Vec<ArchivedTurn>, CoreAgentRunError> {
            Ok(Vec::new())
        }
        fn last_metrics(&self) -> Option<RunMetrics> {
            None
        }
        fn take_followup_request(&self) -> Option<warden_core::FollowupRequest> {
            None
        }
    }

    struct ConstFactory(String);
    impl AgentFactory for ConstFactory {
        fn create(&self) -> Arc<dyn warden_core::AgentRunner> {
            Arc::new(InstantRunner { response: self.0.clone() })
        }
    }

    struct StallingFactory;
    impl AgentFactory for StallingFactory {
        fn create(&self) -> Arc<dyn warden_core::AgentRunner> {
            Arc::new(StallingRunner)
        }
    }

    struct RecordingSink {
        delivered: AsyncMutex<Vec<(String, String, String)>>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self { delivered: AsyncMutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl SubAgentResultSink for RecordingSink {
        async fn deliver(&self, parent_session_key: &str, label: &str, content: String) {
            self.delivered
                .lock()
                .await
                .push((parent_session_key.to_string(), label.to_string(), content));
        }
    }

    #[tokio::test]
    async fn spawn_delivers_completed_result_to_sink() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SubAgentStore::new(dir.path()).await.unwrap());
        let sink = Arc::new(RecordingSink::new());
        let runner = Arc::new(SubAgentRunner::new(
            store.clone(),
            Arc::new(ConstFactory("done".to_string())),
            sink.clone(),
        ));

        let id = runner.spawn("research", "telegram:1", "look into X", 5).await;

        for _ in 0..50 {
            if !sink.delivered.lock().await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let delivered = sink.delivered.lock().await;
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0], ("telegram:1".to_string(), "research".to_string(), "done".to_string()));

        let request = store.get(&id).await.unwrap();
        assert_eq!(request.status, SubAgentStatus::Completed);
        assert_eq!(request.result.as_deref(), Some("done"));
    }

    #[tokio::test]
    async fn spawn_marks_timeout_when_deadline_exceeded() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SubAgentStore::new(dir.path()).await.unwrap());
        let sink = Arc::new(RecordingSink::new());
        let runner = Arc::new(SubAgentRunner::new(store.clone(), Arc::new(StallingFactory), sink.clone()));

        let id = runner.spawn("slow", "telegram:1", "take forever", 0).await;

        for _ in 0..200 {
            if !sink.delivered.lock().await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let request = store.get(&id).await.unwrap();
        assert_eq!(request.status, SubAgentStatus::TimedOut);
    }

    #[tokio::test]
    async fn trim_finished_keeps_most_recent_and_never_drops_in_flight() {
        let dir = tempfile::tempdir().unwrap();
        let store = SubAgentStore::new(dir.path()).await.unwrap();

        for i in 0..5 {
            store
                .insert(SubAgentRequest {
                    id: format!("done-{i}"),
                    label: "x".to_string(),
                    parent_session_key: "s1".to_string(),
                    prompt: "p".to_string(),
                    timeout_seconds: 30,
                    created_at: Utc::now() + chrono::Duration::seconds(i),
                    status: SubAgentStatus::Completed,
                    result: Some("ok".to_string()),
                    error: None,
                })
                .await;
        }
        store
            .insert(SubAgentRequest {
                id: "running".to_string(),
                label: "x".to_string(),
                parent_session_key: "s1".to_string(),
                prompt: "p".to_string(),
                timeout_seconds: 30,
                created_at: Utc::now(),
                status: SubAgentStatus::Running,
                result: None,
                error: None,
            })
            .await;

        let dropped = store.trim_finished(2).await;
        assert_eq!(dropped, 3);
        assert!(store.get("running").await.is_some());
        assert!(store.get("done-4").await.is_some());
        assert!(store.get("done-0").await.is_none());
    }
}

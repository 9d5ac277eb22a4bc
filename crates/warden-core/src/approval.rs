// Copyright (c) 2026 Warden Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::info;
use warden_config::{ApprovalGatesConfig, DefaultAction, ToolApprovalConfig};

/// A tool call awaiting user authorization.
#[derive(Debug, Clone)]
pub struct PendingApproval {
    pub id: String,
    pub tool_name: String,
    pub tool_args: Value,
    pub session_key: String,
    pub thread_id: String,
    pub created_at: DateTime<Utc>,
    pub resolved: bool,
    pub approved: Option<bool>,
}

struct ApprovalEntry {
    approval: PendingApproval,
    waiters: Vec<oneshot::Sender<bool>>,
}

/// Manages pending tool-approval requests and their resolution, per section
/// 4.5: request → user reply or timeout → default action → recent-approval
/// bypass for the re-run that follows an approve.
pub struct ApprovalGate {
    config: ApprovalGatesConfig,
    pending: Mutex<HashMap<String, ApprovalEntry>>,
    timeout_tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl ApprovalGate {
    pub fn new(config: ApprovalGatesConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            pending: Mutex::new(HashMap::new()),
            timeout_tasks: Mutex::new(HashMap::new()),
        })
    }

    pub fn requires_approval(&self, tool_name: &str) -> bool {
        if !self.config.enabled {
            return false;
        }
        self.config
            .tools
            .get(tool_name)
            .map(|cfg| cfg.require_approval)
            .unwrap_or(false)
    }

    pub fn tool_config(&self, tool_name: &str) -> Option<&ToolApprovalConfig> {
        self.config.tools.get(tool_name)
    }

    pub async fn request_approval(self: &Arc<Self>, tool_name: &str, tool_args: Value, session_key: &str, thread_id: &str) -> PendingApproval {
        let id = uuid::Uuid::new_v4().to_string()[..8].to_string();
        let approval = PendingApproval {
            id: id.clone(),
            tool_name: tool_name.to_string(),
            tool_args,
            session_key: session_key.to_string(),
            thread_id: thread_id.to_string(),
            created_at: Utc::now(),
            resolved: false,
            approved: None,
        };

        self.pending.lock().await.insert(
            id.clone(),
            ApprovalEntry {
                approval: approval.clone(),
                waiters: Vec::new(),
            },
        );

        let this = Arc::clone(self);
        let timeout_id = id.clone();
        let timeout_seconds = self.config.timeout_seconds;
        let task = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(timeout_seconds)).await;
            let default_approved = this.config.default_action == DefaultAction::Approve;
            if this.resolve(&timeout_id, default_approved).await {
                info!(approval_id = %timeout_id, approved = default_approved, "approval timed out, applied default action");
            }
        });
        self.timeout_tasks.lock().await.insert(id, task);

        approval
    }

    /// Block until `approval_id` is resolved (by `resolve` or timeout),
    /// returning whether it was approved. Returns `false` immediately for an
    /// unknown id.
    pub async fn wait_for_resolution(&self, approval_id: &str) -> bool {
        let rx = {
            let mut pending = self.pending.lock().await;
            let Some(entry) = pending.get_mut(approval_id) else {
                return false;
            };
            if entry.approval.resolved {
                return entry.approval.approved.unwrap_or(false);
            }
            let (tx, rx) = oneshot::channel();
            entry.waiters.push(tx);
            rx
        };
        rx.await.unwrap_or(false)
    }

    /// Resolve a pending approval. Returns `false` if unknown or already
    /// resolved. A denied entry is removed immediately; an approved entry is
    /// retained for [`ApprovalGate::check_recent_approval`] until the
    /// subsequent tool call clears it via [`ApprovalGate::clear_recent_approval`].
    pub async fn resolve(&self, approval_id: &str, approved: bool) -> bool {
        let waiters = {
            let mut pending = self.pending.lock().await;
            let Some(entry) = pending.get_mut(approval_id) else {
                return false;
            };
            if entry.approval.resolved {
                return false;
            }
            entry.approval.resolved = true;
            entry.approval.approved = Some(approved);
            let waiters = std::mem::take(&mut entry.waiters);

            if !approved {
                pending.remove(approval_id);
            }
            waiters
        };

        for tx in waiters {
            let _ = tx.send(approved);
        }

        if let Some(task) = self.timeout_tasks.lock().await.remove(approval_id) {
            task.abort();
        }

        true
    }

    pub async fn get_pending(&self, session_key: Option<&str>) -> Vec<PendingApproval> {
        let pending = self.pending.lock().await;
        pending
            .values()
            .filter(|e| !e.approval.resolved)
            .filter(|e| session_key.map(|s| e.approval.session_key == s).unwrap_or(true))
            .map(|e| e.approval.clone())
            .collect()
    }

    pub async fn check_recent_approval(&self, session_key: &str, tool_name: &str) -> bool {
        let pending = self.pending.lock().await;
        pending.values().any(|e| {
            e.approval.session_key == session_key
                && e.approval.tool_name == tool_name
                && e.approval.resolved
                && e.approval.approved == Some(true)
        })
    }

    pub async fn clear_recent_approval(&self, session_key: &str, tool_name: &str) {
        let mut pending = self.pending.lock().await;
        pending.retain(|_, e| {
            !(e.approval.session_key == session_key
                && e.approval.tool_name == tool_name
                && e.approval.resolved
                && e.approval.approved == Some(true))
        });
    }

    /// Clear approved-but-uncleared entries older than `max_age`. Used by the
    /// periodic cleanup task; a session that never makes the follow-up call
    /// `clear_recent_approval` expects would otherwise hold its entry forever.
    pub async fn sweep_stale_approvals(&self, max_age: Duration) -> usize {
        let cutoff = Utc::now() - chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::zero());
        let mut pending = self.pending.lock().await;
        let before = pending.len();
        pending.retain(|_, e| {
            !(e.approval.resolved && e.approval.approved == Some(true) && e.approval.created_at < cutoff)
        });
        before - pending.len()
    }

    /// Cancel and await every outstanding timeout task, then drop resolved
    /// entries. Called during `LifecycleManager` shutdown.
    pub async fn cleanup(&self) {
        let tasks: Vec<JoinHandle<()>> = {
            let mut timeout_tasks = self.timeout_tasks.lock().await;
            timeout_tasks.drain().map(|(_, task)| task).collect()
        };
        for task in &tasks {
            task.abort();
        }
        for task in tasks {
            let _ = task.await;
        }

        let mut pending = self.pending.lock().await;
        pending.retain(|_, e| !e.approval.resolved);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;

    fn gate_config(enabled: bool, timeout_seconds: u64, default_action: DefaultAction) -> ApprovalGatesConfig {
        let mut tools = StdHashMap::new();
        tools.insert(
            "shell".to_string(),
            ToolApprovalConfig {
                require_approval: true,
                show_args: true,
            },
        );
        ApprovalGatesConfig {
            enabled,
            timeout_seconds,
            default_action,
            tools,
        }
    }

    #[tokio::test]
    async fn requires_approval_respects_enabled_and_tool_config() {
        let gate = ApprovalGate::new(gate_config(true, 300, DefaultAction::Deny));
        assert!(gate.requires_approval("shell"));
        assert!(!gate.requires_approval("read_file"));

        let disabled = ApprovalGate::new(gate_config(false, 300, DefaultAction::Deny));
        assert!(!disabled.requires_approval("shell"));
    }

    #[tokio::test]
    async fn resolve_approved_then_bypass_and_clear() {
        let gate = ApprovalGate::new(gate_config(true, 300, DefaultAction::Deny));
        let approval = gate.request_approval("shell", serde_json::json!({"cmd": "ls"}), "s1", "s1:conv1").await;
        assert!(gate.resolve(&approval.id, true).await);
        assert!(gate.wait_for_resolution(&approval.id).await);

        assert!(gate.check_recent_approval("s1", "shell").await);
        gate.clear_recent_approval("s1", "shell").await;
        assert!(!gate.check_recent_approval("s1", "shell").await);
    }

    #[tokio::test]
    async fn resolve_denied_removes_entry_immediately() {
        let gate = ApprovalGate::new(gate_config(true, 300, DefaultAction::Deny));
        let approval = gate.request_approval("shell", serde_json::json!({}), "s1", "s1:conv1").await;
        assert!(gate.resolve(&approval.id, false).await);
        assert!(gate.get_pending(Some("s1")).await.is_empty());
        assert!(!gate.check_recent_approval("s1", "shell").await);
    }

    #[tokio::test]
    async fn timeout_applies_default_action() {
        let gate = ApprovalGate::new(gate_config(true, 0, DefaultAction::Approve));
        let approval = gate.request_approval("shell", serde_json::json!({}), "s1", "s1:conv1").await;
        let approved = gate.wait_for_resolution(&approval.id).await;
        assert!(approved);
    }

    #[tokio::test]
    async fn sweep_stale_approvals_clears_old_approved_entries_only() {
        let gate = ApprovalGate::new(gate_config(true, 300, DefaultAction::Deny));
        let approval = gate.request_approval("shell", serde_json::json!({}), "s1", "s1:conv1").await;
        gate.resolve(&approval.id, true).await;

        assert_eq!(gate.sweep_stale_approvals(Duration::from_secs(3600)).await, 0);
        assert!(gate.check_recent_approval("s1", "shell").await);

        let cleared = gate.sweep_stale_approvals(Duration::from_secs(0)).await;
        assert_eq!(cleared, 1);
        assert!(!gate.check_recent_approval("s1", "shell").await);
    }

    #[tokio::test]
    async fn cleanup_cancels_timeouts_and_drops_resolved() {
        let gate = ApprovalGate::new(gate_config(true, 300, DefaultAction::Deny));
        let approval = gate.request_approval("shell", serde_json::json!({}), "s1", "s1:conv1").await;
        gate.resolve(&approval.id, true).await;
        gate.cleanup().await;

        assert!(!gate.check_recent_approval("s1", "shell").await);
    }
}

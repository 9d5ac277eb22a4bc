// Copyright (c) 2026 Warden Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

const STATE_DIR: &str = ".warden";
const STATE_FILE: &str = "sessions.json";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to read session state from {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("corrupted session state at {path}: {source}")]
    Corrupted { path: PathBuf, source: serde_json::Error },
    #[error("failed to persist session state to {path}: {source}")]
    Write { path: PathBuf, source: std::io::Error },
}

/// Durable per-session state, the row-level type in `.warden/sessions.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionState {
    pub conversation_id: String,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub message_count: u64,
    pub last_active_at: Option<DateTime<Utc>>,
}

impl SessionState {
    fn new(conversation_id: String) -> Self {
        Self {
            conversation_id,
            started_at: Utc::now(),
            message_count: 0,
            last_active_at: None,
        }
    }
}

fn new_conversation_id() -> String {
    let now = Utc::now();
    format!(
        "conv_{}-{:06}",
        now.format("%Y-%m-%dT%H-%M-%S"),
        now.timestamp_subsec_micros()
    )
}

/// Tracks the active conversation thread per session, persisting to
/// `<workspace>/.warden/sessions.json` on every mutation via a
/// write-temp-then-rename atomic write.
pub struct SessionManager {
    state_file: PathBuf,
    sessions: Mutex<HashMap<String, SessionState>>,
}

impl SessionManager {
    pub async fn new(workspace_path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let state_dir = workspace_path.as_ref().join(STATE_DIR);
        tokio::fs::create_dir_all(&state_dir).await.map_err(|source| SessionError::Write {
            path: state_dir.clone(),
            source,
        })?;
        let state_file = state_dir.join(STATE_FILE);
        let sessions = Self::load(&state_file).await?;
        debug!(path = %state_file.display(), count = sessions.len(), "loaded session state");
        Ok(Self {
            state_file,
            sessions: Mutex::new(sessions),
        })
    }

    async fn load(state_file: &Path) -> Result<HashMap<String, SessionState>, SessionError> {
        if !state_file.exists() {
            return Ok(HashMap::new());
        }
        let raw = match tokio::fs::read_to_string(state_file).await {
            Ok(raw) => raw,
            Err(source) => {
                return Err(SessionError::Read {
                    path: state_file.to_path_buf(),
                    source,
                })
            }
        };
        match serde_json::from_str(&raw) {
            Ok(sessions) => Ok(sessions),
            Err(source) => {
                error!(path = %state_file.display(), %source, "corrupted session state, starting fresh");
                let _ = source;
                Ok(HashMap::new())
            }
        }
    }

    async fn save(&self, sessions: &HashMap<String, SessionState>) -> Result<(), SessionError> {
        let json = serde_json::to_string_pretty(sessions).expect("session state is always serializable");
        let tmp_path = self.state_file.with_extension("tmp");
        tokio::fs::write(&tmp_path, json).await.map_err(|source| SessionError::Write {
            path: tmp_path.clone(),
            source,
        })?;
        tokio::fs::rename(&tmp_path, &self.state_file).await.map_err(|source| SessionError::Write {
            path: self.state_file.clone(),
            source,
        })?;
        Ok(())
    }

    /// Return `"<session_key>:<conversation_id>"`, creating a fresh session
    /// (and persisting it) if this is the first time `session_key` is seen.
    pub async fn get_thread_id(&self, session_key: &str) -> Result<String, SessionError> {
        let mut sessions = self.sessions.lock().await;
        if !sessions.contains_key(session_key) {
            sessions.insert(session_key.to_string(), SessionState::new(new_conversation_id()));
            self.save(&sessions).await?;
        }
        let conversation_id = sessions[session_key].conversation_id.clone();
        Ok(format!("{session_key}:{conversation_id}"))
    }

    /// Rotate to a new conversation ID for `session_key`, returning the OLD
    /// conversation ID so the caller can archive it.
    pub async fn new_conversation(&self, session_key: &str) -> Result<String, SessionError> {
        let mut sessions = self.sessions.lock().await;
        let old_conversation_id = sessions
            .get(session_key)
            .map(|s| s.conversation_id.clone())
            .unwrap_or_else(new_conversation_id);

        sessions.insert(session_key.to_string(), SessionState::new(new_conversation_id()));
        self.save(&sessions).await?;
        Ok(old_conversation_id)
    }

    pub async fn get_state(&self, session_key: &str) -> Option<SessionState> {
        self.sessions.lock().await.get(session_key).cloned()
    }

    pub async fn increment_message_count(&self, session_key: &str) -> Result<(), SessionError> {
        let mut sessions = self.sessions.lock().await;
        match sessions.get_mut(session_key) {
            Some(state) => {
                state.message_count += 1;
                state.last_active_at = Some(Utc::now());
                self.save(&sessions).await
            }
            None => {
                warn!(session_key, "increment_message_count on unknown session");
                Ok(())
            }
        }
    }

    pub async fn list_sessions(&self) -> HashMap<String, SessionState> {
        self.sessions.lock().await.clone()
    }
}

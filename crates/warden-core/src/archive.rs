// Copyright (c) 2026 Warden Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("failed to create archive directory {path}: {source}")]
    CreateDir { path: PathBuf, source: std::io::Error },
    #[error("failed to write archive file {path}: {source}")]
    Write { path: PathBuf, source: std::io::Error },
}

/// One turn of an archived conversation transcript. Mirrors the
/// human/ai/tool role split a conversation runner keeps internally.
#[derive(Debug, Clone)]
pub enum ArchivedTurn {
    User {
        content: String,
        timestamp: DateTime<Utc>,
    },
    Agent {
        content: String,
        timestamp: DateTime<Utc>,
        tool_calls: Vec<ArchivedToolCall>,
    },
    ToolResult {
        content: String,
        timestamp: DateTime<Utc>,
        tool_call_id: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct ArchivedToolCall {
    pub id: Option<String>,
    pub name: String,
    pub args: Value,
}

/// Metadata describing one archived conversation. Immutable after write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationArchive {
    pub conversation_id: String,
    pub session_key: String,
    pub workspace_name: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub message_count: usize,
    pub summary: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub markdown_path: PathBuf,
    pub json_path: PathBuf,
}

#[derive(Serialize, Deserialize)]
struct ArchiveMetadataJson {
    conversation_id: String,
    session_key: String,
    workspace_name: String,
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
    message_count: usize,
    summary: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    messages: Vec<JsonTurn>,
}

#[derive(Serialize, Deserialize)]
struct JsonTurn {
    role: String,
    content: String,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    tool_calls: Option<Vec<JsonToolCall>>,
    #[serde(default)]
    tool_call_id: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct JsonToolCall {
    name: String,
    args: Value,
    id: Option<String>,
}

/// Writes conversations to `<workspace>/memory/conversations/<id>.{md,json}`.
/// Vector-search indexing of archives is an external collaborator outside
/// this crate; [`ConversationArchiver::archive`] is where it would be
/// wired in as an optional post-write hook.
pub struct ConversationArchiver {
    archive_dir: PathBuf,
    workspace_name: String,
}

impl ConversationArchiver {
    pub async fn new(workspace_path: impl AsRef<Path>, workspace_name: impl Into<String>) -> Result<Self, ArchiveError> {
        let archive_dir = workspace_path.as_ref().join("memory").join("conversations");
        tokio::fs::create_dir_all(&archive_dir)
            .await
            .map_err(|source| ArchiveError::CreateDir { path: archive_dir.clone(), source })?;
        info!(path = %archive_dir.display(), "conversation archiver initialized");
        Ok(Self {
            archive_dir,
            workspace_name: workspace_name.into(),
        })
    }

    pub async fn archive(
        &self,
        session_key: &str,
        conversation_id: &str,
        transcript: &[ArchivedTurn],
        summary: Option<String>,
        tags: Vec<String>,
    ) -> Result<Option<ConversationArchive>, ArchiveError> {
        if transcript.is_empty() {
            return Ok(None);
        }

        let started_at = turn_timestamp(&transcript[0]);
        let ended_at = Utc::now();
        let markdown_path = self.archive_dir.join(format!("{conversation_id}.md"));
        let json_path = self.archive_dir.join(format!("{conversation_id}.json"));

        let archive = ConversationArchive {
            conversation_id: conversation_id.to_string(),
            session_key: session_key.to_string(),
            workspace_name: self.workspace_name.clone(),
            started_at,
            ended_at,
            message_count: transcript.len(),
            summary,
            tags,
            markdown_path: markdown_path.clone(),
            json_path: json_path.clone(),
        };

        let markdown = render_markdown(&archive, transcript);
        tokio::fs::write(&markdown_path, markdown)
            .await
            .map_err(|source| ArchiveError::Write { path: markdown_path.clone(), source })?;

        let json = render_json(&archive, transcript);
        tokio::fs::write(&json_path, json)
            .await
            .map_err(|source| ArchiveError::Write { path: json_path.clone(), source })?;

        info!(
            conversation_id,
            messages = transcript.len(),
            path = %markdown_path.display(),
            "archived conversation"
        );

        Ok(Some(archive))
    }

    pub async fn list_archives(&self, limit: usize) -> Vec<ConversationArchive> {
        let mut archives = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.archive_dir).await {
            Ok(entries) => entries,
            Err(_) => return archives,
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Ok(raw) = tokio::fs::read_to_string(&path).await {
                if let Ok(meta) = serde_json::from_str::<ArchiveMetadataJson>(&raw) {
                    archives.push(ConversationArchive {
                        conversation_id: meta.conversation_id,
                        session_key: meta.session_key,
                        workspace_name: meta.workspace_name,
                        started_at: meta.started_at,
                        ended_at: meta.ended_at,
                        message_count: meta.message_count,
                        summary: meta.summary,
                        tags: meta.tags,
                        markdown_path: self.archive_dir.join(format!("{}.md", path.file_stem().unwrap().to_string_lossy())),
                        json_path: path,
                    });
                }
            }
        }

        archives.sort_by(|a, b| b.ended_at.cmp(&a.ended_at));
        archives.truncate(limit);
        archives
    }
}

fn turn_timestamp(turn: &ArchivedTurn) -> DateTime<Utc> {
    match turn {
        ArchivedTurn::User { timestamp, .. } => *timestamp,
        ArchivedTurn::Agent { timestamp, .. } => *timestamp,
        ArchivedTurn::ToolResult { timestamp, .. } => *timestamp,
    }
}

fn render_markdown(archive: &ConversationArchive, transcript: &[ArchivedTurn]) -> String {
    let mut lines = vec![
        "# Conversation Archive".to_string(),
        String::new(),
        format!("**ID:** {}", archive.conversation_id),
        format!("**Session:** {}", archive.session_key),
        format!("**Workspace:** {}", archive.workspace_name),
        format!("**Started:** {}", archive.started_at.to_rfc3339()),
        format!("**Ended:** {}", archive.ended_at.to_rfc3339()),
        format!("**Messages:** {}", archive.message_count),
        String::new(),
    ];

    if let Some(summary) = &archive.summary {
        lines.push("## Summary".to_string());
        lines.push(String::new());
        lines.push(summary.clone());
        lines.push(String::new());
    }

    for turn in transcript {
        match turn {
            ArchivedTurn::User { content, timestamp } => {
                lines.push(format!("**[User]** {}", timestamp.to_rfc3339()));
                lines.push(String::new());
                lines.push(content.clone());
                lines.push(String::new());
                lines.push("---".to_string());
                lines.push(String::new());
            }
            ArchivedTurn::Agent { content, timestamp, tool_calls } => {
                lines.push(format!("**[Agent]** {}", timestamp.to_rfc3339()));
                lines.push(String::new());
                lines.push(content.clone());
                lines.push(String::new());
                for call in tool_calls {
                    lines.push(format!("**[Tool Call: {}]**", call.name));
                    lines.push(String::new());
                    if let Some(obj) = call.args.as_object() {
                        for (key, value) in obj {
                            lines.push(format!("- {key}: {value}"));
                        }
                    }
                    lines.push(String::new());
                }
                lines.push("---".to_string());
                lines.push(String::new());
            }
            ArchivedTurn::ToolResult { content, timestamp, .. } => {
                lines.push(format!("**[Tool Result]** {}", timestamp.to_rfc3339()));
                lines.push(String::new());
                lines.push(content.clone());
                lines.push(String::new());
                lines.push("---".to_string());
                lines.push(String::new());
            }
        }
    }

    lines.join("\n")
}

fn render_json(archive: &ConversationArchive, transcript: &[ArchivedTurn]) -> String {
    let messages = transcript
        .iter()
        .map(|turn| match turn {
            ArchivedTurn::User { content, timestamp } => JsonTurn {
                role: "human".to_string(),
                content: content.clone(),
                timestamp: *timestamp,
                tool_calls: None,
                tool_call_id: None,
            },
            ArchivedTurn::Agent { content, timestamp, tool_calls } => JsonTurn {
                role: "ai".to_string(),
                content: content.clone(),
                timestamp: *timestamp,
                tool_calls: (!tool_calls.is_empty()).then(|| {
                    tool_calls
                        .iter()
                        .map(|c| JsonToolCall {
                            name: c.name.clone(),
                            args: c.args.clone(),
                            id: c.id.clone(),
                        })
                        .collect()
                }),
                tool_call_id: None,
            },
            ArchivedTurn::ToolResult { content, timestamp, tool_call_id } => JsonTurn {
                role: "tool".to_string(),
                content: content.clone(),
                timestamp: *timestamp,
                tool_calls: None,
                tool_call_id: tool_call_id.clone(),
            },
        })
        .collect();

    let data = ArchiveMetadataJson {
        conversation_id: archive.conversation_id.clone(),
        session_key: archive.session_key.clone(),
        workspace_name: archive.workspace_name.clone(),
        started_at: archive.started_at,
        ended_at: archive.ended_at,
        message_count: archive.message_count,
        summary: archive.summary.clone(),
        tags: archive.tags.clone(),
        messages,
    };

    serde_json::to_string_pretty(&data).expect("archive metadata is always serializable")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn archive_writes_markdown_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let archiver = ConversationArchiver::new(dir.path(), "test-workspace").await.unwrap();

        let transcript = vec![
            ArchivedTurn::User {
                content: "hello".into(),
                timestamp: Utc::now(),
            },
            ArchivedTurn::Agent {
                content: "hi there".into(),
                timestamp: Utc::now(),
                tool_calls: vec![],
            },
        ];

        let archive = archiver
            .archive("telegram:1", "conv_test", &transcript, None, vec!["manual".into()])
            .await
            .unwrap()
            .unwrap();

        assert!(archive.markdown_path.exists());
        assert!(archive.json_path.exists());
        assert_eq!(archive.message_count, 2);
    }

    #[tokio::test]
    async fn empty_transcript_is_not_archived() {
        let dir = tempfile::tempdir().unwrap();
        let archiver = ConversationArchiver::new(dir.path(), "test-workspace").await.unwrap();
        let result = archiver.archive("telegram:1", "conv_test", &[], None, vec![]).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn list_archives_sorted_most_recent_first() {
        let dir = tempfile::tempdir().unwrap();
        let archiver = ConversationArchiver::new(dir.path(), "test-workspace").await.unwrap();
        let transcript = vec![ArchivedTurn::User {
            content: "hi".into(),
            timestamp: Utc::now(),
        }];

        archiver.archive("s1", "conv_a", &transcript, None, vec![]).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        archiver.archive("s1", "conv_b", &transcript, None, vec![]).await.unwrap();

        let archives = archiver.list_archives(10).await;
        assert_eq!(archives.len(), 2);
        assert_eq!(archives[0].conversation_id, "conv_b");
    }
}

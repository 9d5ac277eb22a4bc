// Copyright (c) 2026 Warden Contributors
//
// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub mime: Option<String>,
    pub url: Option<String>,
}

/// An immutable inbound or outbound message. `session_key` has the form
/// `"<channelName>:<chatId>"` and is the sharding unit for every other
/// component in this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub channel: String,
    pub session_key: String,
    pub user_id: String,
    pub content: String,
    pub direction: Direction,
    pub timestamp: DateTime<Utc>,
    pub reply_to_id: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl Message {
    pub fn inbound(channel: &str, session_key: &str, user_id: &str, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            channel: channel.to_string(),
            session_key: session_key.to_string(),
            user_id: user_id.to_string(),
            content: content.into(),
            direction: Direction::Inbound,
            timestamp: Utc::now(),
            reply_to_id: None,
            metadata: HashMap::new(),
            attachments: Vec::new(),
        }
    }
}

/// Build `"name:part1:part2"`, the session-key / thread-id convention used
/// throughout this crate.
pub fn build_session_key(parts: &[&str]) -> String {
    parts.join(":")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_message_has_unique_id() {
        let a = Message::inbound("telegram", "telegram:1", "u1", "hi");
        let b = Message::inbound("telegram", "telegram:1", "u1", "hi");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn build_session_key_joins_with_colon() {
        assert_eq!(build_session_key(&["telegram", "1"]), "telegram:1");
    }
}

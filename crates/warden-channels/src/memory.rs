// Copyright (c) 2026 Warden Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::any::Any;
#[cfg(test)]
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::{ApprovalHandler, Channel, InboundMessage, MessageHandler, SendOptions, SentMessage};

/// An outbound send captured by [`MemoryChannel`] for test assertions.
#[derive(Debug, Clone)]
pub struct Sent {
    pub session_key: String,
    pub content: String,
}

/// An in-memory `Channel` test double. Records every send instead of
/// talking to a real transport; used by `warden-core` and `warden-runtime`
/// tests that need a `Channel` without standing up Telegram/Discord.
#[derive(Default)]
pub struct MemoryChannel {
    name: String,
    sent: Mutex<Vec<Sent>>,
    message_handler: Mutex<Option<MessageHandler>>,
    approval_handler: Mutex<Option<ApprovalHandler>>,
}

impl MemoryChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sent: Mutex::new(Vec::new()),
            message_handler: Mutex::new(None),
            approval_handler: Mutex::new(None),
        }
    }

    pub fn sent_messages(&self) -> Vec<Sent> {
        self.sent.lock().expect("memory channel mutex poisoned").clone()
    }

    pub fn last_sent(&self) -> Option<Sent> {
        self.sent.lock().expect("memory channel mutex poisoned").last().cloned()
    }

    /// Drive the registered [`MessageHandler`] as if `message` had just
    /// arrived over the wire. Test-only entry point standing in for a real
    /// transport's polling loop or webhook handler.
    pub async fn simulate_inbound(&self, message: InboundMessage) {
        let handler = self.message_handler.lock().expect("memory channel mutex poisoned").clone();
        if let Some(handler) = handler {
            handler(message).await;
        }
    }

    /// Drive the registered [`ApprovalHandler`] as if the channel's own UI
    /// had just resolved `approval_id`.
    pub async fn simulate_approval(&self, approval_id: impl Into<String>, approved: bool) {
        let handler = self.approval_handler.lock().expect("memory channel mutex poisoned").clone();
        if let Some(handler) = handler {
            handler(approval_id.into(), approved).await;
        }
    }
}

#[async_trait]
impl Channel for MemoryChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_message(&self, handler: MessageHandler) {
        *self.message_handler.lock().expect("memory channel mutex poisoned") = Some(handler);
    }

    async fn on_approval(&self, handler: ApprovalHandler) {
        *self.approval_handler.lock().expect("memory channel mutex poisoned") = Some(handler);
    }

    async fn send_message(&self, session_key: &str, content: &str, _opts: SendOptions) -> anyhow::Result<SentMessage> {
        let id = uuid::Uuid::new_v4().to_string();
        self.sent.lock().expect("memory channel mutex poisoned").push(Sent {
            session_key: session_key.to_string(),
            content: content.to_string(),
        });
        Ok(SentMessage {
            id,
            session_key: session_key.to_string(),
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_sent_messages() {
        let channel = MemoryChannel::new("test");
        channel.send_message("test:1", "hello", SendOptions::default()).await.unwrap();
        channel.send_message("test:1", "world", SendOptions::default()).await.unwrap();

        let sent = channel.sent_messages();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].content, "hello");
        assert_eq!(sent[1].content, "world");
    }

    #[tokio::test]
    async fn send_approval_request_formats_default_message() {
        let channel = MemoryChannel::new("test");
        channel
            .send_approval_request("test:1", "abcd1234", "shell", &Value::Null, true)
            .await
            .unwrap();
        let sent = channel.last_sent().unwrap();
        assert!(sent.content.contains("Approval required: shell"));
        assert!(sent.content.contains("abcd1234"));
    }

    #[tokio::test]
    async fn file_capability_absent_by_default() {
        let channel = MemoryChannel::new("test");
        assert!(channel.as_file_capable().is_none());
    }

    #[tokio::test]
    async fn on_message_handler_receives_simulated_inbound() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let channel = MemoryChannel::new("test");
        let received = Arc::new(AtomicBool::new(false));
        let received_handler = received.clone();
        channel
            .on_message(Arc::new(move |msg: InboundMessage| {
                let received = received_handler.clone();
                Box::pin(async move {
                    assert_eq!(msg.content, "hi there");
                    received.store(true, Ordering::SeqCst);
                })
            }))
            .await;

        channel
            .simulate_inbound(InboundMessage {
                channel: "test".to_string(),
                session_key: "test:1".to_string(),
                user_id: "u1".to_string(),
                content: "hi there".to_string(),
            })
            .await;

        assert!(received.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn on_approval_handler_receives_simulated_resolution() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let channel = MemoryChannel::new("test");
        let resolved = Arc::new(AtomicBool::new(false));
        let resolved_handler = resolved.clone();
        channel
            .on_approval(Arc::new(move |approval_id: String, approved: bool| {
                let resolved = resolved_handler.clone();
                Box::pin(async move {
                    assert_eq!(approval_id, "abcd1234");
                    assert!(approved);
                    resolved.store(true, Ordering::SeqCst);
                })
            }))
            .await;

        channel.simulate_approval("abcd1234", true).await;
        assert!(resolved.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn no_handler_registered_is_a_silent_noop() {
        let channel = MemoryChannel::new("test");
        channel
            .simulate_inbound(InboundMessage {
                channel: "test".to_string(),
                session_key: "test:1".to_string(),
                user_id: "u1".to_string(),
                content: "hi".to_string(),
            })
            .await;
        channel.simulate_approval("abcd1234", false).await;
    }
}

// Copyright (c) 2026 Warden Contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Channel adapter contract: the boundary the core turn loop sends through
//! and receives from. Concrete transports (Telegram, Discord, ...) are out
//! of scope; this crate holds the trait, the optional file-sending
//! capability, framework command parsing, and an in-memory test double.
mod commands;
mod memory;

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;

pub use commands::{parse_command, Command};
pub use memory::MemoryChannel;

/// A transport-agnostic inbound event, handed to a registered
/// [`MessageHandler`]. Primitive fields only, for the same reason
/// [`SentMessage`] is primitive: this crate never depends on `warden-core`.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub channel: String,
    pub session_key: String,
    pub user_id: String,
    pub content: String,
}

/// Callback a [`Channel`] invokes for every inbound message it receives from
/// its transport. Registered once via [`Channel::on_message`]; the runtime
/// wires this to `QueueManager::submit`.
pub type MessageHandler = Arc<dyn Fn(InboundMessage) -> BoxFuture<'static, ()> + Send + Sync>;

/// Callback a [`Channel`] invokes when its own UI resolves a pending
/// approval (e.g. an inline button), carrying the approval id and whether it
/// was approved. Registered once via [`Channel::on_approval`]; the runtime
/// wires this to `ApprovalGate::resolve`.
pub type ApprovalHandler = Arc<dyn Fn(String, bool) -> BoxFuture<'static, ()> + Send + Sync>;

/// What sending a message back to a channel yields: enough for a caller to
/// log or correlate, without pulling in `warden-core`'s richer `Message`
/// type and creating a dependency cycle.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub id: String,
    pub session_key: String,
}

/// Extra, channel-specific send options. Kept as a small struct rather than
/// a generic `**kwargs` bag so implementations don't need to parse an
/// untyped map for the handful of flags that matter.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    pub reply_to_id: Option<String>,
    pub silent: bool,
}

/// A transport this runtime can send to and receive from. Implementations
/// own protocol adaptation, allowlisting, and (optionally) native command
/// registration; everything here operates on primitive session keys and
/// content so this crate never needs to depend on `warden-core`.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    async fn start(&self) -> anyhow::Result<()>;

    async fn stop(&self) -> anyhow::Result<()>;

    /// Register the callback invoked for every inbound message this
    /// transport receives. Implementations store the handler and invoke it
    /// from whatever polling loop or webhook handler reads the wire.
    async fn on_message(&self, handler: MessageHandler);

    /// Register the callback invoked when this transport's own UI resolves
    /// a pending approval (e.g. an inline "Approve"/"Deny" button), as
    /// opposed to a user typing `/approve <id>` as ordinary message text.
    async fn on_approval(&self, handler: ApprovalHandler);

    async fn send_message(&self, session_key: &str, content: &str, opts: SendOptions) -> anyhow::Result<SentMessage>;

    async fn send_approval_request(
        &self,
        session_key: &str,
        approval_id: &str,
        tool_name: &str,
        tool_args: &Value,
        show_args: bool,
    ) -> anyhow::Result<()> {
        let mut message = format!("Approval required: {tool_name}\n");
        if show_args {
            let mut args_str = tool_args.to_string();
            if args_str.len() > 500 {
                args_str.truncate(500);
                args_str.push_str("...");
            }
            message.push_str(&format!("Arguments: {args_str}\n"));
        }
        message.push_str(&format!("\nApproval ID: {approval_id}\nReply /approve or /deny to this request."));
        self.send_message(session_key, &message, SendOptions::default()).await?;
        Ok(())
    }

    /// Downcast target for the optional [`FileCapableChannel`] capability.
    /// Implementations that support file sending override this to return
    /// `self`; the default returns `None`, matching the reference's
    /// `hasattr`-style capability check.
    fn as_file_capable(&self) -> Option<&dyn FileCapableChannel> {
        None
    }

    fn as_any(&self) -> &dyn Any;

    fn build_session_key(&self, parts: &[&str]) -> String {
        let mut key = self.name().to_string();
        for part in parts {
            key.push(':');
            key.push_str(part);
        }
        key
    }
}

/// Optional capability a [`Channel`] may additionally implement. Modeled as
/// a second trait rather than a default-erroring method on `Channel`
/// itself, per the capability-trait pattern this runtime uses for
/// polymorphic transports and tools alike.
#[async_trait]
pub trait FileCapableChannel: Send + Sync {
    async fn send_file(
        &self,
        session_key: &str,
        file_data: &[u8],
        filename: &str,
        mime_type: Option<&str>,
        caption: Option<&str>,
    ) -> anyhow::Result<()>;
}

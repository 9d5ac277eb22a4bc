// Copyright (c) 2026 Warden Contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Per-workspace runtime core: the multi-lane message queue, the
//! tool-execution middleware chain, session/conversation lifecycle, the
//! approval gate, and the turn loop that ties them together. Channel
//! transports and the LLM call itself are external collaborators consumed
//! through the [`warden_channels::Channel`] and [`agent_runner::AgentRunner`]
//! traits.
pub mod agent_runner;
pub mod approval;
pub mod archive;
pub mod message;
pub mod message_processor;
pub mod middleware;
pub mod prompts;
pub mod queue;
pub mod session;

pub use agent_runner::{AgentRunError, AgentRunner, FollowupRequest, RunMetrics, TurnAccount, TurnOutcome};
pub use approval::{ApprovalGate, PendingApproval};
pub use archive::{ArchivedToolCall, ArchivedTurn, ArchiveError, ConversationArchive, ConversationArchiver};
pub use message::{build_session_key, Attachment, Direction, Message};
pub use message_processor::MessageProcessor;
pub use middleware::{MiddlewareChain, MiddlewareContext, MiddlewareSignal};
pub use queue::{LaneQueue, LaneStats, QueueItem, QueueManager, SummarizeHook};
pub use session::{SessionError, SessionManager, SessionState};

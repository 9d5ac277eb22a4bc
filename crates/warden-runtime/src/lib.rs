// Copyright (c) 2026 Warden Contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Cross-cutting workspace machinery that sits above the turn loop:
//! sub-agent orchestration, time-driven scheduling, and the startup/shutdown
//! sequence tying every subsystem together. [`warden_core`] owns one turn;
//! this crate owns what happens around and between turns.
pub mod factory;
pub mod lifecycle;
pub mod scheduler;
pub mod subagent;

pub use factory::AgentFactory;
pub use lifecycle::LifecycleManager;
pub use scheduler::{CronError, CronJob, CronScheduler, HeartbeatError, HeartbeatScheduler, SystemEventSink};
pub use subagent::{SubAgentError, SubAgentRequest, SubAgentResultSink, SubAgentRunner, SubAgentStatus, SubAgentStore};

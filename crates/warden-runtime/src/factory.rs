// Copyright (c) 2026 Warden Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use warden_core::AgentRunner;

/// Builds a fresh, stateless [`AgentRunner`] on demand: no checkpointer, no
/// middleware chain, a clean conversation every time. Sub-agents, cron jobs,
/// and heartbeat checks all run through one of these rather than the
/// workspace's main conversational runner.
pub trait AgentFactory: Send + Sync {
    fn create(&self) -> Arc<dyn AgentRunner>;
}

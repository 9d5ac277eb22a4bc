// Copyright (c) 2026 Warden Contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Time- and interval-driven agent runs, section 4.7. Both the cron
//! scheduler and the heartbeat scheduler share the same shape: a timer
//! fires, a fresh stateless agent runs a fixed prompt, and the result is
//! routed either straight to a channel or back into the workspace's own
//! message queue as a system event.
mod cron;
mod heartbeat;

pub use cron::{CronError, CronJob, CronScheduler};
pub use heartbeat::{HeartbeatError, HeartbeatScheduler};

use async_trait::async_trait;

/// Delivers a scheduled run's result into the session's own queue as a
/// steer-ineligible system event, for the `delivery = agent` / `both` case.
/// Implemented by whatever owns the workspace's `QueueManager`.
#[async_trait]
pub trait SystemEventSink: Send + Sync {
    async fn deliver(&self, session_key: &str, content: String);
}

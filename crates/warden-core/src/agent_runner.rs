// Copyright (c) 2026 Warden Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::approval::PendingApproval;
use crate::archive::ArchivedTurn;
use crate::message::Message;

#[derive(Debug, Error)]
pub enum AgentRunError {
    #[error("agent run failed: {0}")]
    Failed(#[from] anyhow::Error),
}

/// Turn accounting for a thread, backing [`AgentRunner::context_info`] and
/// the auto-compact trigger check in the message-processing loop.
#[derive(Debug, Clone, Copy)]
pub struct TurnAccount {
    pub message_count: usize,
    pub approx_tokens: usize,
    pub max_input_tokens: usize,
    pub schema_overhead: usize,
    pub calibration_factor: f32,
    pub cache_read_total: u64,
    pub cache_write_total: u64,
}

impl TurnAccount {
    /// `(approx_tokens + schema_overhead) * calibration_factor / max_input_tokens`,
    /// clamped to `0.0` when `max_input_tokens == 0` rather than dividing by
    /// zero.
    pub fn utilization(&self) -> f32 {
        if self.max_input_tokens == 0 {
            return 0.0;
        }
        ((self.approx_tokens + self.schema_overhead) as f32 * self.calibration_factor) / self.max_input_tokens as f32
    }
}

/// Reported after every run for usage-based billing/logging.
#[derive(Debug, Clone, Copy)]
pub struct RunMetrics {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub duration: Duration,
}

/// A self-initiated continuation request the agent can raise mid-turn (the
/// `request_followup` tool). Consumed once via
/// [`AgentRunner::take_followup_request`] after a `Completed` run.
#[derive(Debug, Clone)]
pub enum FollowupRequest {
    Immediate(String),
    Delayed { prompt: String, delay: Duration },
}

/// The outcome of one `AgentRunner::run` call. `ApprovalRequired` and
/// `Interrupted` replace the reference implementation's control-flow
/// exceptions: the turn loop in [`crate::message_processor`] matches on this
/// instead of catching.
#[derive(Debug)]
pub enum TurnOutcome {
    Completed(String),
    ApprovalRequired(PendingApproval),
    Interrupted(Vec<(String, Message)>),
}

/// The external boundary this crate calls into to actually run an LLM turn.
/// A concrete implementation binds a model, tool set, system prompt,
/// checkpointer, and the tool-middleware chain into one callable.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn run(&self, input: &str, thread_id: &str) -> Result<TurnOutcome, AgentRunError>;

    async fn context_info(&self, thread_id: &str) -> TurnAccount;

    /// Read back the full transcript for a thread from the checkpointer, for
    /// archival. `warden-core` never touches the checkpointer directly —
    /// this is the same boundary `AgentRunner::run` crosses, extended to
    /// cover the read side.
    async fn history(&self, thread_id: &str) -> Result<Vec<ArchivedTurn>, AgentRunError>;

    fn last_metrics(&self) -> Option<RunMetrics>;

    /// Take and clear any followup request raised during the most recent
    /// `Completed` run.
    fn take_followup_request(&self) -> Option<FollowupRequest>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(approx_tokens: usize, schema_overhead: usize, max_input_tokens: usize) -> TurnAccount {
        TurnAccount {
            message_count: 1,
            approx_tokens,
            max_input_tokens,
            schema_overhead,
            calibration_factor: 1.0,
            cache_read_total: 0,
            cache_write_total: 0,
        }
    }

    #[test]
    fn utilization_computes_ratio() {
        let turn = account(800, 200, 1000);
        assert_eq!(turn.utilization(), 1.0);
    }

    #[test]
    fn utilization_is_zero_when_max_input_tokens_is_zero() {
        let turn = account(800, 200, 0);
        assert_eq!(turn.utilization(), 0.0);
    }

    #[test]
    fn utilization_applies_calibration_factor() {
        let mut turn = account(500, 0, 1000);
        turn.calibration_factor = 1.5;
        assert_eq!(turn.utilization(), 0.75);
    }
}

// Copyright (c) 2026 Warden Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use chrono_tz::Tz;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use warden_channels::{Channel, SendOptions};
use warden_config::{CronJobConfig, DeliveryMode};
use warden_core::TurnOutcome;

use crate::factory::AgentFactory;
use crate::scheduler::SystemEventSink;

#[derive(Debug, Error)]
pub enum CronError {
    #[error("invalid cron expression '{expr}' for job '{job}': {source}")]
    InvalidSchedule { job: String, expr: String, source: cron::error::Error },
    #[error("invalid timezone '{0}'")]
    InvalidTimezone(String),
}

/// A resolved cron job: the five-field expression parsed once into a
/// `cron::Schedule` (seconds-prefixed with `0` since the `cron` crate's
/// grammar includes a leading seconds field that this runtime's jobs never
/// use), and the timezone it evaluates against.
pub struct CronJob {
    pub name: String,
    schedule: cron::Schedule,
    pub prompt: String,
    timezone: Tz,
    pub delivery: DeliveryMode,
    pub target_channel: Option<String>,
    pub target_chat_id: Option<String>,
}

impl CronJob {
    pub fn from_config(job: &CronJobConfig, workspace_timezone: &str) -> Result<Self, CronError> {
        let expr = format!("0 {}", job.schedule);
        let schedule = cron::Schedule::from_str(&expr).map_err(|source| CronError::InvalidSchedule {
            job: job.name.clone(),
            expr: job.schedule.clone(),
            source,
        })?;
        let tz_str = job.timezone.as_deref().unwrap_or(workspace_timezone);
        let timezone: Tz = tz_str.parse().map_err(|_| CronError::InvalidTimezone(tz_str.to_string()))?;
        Ok(Self {
            name: job.name.clone(),
            schedule,
            prompt: job.prompt.clone(),
            timezone,
            delivery: job.delivery,
            target_channel: job.target_channel.clone(),
            target_chat_id: job.target_chat_id.clone(),
        })
    }

    fn next_fire(&self) -> Option<chrono::DateTime<Utc>> {
        self.schedule.upcoming(self.timezone).next().map(|dt| dt.with_timezone(&Utc))
    }
}

/// Drives named cron jobs (section 4.7) plus ad-hoc one-shot delayed
/// followups (section 4.4's `request_followup(delay>0)`), both routed
/// through the same channel/agent delivery split as the heartbeat scheduler.
pub struct CronScheduler {
    workspace_name: String,
    factory: Arc<dyn AgentFactory>,
    channels: HashMap<String, Arc<dyn Channel>>,
    sink: Arc<dyn SystemEventSink>,
    jobs: Vec<Arc<CronJob>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl CronScheduler {
    pub fn new(
        workspace_name: impl Into<String>,
        jobs: Vec<CronJob>,
        factory: Arc<dyn AgentFactory>,
        channels: HashMap<String, Arc<dyn Channel>>,
        sink: Arc<dyn SystemEventSink>,
    ) -> Self {
        Self {
            workspace_name: workspace_name.into(),
            factory,
            channels,
            sink,
            jobs: jobs.into_iter().map(Arc::new).collect(),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub async fn start(self: &Arc<Self>) {
        let mut handles = self.handles.lock().await;
        for job in &self.jobs {
            let this = Arc::clone(self);
            let job = Arc::clone(job);
            handles.push(tokio::spawn(async move { this.run_job_loop(job).await }));
        }
        info!(workspace = %self.workspace_name, jobs = self.jobs.len(), "cron scheduler started");
    }

    pub async fn stop(&self) {
        let mut handles = self.handles.lock().await;
        for handle in handles.drain(..) {
            handle.abort();
        }
        info!(workspace = %self.workspace_name, "cron scheduler stopped");
    }

    async fn run_job_loop(&self, job: Arc<CronJob>) {
        loop {
            let Some(fire_at) = job.next_fire() else {
                warn!(job = %job.name, "cron job has no future fire time, stopping");
                return;
            };
            let wait = (fire_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::time::sleep(wait).await;
            self.run_once(&job).await;
        }
    }

    async fn run_once(&self, job: &CronJob) {
        info!(job = %job.name, "running cron job");
        let agent = self.factory.create();
        let response = match agent.run(&job.prompt, &format!("cron:{}", job.name)).await {
            Ok(TurnOutcome::Completed(text)) => text,
            Ok(other) => {
                warn!(job = %job.name, outcome = ?other, "cron job produced an unexpected control-flow outcome");
                return;
            }
            Err(err) => {
                error!(job = %job.name, %err, "cron job run failed");
                return;
            }
        };

        let deliver_to_channel = matches!(job.delivery, DeliveryMode::Channel | DeliveryMode::Both);
        let deliver_to_agent = matches!(job.delivery, DeliveryMode::Agent | DeliveryMode::Both);

        let session_key = match (&job.target_channel, &job.target_chat_id) {
            (Some(channel_name), Some(chat_id)) => self
                .channels
                .get(channel_name)
                .map(|channel| channel.build_session_key(&[chat_id])),
            _ => None,
        };

        if deliver_to_channel {
            match (&job.target_channel, &session_key) {
                (Some(channel_name), Some(session_key)) => {
                    if let Some(channel) = self.channels.get(channel_name) {
                        if let Err(err) = channel.send_message(session_key, &response, SendOptions::default()).await {
                            error!(job = %job.name, %err, "failed to send cron job result");
                        }
                    }
                }
                _ => warn!(job = %job.name, "cron job result generated but no channel routing configured"),
            }
        }

        if deliver_to_agent {
            if let Some(session_key) = &session_key {
                self.sink.deliver(session_key, response).await;
            }
        }
    }

    /// Schedule a one-shot delayed followup (section 4.4): after `delay`, the
    /// prompt is injected straight back into `session_key`'s own queue as a
    /// system event. No fresh agent run happens here — the existing
    /// conversation picks it up on its next turn, same as the immediate
    /// followup path in `MessageProcessor`.
    pub fn schedule_followup(self: &Arc<Self>, session_key: impl Into<String>, prompt: impl Into<String>, delay: Duration) {
        let this = Arc::clone(self);
        let session_key = session_key.into();
        let prompt = prompt.into();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.sink.deliver(&session_key, prompt).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::Mutex as AsyncMutex;
    use warden_channels::MemoryChannel;
    use warden_core::{AgentRunError, ArchivedTurn, FollowupRequest, RunMetrics, TurnAccount};

    struct ConstRunner(String);

    #[async_trait]
    impl warden_core::AgentRunner for ConstRunner {
        async fn run(&self, _input: &str, _thread_id: &str) -> Result<TurnOutcome, AgentRunError> {
            Ok(TurnOutcome::Completed(self.0.clone()))
        }
        async fn context_info(&self, _thread_id: &str) -> TurnAccount {
            unreachable!()
        }
        async fn history(&self, _thread_id: &str) -> Result<Vec<ArchivedTurn>, AgentRunError> {
            Ok(Vec::new())
        }
        fn last_metrics(&self) -> Option<RunMetrics> {
            None
        }
        fn take_followup_request(&self) -> Option<FollowupRequest> {
            None
        }
    }

    struct ConstFactory(String);
    impl AgentFactory for ConstFactory {
        fn create(&self) -> Arc<dyn warden_core::AgentRunner> {
            Arc::new(ConstRunner(self.0.clone()))
        }
    }

    struct RecordingSink {
        delivered: AsyncMutex<Vec<(String, String)>>,
    }
    impl RecordingSink {
        fn new() -> Self {
            Self { delivered: AsyncMutex::new(Vec::new()) }
        }
    }
    #[async_trait]
    impl SystemEventSink for RecordingSink {
        async fn deliver(&self, session_key: &str, content: String) {
            self.delivered.lock().await.push((session_key.to_string(), content));
        }
    }

    fn job_config(schedule: &str) -> CronJobConfig {
        CronJobConfig {
            name: "daily-digest".to_string(),
            schedule: schedule.to_string(),
            prompt: "summarize open PRs".to_string(),
            timezone: None,
            delivery: DeliveryMode::Channel,
            target_channel: Some("test".to_string()),
            target_chat_id: Some("1".to_string()),
        }
    }

    #[test]
    fn from_config_parses_five_field_expression() {
        let job = CronJob::from_config(&job_config("0 9 * * *"), "UTC").unwrap();
        assert!(job.next_fire().is_some());
    }

    #[test]
    fn from_config_rejects_malformed_expression() {
        let result = CronJob::from_config(&job_config("not a cron"), "UTC");
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn run_once_routes_response_to_target_channel() {
        let channel = Arc::new(MemoryChannel::new("test"));
        let mut channels: HashMap<String, Arc<dyn Channel>> = HashMap::new();
        channels.insert("test".to_string(), channel.clone());

        let job = CronJob::from_config(&job_config("0 9 * * *"), "UTC").unwrap();
        let scheduler = Arc::new(CronScheduler::new(
            "ws",
            vec![job],
            Arc::new(ConstFactory("3 PRs open".to_string())),
            channels,
            Arc::new(RecordingSink::new()),
        ));

        scheduler.run_once(&scheduler.jobs[0]).await;
        let sent = channel.sent_messages();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].content, "3 PRs open");
    }

    #[tokio::test]
    async fn schedule_followup_delivers_after_delay() {
        let sink = Arc::new(RecordingSink::new());
        let scheduler = Arc::new(CronScheduler::new(
            "ws",
            Vec::new(),
            Arc::new(ConstFactory("unused".to_string())),
            HashMap::new(),
            sink.clone(),
        ));

        scheduler.schedule_followup("telegram:1", "remember to check in", Duration::from_millis(10));

        for _ in 0..50 {
            if !sink.delivered.lock().await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let delivered = sink.delivered.lock().await;
        assert_eq!(delivered[0], ("telegram:1".to_string(), "remember to check in".to_string()));
    }
}

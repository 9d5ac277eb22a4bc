// Copyright (c) 2026 Warden Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveTime;
use chrono_tz::Tz;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use warden_channels::{Channel, SendOptions};
use warden_config::{DeliveryMode, HeartbeatConfig};
use warden_core::TurnOutcome;

use crate::factory::AgentFactory;
use crate::scheduler::SystemEventSink;

const HEARTBEAT_PROMPT: &str = "[HEARTBEAT CHECK - {timestamp}]\n\n\
Review your HEARTBEAT.md file for pending tasks. For each task, evaluate:\n\
- Is it time-sensitive and due now?\n\
- Does it require a status check (API call, file read)?\n\
- Should the user be notified of any updates?\n\n\
If nothing requires immediate attention, respond exactly: HEARTBEAT_OK\n\n\
Otherwise, take appropriate action:\n\
- Check pending monitors (PRs, builds, deployments)\n\
- Update HEARTBEAT.md with any completed items\n\
- Notify the user of significant events\n\n\
Do NOT repeat previously completed tasks or invent new ones.\n";

#[derive(Debug, Error)]
pub enum HeartbeatError {
    #[error("invalid active_hours '{raw}': expected \"HH:MM-HH:MM\"")]
    InvalidActiveHours { raw: String },
    #[error("invalid timezone '{0}'")]
    InvalidTimezone(String),
}

fn parse_active_hours(raw: &str) -> Result<(NaiveTime, NaiveTime), HeartbeatError> {
    let invalid = || HeartbeatError::InvalidActiveHours { raw: raw.to_string() };
    let (start_str, end_str) = raw.split_once('-').ok_or_else(invalid)?;
    let start = NaiveTime::parse_from_str(start_str.trim(), "%H:%M").map_err(|_| invalid())?;
    let end = NaiveTime::parse_from_str(end_str.trim(), "%H:%M").map_err(|_| invalid())?;
    Ok((start, end))
}

/// Sends periodic heartbeat prompts to a fresh stateless agent for proactive
/// task evaluation, section 4.7. An `HEARTBEAT_OK` reply is suppressed from
/// channel output when `suppress_ok` is set.
pub struct HeartbeatScheduler {
    workspace_name: String,
    factory: Arc<dyn AgentFactory>,
    channels: HashMap<String, Arc<dyn Channel>>,
    sink: Arc<dyn SystemEventSink>,
    config: HeartbeatConfig,
    timezone: Tz,
    active_hours: Option<(NaiveTime, NaiveTime)>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl HeartbeatScheduler {
    pub fn new(
        workspace_name: impl Into<String>,
        factory: Arc<dyn AgentFactory>,
        channels: HashMap<String, Arc<dyn Channel>>,
        sink: Arc<dyn SystemEventSink>,
        config: HeartbeatConfig,
        timezone: &str,
    ) -> Result<Self, HeartbeatError> {
        let active_hours = config.active_hours.as_deref().map(parse_active_hours).transpose()?;
        let tz: Tz = timezone.parse().map_err(|_| HeartbeatError::InvalidTimezone(timezone.to_string()))?;
        Ok(Self {
            workspace_name: workspace_name.into(),
            factory,
            channels,
            sink,
            config,
            timezone: tz,
            active_hours,
            handle: Mutex::new(None),
        })
    }

    fn is_within_active_hours(&self) -> bool {
        let Some((start, end)) = self.active_hours else {
            return true;
        };
        let now = chrono::Utc::now().with_timezone(&self.timezone).time();
        if start <= end {
            start <= now && now <= end
        } else {
            now >= start || now <= end
        }
    }

    fn is_heartbeat_ok(response: &str) -> bool {
        response.to_uppercase().contains("HEARTBEAT_OK")
    }

    fn build_prompt(&self) -> String {
        let timestamp = chrono::Utc::now().with_timezone(&self.timezone).to_rfc3339();
        HEARTBEAT_PROMPT.replace("{timestamp}", &timestamp)
    }

    pub async fn start(self: &Arc<Self>) {
        if !self.config.enabled {
            info!(workspace = %self.workspace_name, "heartbeat scheduler disabled");
            return;
        }

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(this.config.interval_minutes * 60));
            interval.tick().await;
            loop {
                interval.tick().await;
                this.run_once().await;
            }
        });
        *self.handle.lock().await = Some(handle);
        info!(
            workspace = %self.workspace_name,
            interval_minutes = self.config.interval_minutes,
            active_hours = ?self.config.active_hours,
            "heartbeat scheduler started"
        );
    }

    pub async fn stop(&self) {
        if let Some(handle) = self.handle.lock().await.take() {
            handle.abort();
            info!(workspace = %self.workspace_name, "heartbeat scheduler stopped");
        }
    }

    async fn run_once(&self) {
        if !self.is_within_active_hours() {
            debug!(workspace = %self.workspace_name, "heartbeat skipped, outside active hours");
            return;
        }

        info!(workspace = %self.workspace_name, "running heartbeat check");
        let agent = self.factory.create();
        let prompt = self.build_prompt();
        let response = match agent.run(&prompt, "heartbeat").await {
            Ok(TurnOutcome::Completed(text)) => text,
            Ok(other) => {
                warn!(workspace = %self.workspace_name, outcome = ?other, "heartbeat produced an unexpected control-flow outcome");
                return;
            }
            Err(err) => {
                error!(workspace = %self.workspace_name, %err, "heartbeat check failed");
                return;
            }
        };

        if self.config.suppress_ok && Self::is_heartbeat_ok(&response) {
            debug!(workspace = %self.workspace_name, "heartbeat OK, suppressed");
            return;
        }

        self.route(response).await;
    }

    async fn route(&self, response: String) {
        let deliver_to_channel = matches!(self.config.delivery, DeliveryMode::Channel | DeliveryMode::Both);
        let deliver_to_agent = matches!(self.config.delivery, DeliveryMode::Agent | DeliveryMode::Both);

        if deliver_to_channel {
            match (&self.config.target_channel, &self.config.target_chat_id) {
                (Some(channel_name), Some(chat_id)) => match self.channels.get(channel_name) {
                    Some(channel) => {
                        let session_key = channel.build_session_key(&[chat_id]);
                        if let Err(err) = channel.send_message(&session_key, &response, SendOptions::default()).await {
                            error!(workspace = %self.workspace_name, %err, "failed to send heartbeat notification");
                        }
                    }
                    None => error!(workspace = %self.workspace_name, channel = channel_name, "heartbeat target channel not found"),
                },
                _ => warn!(workspace = %self.workspace_name, "heartbeat response generated but no channel routing configured"),
            }
        }

        if deliver_to_agent {
            if let (Some(channel_name), Some(chat_id)) = (&self.config.target_channel, &self.config.target_chat_id) {
                if let Some(channel) = self.channels.get(channel_name) {
                    let session_key = channel.build_session_key(&[chat_id]);
                    self.sink.deliver(&session_key, response).await;
                }
            }
        }
    }
}

// Copyright (c) 2026 Warden Contributors
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

fn default_true() -> bool {
    true
}

/// Top-level workspace configuration, assembled by [`crate::load`] from the
/// layered `config.yaml` / `agent.yaml` search path.
///
/// Every section is optional in the YAML source; fields missing entirely
/// fall back to their `Default` impl so a minimal workspace only needs to
/// specify `channel` and `model`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub lanes: LanesConfig,
    #[serde(default)]
    pub builtins: BuiltinsConfig,
    #[serde(default)]
    pub approval_gates: ApprovalGatesConfig,
    #[serde(default)]
    pub tool_timeouts: ToolTimeoutsConfig,
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    #[serde(default)]
    pub auto_compact: AutoCompactConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    /// IANA timezone identifier (e.g. `"America/Chicago"`). Governs heartbeat
    /// active-hours windows and timestamps written into archives.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub workspace_tools: WorkspaceToolsConfig,
    /// Scheduled cron jobs, section 4.7. Empty by default; a workspace opts
    /// in per job.
    #[serde(default)]
    pub crons: Vec<CronJobConfig>,
}

fn default_timezone() -> String {
    "UTC".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub provider: String,
    pub name: String,
    pub api_key: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    pub region: Option<String>,
    #[serde(default = "default_model_timeout_seconds")]
    pub timeout_seconds: u64,
    pub base_url: Option<String>,
    /// Free-form provider-specific options forwarded as-is to the driver.
    #[serde(default)]
    pub extra_body: serde_json::Value,
}

fn default_max_turns() -> u32 {
    200
}
fn default_model_timeout_seconds() -> u64 {
    120
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".into(),
            name: "claude-sonnet".into(),
            api_key: None,
            temperature: Some(0.2),
            max_turns: default_max_turns(),
            region: None,
            timeout_seconds: default_model_timeout_seconds(),
            base_url: None,
            extra_body: serde_json::Value::Null,
        }
    }
}

/// Channel transport configuration. `type_` names which registered
/// [`warden_channels::Channel`] implementation to construct.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(rename = "type", default)]
    pub type_: String,
    pub token: Option<String>,
    #[serde(default)]
    pub allowed_users: Vec<String>,
    #[serde(default)]
    pub allowed_groups: Vec<String>,
    #[serde(default)]
    pub allow_all: bool,
}

/// Session queue defaults, per section 4.2. A session may override its own
/// mode/debounce/cap/drop_policy at runtime via `/queue`; these are the
/// starting values for every newly-seen session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default)]
    pub mode: QueueMode,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_cap")]
    pub cap: usize,
    #[serde(default)]
    pub drop_policy: DropPolicy,
}

fn default_debounce_ms() -> u64 {
    1000
}
fn default_cap() -> usize {
    20
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            mode: QueueMode::default(),
            debounce_ms: default_debounce_ms(),
            cap: default_cap(),
            drop_policy: DropPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueMode {
    #[default]
    Collect,
    Steer,
    Followup,
    Interrupt,
    SteerBacklog,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DropPolicy {
    Old,
    New,
    #[default]
    Summarize,
}

/// Per-lane concurrency caps (section 4.1). Unknown lane names used at
/// runtime default to a cap of 1, matching the lazily-created-lane contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanesConfig {
    #[serde(default = "default_main_concurrency")]
    pub main: usize,
    #[serde(default = "default_subagent_concurrency")]
    pub subagent: usize,
    #[serde(default = "default_cron_concurrency")]
    pub cron: usize,
}

fn default_main_concurrency() -> usize {
    4
}
fn default_subagent_concurrency() -> usize {
    8
}
fn default_cron_concurrency() -> usize {
    2
}

impl Default for LanesConfig {
    fn default() -> Self {
        Self {
            main: default_main_concurrency(),
            subagent: default_subagent_concurrency(),
            cron: default_cron_concurrency(),
        }
    }
}

/// Workspace-tool allow/deny lists. Entries may name an individual tool or a
/// `group:name` to match a whole registered capability group; per-builtin
/// free-form config is forwarded to the tool at construction time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuiltinsConfig {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
    #[serde(default)]
    pub config: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceToolsConfig {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
}

/// Approval-gate configuration, consumed by `warden_core::approval` and
/// `warden_tools::policy`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalGatesConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_approval_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub default_action: DefaultAction,
    #[serde(default)]
    pub tools: HashMap<String, ToolApprovalConfig>,
}

fn default_approval_timeout_seconds() -> u64 {
    300
}

impl Default for ApprovalGatesConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_seconds: default_approval_timeout_seconds(),
            default_action: DefaultAction::default(),
            tools: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultAction {
    #[default]
    Deny,
    Approve,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolApprovalConfig {
    #[serde(default = "default_true")]
    pub require_approval: bool,
    #[serde(default = "default_true")]
    pub show_args: bool,
}

/// Per-call tool timeout, section 4.3 item 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolTimeoutsConfig {
    #[serde(default = "default_tool_timeout_seconds")]
    pub default_seconds: u64,
    #[serde(default)]
    pub overrides: HashMap<String, u64>,
}

fn default_tool_timeout_seconds() -> u64 {
    120
}

impl Default for ToolTimeoutsConfig {
    fn default() -> Self {
        Self {
            default_seconds: default_tool_timeout_seconds(),
            overrides: HashMap::new(),
        }
    }
}

/// Heartbeat scheduler configuration, section 4.7.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_heartbeat_interval_minutes")]
    pub interval_minutes: u64,
    /// `"HH:MM-HH:MM"`; `None` means always active. A range where start >
    /// end spans midnight (e.g. `"22:00-08:00"`).
    #[serde(default)]
    pub active_hours: Option<String>,
    #[serde(default = "default_true")]
    pub suppress_ok: bool,
    pub target_channel: Option<String>,
    pub target_chat_id: Option<String>,
    #[serde(default)]
    pub delivery: DeliveryMode,
}

fn default_heartbeat_interval_minutes() -> u64 {
    30
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_minutes: default_heartbeat_interval_minutes(),
            active_hours: None,
            suppress_ok: true,
            target_channel: None,
            target_chat_id: None,
            delivery: DeliveryMode::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    #[default]
    Channel,
    Agent,
    Both,
}

/// One scheduled cron job, section 4.7. `schedule` is a standard five-field
/// cron expression evaluated against `timezone` (falling back to the
/// workspace timezone when unset).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronJobConfig {
    pub name: String,
    pub schedule: String,
    pub prompt: String,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub delivery: DeliveryMode,
    pub target_channel: Option<String>,
    pub target_chat_id: Option<String>,
}

/// Auto-compaction trigger, section 4.4.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoCompactConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_auto_compact_trigger")]
    pub trigger: f32,
}

fn default_auto_compact_trigger() -> f32 {
    0.8
}

impl Default for AutoCompactConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            trigger: default_auto_compact_trigger(),
        }
    }
}

/// Startup/shutdown user-facing notifications, section 4.8.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LifecycleConfig {
    #[serde(default)]
    pub notify_startup: bool,
    #[serde(default)]
    pub notify_shutdown: bool,
    #[serde(default)]
    pub notify_auto_compact: bool,
}

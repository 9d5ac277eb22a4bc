// Copyright (c) 2026 Warden Contributors
//
// SPDX-License-Identifier: Apache-2.0

/// Static notification shown in place of a tool's normal result while a
/// `steer` redirect is pending.
pub const STEER_SKIP_MESSAGE: &str = "[Skipped: user sent new message — redirecting]";

pub fn followup_template(depth: u32, prompt: &str) -> String {
    format!("[SYSTEM FOLLOWUP - depth {depth}]\n{prompt}")
}

pub fn tool_denied_template(tool_name: &str) -> String {
    format!("[SYSTEM] The tool '{tool_name}' was denied by the user. Do not retry this action.")
}

pub fn compacted_template(summary: &str) -> String {
    format!("[SYSTEM] Conversation compacted. Summary of prior context:\n\n{summary}")
}

pub const SUMMARIZE_PROMPT: &str =
    "Summarize this conversation so far in a way that preserves all information needed to continue it.";

pub fn subagent_timed_out_template(label: &str, timeout_minutes: u64) -> String {
    format!("[SYSTEM] Sub-agent '{label}' timed out after {timeout_minutes} minutes.")
}

pub fn subagent_failed_template(label: &str, error: &str) -> String {
    format!("[SYSTEM] Sub-agent '{label}' failed.\nError: {error}")
}

pub fn subagent_completed_template(label: &str, output: &str, request_id: &str) -> String {
    format!(
        "[SYSTEM] Sub-agent '{label}' completed.\n\n{output}\n\nUse get_subagent_result(id=\"{request_id}\") to read the full output."
    )
}

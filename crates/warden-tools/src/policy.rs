// Copyright (c) 2026 Warden Contributors
//
// SPDX-License-Identifier: Apache-2.0
use regex::Regex;
use warden_config::WorkspaceToolsConfig;

/// Whether a tool name may be loaded into a workspace's registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolAvailability {
    Allowed,
    Denied,
}

/// Maps `workspace_tools.{allow,deny}` glob patterns to a load/skip decision
/// for a given tool name. Deny beats allow on the same name. A `group:`
/// prefix matches against a literal group tag rather than the bare tool
/// name; group membership itself is assigned by the tool registry, not this
/// policy, so a `group:` pattern here is matched verbatim against whatever
/// tag the caller passes alongside the tool name.
#[derive(Debug)]
pub struct ToolPolicy {
    allow_patterns: Vec<Regex>,
    deny_patterns: Vec<Regex>,
    has_allow_list: bool,
}

impl ToolPolicy {
    pub fn from_config(cfg: &WorkspaceToolsConfig) -> Self {
        let compile = |patterns: &[String]| -> Vec<Regex> {
            patterns.iter().filter_map(|p| glob_to_regex(p)).collect()
        };
        Self {
            allow_patterns: compile(&cfg.allow),
            deny_patterns: compile(&cfg.deny),
            has_allow_list: !cfg.allow.is_empty(),
        }
    }

    /// Decide whether `name` (optionally tagged `group:name` by the caller)
    /// may be loaded.
    pub fn decide(&self, name: &str) -> ToolAvailability {
        if self.deny_patterns.iter().any(|re| re.is_match(name)) {
            return ToolAvailability::Denied;
        }
        if !self.has_allow_list {
            return ToolAvailability::Allowed;
        }
        if self.allow_patterns.iter().any(|re| re.is_match(name)) {
            ToolAvailability::Allowed
        } else {
            ToolAvailability::Denied
        }
    }
}

/// Convert a simple shell glob pattern to a [`Regex`]. Only `*` (match
/// anything) and `?` (match one char) are supported.
fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut re = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => {
                for esc in regex::escape(&c.to_string()).chars() {
                    re.push(esc);
                }
            }
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy_with(allow: &[&str], deny: &[&str]) -> ToolPolicy {
        ToolPolicy::from_config(&WorkspaceToolsConfig {
            allow: allow.iter().map(|s| s.to_string()).collect(),
            deny: deny.iter().map(|s| s.to_string()).collect(),
        })
    }

    #[test]
    fn empty_config_allows_everything() {
        let p = policy_with(&[], &[]);
        assert_eq!(p.decide("shell"), ToolAvailability::Allowed);
    }

    #[test]
    fn deny_beats_allow_for_same_name() {
        let p = policy_with(&["shell"], &["shell"]);
        assert_eq!(p.decide("shell"), ToolAvailability::Denied);
    }

    #[test]
    fn allow_list_excludes_unlisted_names() {
        let p = policy_with(&["read_file", "grep"], &[]);
        assert_eq!(p.decide("read_file"), ToolAvailability::Allowed);
        assert_eq!(p.decide("shell"), ToolAvailability::Denied);
    }

    #[test]
    fn deny_wildcard_blocks_group() {
        let p = policy_with(&[], &["group:destructive*"]);
        assert_eq!(p.decide("group:destructive"), ToolAvailability::Denied);
        assert_eq!(p.decide("group:readonly"), ToolAvailability::Allowed);
    }

    #[test]
    fn question_mark_matches_one_char() {
        let p = policy_with(&["tool?"], &[]);
        assert_eq!(p.decide("toolA"), ToolAvailability::Allowed);
        assert_eq!(p.decide("toolAB"), ToolAvailability::Denied);
    }
}

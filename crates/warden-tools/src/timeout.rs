// Copyright (c) 2026 Warden Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::time::Duration;
use warden_config::ToolTimeoutsConfig;

/// Resolve the per-call timeout for a tool, section 4.3 item 1: the
/// per-tool override in `overrides` wins, otherwise `default_seconds`.
pub fn timeout_for(cfg: &ToolTimeoutsConfig, tool_name: &str) -> Duration {
    let seconds = cfg
        .overrides
        .get(tool_name)
        .copied()
        .unwrap_or(cfg.default_seconds);
    Duration::from_secs(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn falls_back_to_default() {
        let cfg = ToolTimeoutsConfig {
            default_seconds: 120,
            overrides: HashMap::new(),
        };
        assert_eq!(timeout_for(&cfg, "shell"), Duration::from_secs(120));
    }

    #[test]
    fn override_wins() {
        let mut overrides = HashMap::new();
        overrides.insert("web_search".to_string(), 30);
        let cfg = ToolTimeoutsConfig {
            default_seconds: 120,
            overrides,
        };
        assert_eq!(timeout_for(&cfg, "web_search"), Duration::from_secs(30));
        assert_eq!(timeout_for(&cfg, "shell"), Duration::from_secs(120));
    }
}

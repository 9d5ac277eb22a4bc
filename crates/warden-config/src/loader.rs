// Copyright (c) 2026 Warden Contributors
//
// SPDX-License-Identifier: Apache-2.0
use crate::env::substitute_env_vars;
use crate::schema::Config;
use anyhow::{Context, Result};
use serde_yaml::Value;
use std::path::{Path, PathBuf};

/// Global config search locations, lowest priority first. A workspace's own
/// `agent.yaml` is layered on top of all of these by [`load`].
pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    paths.push(PathBuf::from("/etc/warden/config.yaml"));
    paths.push(PathBuf::from("/etc/warden/config.yml"));

    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".config/warden/config.yaml"));
        paths.push(home.join(".config/warden/config.yml"));
    }
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("warden/config.yaml"));
        paths.push(config_dir.join("warden/config.yml"));
    }

    paths
}

/// Load and deep-merge every layer into one [`Config`]: the global search
/// paths (lowest priority), then the workspace's `agent.yaml` (highest
/// priority) if it exists at `workspace_config_path`.
///
/// `${ENV_VAR}` substitution is applied to each layer individually, before
/// merging, so an unresolved reference's error names the file it came from.
pub fn load(workspace_config_path: Option<&Path>) -> Result<Config> {
    let mut merged = Value::Mapping(Default::default());

    for path in config_search_paths() {
        if let Ok(text) = std::fs::read_to_string(&path) {
            let mut value: Value = serde_yaml::from_str(&text)
                .with_context(|| format!("parsing {}", path.display()))?;
            substitute_env_vars(&mut value, &path.display().to_string())?;
            merge_yaml(&mut merged, value);
        }
    }

    if let Some(path) = workspace_config_path {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let mut value: Value =
            serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        substitute_env_vars(&mut value, &path.display().to_string())?;
        merge_yaml(&mut merged, value);
    }

    if matches!(&merged, Value::Mapping(m) if m.is_empty()) {
        return Ok(Config::default());
    }

    Ok(serde_yaml::from_value(merged).unwrap_or_default())
}

/// Recursively merge `src` into `dst`. Mappings merge key-by-key; any other
/// value (scalar, sequence) is replaced wholesale by `src`.
fn merge_yaml(dst: &mut Value, src: Value) {
    match (dst, src) {
        (Value::Mapping(dst_map), Value::Mapping(src_map)) => {
            for (key, value) in src_map {
                let entry = dst_map
                    .entry(key)
                    .or_insert_with(|| Value::Mapping(Default::default()));
                merge_yaml(entry, value);
            }
        }
        (dst, src) => {
            *dst = src;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_scalar_src_wins() {
        let mut dst: Value = serde_yaml::from_str("a: 1").unwrap();
        let src: Value = serde_yaml::from_str("a: 2").unwrap();
        merge_yaml(&mut dst, src);
        assert_eq!(dst["a"].as_i64(), Some(2));
    }

    #[test]
    fn merge_preserves_keys_not_in_src() {
        let mut dst: Value = serde_yaml::from_str("a: 1\nb: 2").unwrap();
        let src: Value = serde_yaml::from_str("a: 9").unwrap();
        merge_yaml(&mut dst, src);
        assert_eq!(dst["a"].as_i64(), Some(9));
        assert_eq!(dst["b"].as_i64(), Some(2));
    }

    #[test]
    fn merge_nested_tables() {
        let mut dst: Value = serde_yaml::from_str("channel:\n  type: telegram\n  token: a").unwrap();
        let src: Value = serde_yaml::from_str("channel:\n  token: b").unwrap();
        merge_yaml(&mut dst, src);
        assert_eq!(dst["channel"]["type"].as_str(), Some("telegram"));
        assert_eq!(dst["channel"]["token"].as_str(), Some("b"));
    }

    #[test]
    fn load_with_no_workspace_path_returns_defaults() {
        // No global search paths exist in the test sandbox, so this is
        // equivalent to loading an empty config.
        let cfg = load(None);
        assert!(cfg.is_ok());
    }

    #[test]
    fn load_errors_on_missing_workspace_path() {
        let missing = PathBuf::from("/nonexistent/agent.yaml");
        assert!(load(Some(&missing)).is_err());
    }

    #[test]
    fn load_workspace_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.yaml");
        std::fs::write(&path, "channel:\n  type: telegram\n  token: tok\nlanes:\n  main: 9\n").unwrap();
        let cfg = load(Some(&path)).unwrap();
        assert_eq!(cfg.channel.type_, "telegram");
        assert_eq!(cfg.lanes.main, 9);
        assert_eq!(cfg.lanes.subagent, 8); // untouched default
    }

    #[test]
    fn load_errors_on_unresolved_env_var_in_workspace_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.yaml");
        std::fs::write(&path, "channel:\n  token: \"${WARDEN_TOTALLY_UNSET_VAR}\"\n").unwrap();
        std::env::remove_var("WARDEN_TOTALLY_UNSET_VAR");
        assert!(load(Some(&path)).is_err());
    }
}

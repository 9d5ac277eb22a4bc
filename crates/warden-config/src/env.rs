// Copyright (c) 2026 Warden Contributors
//
// SPDX-License-Identifier: Apache-2.0
use serde_yaml::Value;
use std::env;

/// An `${ENV_VAR}` reference in a config file that has no value in the process
/// environment. Carries the source path so the caller can report where the
/// unresolved reference came from.
#[derive(Debug, thiserror::Error)]
#[error("unresolved environment variable '${{{var}}}' in {source}")]
pub struct EnvSubstitutionError {
    pub var: String,
    pub source: String,
}

/// Recursively substitute `${ENV_VAR}` references in every string scalar of a
/// YAML value tree. Any reference that does not resolve is a hard error
/// identifying `source` (normally the config file path), matching the
/// specification's "unresolved variables are a hard error identifying the
/// config source" requirement.
pub fn substitute_env_vars(value: &mut Value, source: &str) -> Result<(), EnvSubstitutionError> {
    match value {
        Value::String(s) => {
            *s = substitute_str(s, source)?;
        }
        Value::Sequence(seq) => {
            for item in seq {
                substitute_env_vars(item, source)?;
            }
        }
        Value::Mapping(map) => {
            for (_, v) in map.iter_mut() {
                substitute_env_vars(v, source)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn substitute_str(input: &str, source: &str) -> Result<String, EnvSubstitutionError> {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.char_indices().peekable();

    while let Some((_, ch)) = chars.next() {
        if ch != '$' {
            out.push(ch);
            continue;
        }
        if chars.peek().map(|(_, c)| *c) != Some('{') {
            out.push(ch);
            continue;
        }
        chars.next(); // consume '{'
        let mut name = String::new();
        let mut closed = false;
        for (_, c) in chars.by_ref() {
            if c == '}' {
                closed = true;
                break;
            }
            name.push(c);
        }
        if !closed {
            // Unterminated "${" is passed through verbatim rather than
            // treated as an unresolved variable; it is not a valid reference.
            out.push_str("${");
            out.push_str(&name);
            continue;
        }
        match env::var(&name) {
            Ok(val) => out.push_str(&val),
            Err(_) => {
                return Err(EnvSubstitutionError {
                    var: name,
                    source: source.to_string(),
                })
            }
        }
    }
    Ok(out)
}

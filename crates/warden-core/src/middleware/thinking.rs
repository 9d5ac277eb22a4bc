// Copyright (c) 2026 Warden Contributors
//
// SPDX-License-Identifier: Apache-2.0

/// Strip `<think>...</think>` and `<reasoning>...</reasoning>` blocks from
/// historical AI message content before it is replayed to the model, so
/// earlier chain-of-thought doesn't poison later turns.
pub fn strip_thinking_tags(content: &str) -> String {
    strip_tag(&strip_tag(content, "think"), "reasoning")
}

fn strip_tag(content: &str, tag: &str) -> String {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let mut result = String::with_capacity(content.len());
    let mut rest = content;

    while let Some(start) = rest.find(&open) {
        result.push_str(&rest[..start]);
        let after_open = &rest[start + open.len()..];
        match after_open.find(&close) {
            Some(end) => {
                rest = &after_open[end + close.len()..];
            }
            None => {
                // Unterminated tag: drop the rest rather than emit a partial block.
                rest = "";
            }
        }
    }
    result.push_str(rest);
    result
}

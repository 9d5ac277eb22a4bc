// Copyright (c) 2026 Warden Contributors
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::Value;

/// A structured action the LLM requested during a turn.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub args: Value,
}

/// The result of running (or synthesizing a result for) a tool call.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn err(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// The tool-execution continuation that the middleware chain wraps. The
/// actual tool implementations (shell, file I/O, web search, ...) are an
/// external collaborator; `warden-core`'s middleware only needs something
/// that executes a call and returns an output.
#[async_trait]
pub trait ToolContinuation: Send + Sync {
    async fn invoke(&self, call: &ToolCall) -> ToolOutput;
}

#[async_trait]
impl<F> ToolContinuation for F
where
    F: Fn(&ToolCall) -> ToolOutput + Send + Sync,
{
    async fn invoke(&self, call: &ToolCall) -> ToolOutput {
        self(call)
    }
}

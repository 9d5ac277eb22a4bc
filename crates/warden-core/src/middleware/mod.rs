// Copyright (c) 2026 Warden Contributors
//
// SPDX-License-Identifier: Apache-2.0
mod chain;
mod thinking;

pub use chain::{MiddlewareChain, MiddlewareContext, MiddlewareSignal};
pub use thinking::strip_thinking_tags;

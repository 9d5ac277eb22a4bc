// Copyright (c) 2026 Warden Contributors
//
// SPDX-License-Identifier: Apache-2.0
mod policy;
mod timeout;
mod types;

pub use policy::{ToolAvailability, ToolPolicy};
pub use timeout::timeout_for;
pub use types::{ToolCall, ToolContinuation, ToolOutput};

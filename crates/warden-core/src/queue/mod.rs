// Copyright (c) 2026 Warden Contributors
//
// SPDX-License-Identifier: Apache-2.0
mod lane;
mod manager;

pub use lane::{LaneQueue, LaneStats, QueueItem};
pub use manager::{QueueManager, SummarizeHook};

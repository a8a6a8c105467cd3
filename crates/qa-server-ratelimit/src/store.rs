// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;

/// Window state after a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterState {
	/// The hit fit under the limit and was recorded.
	pub allowed: bool,
	/// Recorded hits inside the window, this one included if allowed.
	pub count: u64,
	/// When the oldest recorded hit leaves the window and a slot frees up.
	pub reset_at: DateTime<Utc>,
}

/// Backing store for sliding-window hit logs.
///
/// `hit` must be atomic per key: drop hits at or before `now - window`, then
/// record `now` only if fewer than `limit` hits remain. Denied hits are not
/// recorded, so a client retrying while blocked does not extend its own
/// lockout.
#[async_trait]
pub trait CounterStore: Send + Sync {
	fn name(&self) -> &'static str;

	/// Whether every server instance sees the same counters.
	fn is_shared(&self) -> bool;

	async fn hit(
		&self,
		key: &str,
		limit: u32,
		window: Duration,
		now: DateTime<Utc>,
	) -> Result<CounterState>;

	async fn reset(&self, key: &str) -> Result<()>;
}

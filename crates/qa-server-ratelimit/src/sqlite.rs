// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Shared counter store on the `rate_limit_hits` table.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use qa_server_db::{RateLimitRepository, SqlitePool};
use tracing::warn;

use crate::error::{RateLimitError, Result};
use crate::store::{CounterState, CounterStore};

/// Hits between sweeps of expired rows for keys that are no longer hit.
pub const DEFAULT_PURGE_INTERVAL: u64 = 1_000;

#[derive(Clone)]
pub struct SqliteCounterStore {
	repo: RateLimitRepository,
	purge_interval: u64,
	hits_since_purge: Arc<AtomicU64>,
}

impl SqliteCounterStore {
	pub fn new(pool: SqlitePool) -> Self {
		Self::with_purge_interval(pool, DEFAULT_PURGE_INTERVAL)
	}

	pub fn with_purge_interval(pool: SqlitePool, purge_interval: u64) -> Self {
		Self {
			repo: RateLimitRepository::new(pool),
			purge_interval: purge_interval.max(1),
			hits_since_purge: Arc::new(AtomicU64::new(0)),
		}
	}

	/// Delete hits whose window has ended, for every key.
	pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
		Ok(self.repo.purge_expired(now.timestamp_millis()).await?)
	}

	/// Keys with at least one stored hit.
	pub async fn tracked_keys(&self) -> Result<u64> {
		Ok(self.repo.tracked_keys().await?)
	}

	/// Every `purge_interval` hits, sweep expired rows. Keys that stop being
	/// hit are never cleaned by `hit` itself.
	async fn purge_if_due(&self, now: DateTime<Utc>) {
		let hits = self.hits_since_purge.fetch_add(1, Ordering::Relaxed) + 1;
		if hits < self.purge_interval {
			return;
		}
		self.hits_since_purge.store(0, Ordering::Relaxed);
		if let Err(e) = self.purge_expired(now).await {
			warn!(error = %e, "failed to purge expired rate limit hits");
		}
	}
}

#[async_trait]
impl CounterStore for SqliteCounterStore {
	fn name(&self) -> &'static str {
		"sqlite"
	}

	fn is_shared(&self) -> bool {
		true
	}

	async fn hit(
		&self,
		key: &str,
		limit: u32,
		window: Duration,
		now: DateTime<Utc>,
	) -> Result<CounterState> {
		let window_ms = i64::try_from(window.as_millis())
			.map_err(|_| RateLimitError::InvalidRule("window too large".to_string()))?;

		let row = self
			.repo
			.record_hit(key, i64::from(limit), window_ms, now.timestamp_millis())
			.await?;

		let reset_at = DateTime::from_timestamp_millis(row.reset_at).ok_or_else(|| {
			RateLimitError::Store(format!("stored hit time {} out of range", row.reset_at))
		})?;

		self.purge_if_due(now).await;

		Ok(CounterState {
			allowed: row.allowed,
			count: u64::try_from(row.count).unwrap_or(0),
			reset_at,
		})
	}

	async fn reset(&self, key: &str) -> Result<()> {
		Ok(self.repo.reset(key).await?)
	}
}

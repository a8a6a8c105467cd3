// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Process-local counter store.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{RateLimitError, Result};
use crate::store::{CounterState, CounterStore};

/// Keys held before expired ones are pruned.
pub const DEFAULT_PRUNE_THRESHOLD: usize = 10_000;

#[derive(Debug)]
struct HitLog {
	hits: Vec<DateTime<Utc>>,
	/// When the newest hit leaves its window.
	expires_at: DateTime<Utc>,
}

/// Hit logs held in this process only. Each server instance counts on its
/// own, so a client spreading requests across N instances gets N times the
/// limit.
#[derive(Debug)]
pub struct MemoryCounterStore {
	entries: Mutex<HashMap<String, HitLog>>,
	prune_threshold: usize,
}

impl MemoryCounterStore {
	pub fn new() -> Self {
		Self::with_prune_threshold(DEFAULT_PRUNE_THRESHOLD)
	}

	pub fn with_prune_threshold(prune_threshold: usize) -> Self {
		Self {
			entries: Mutex::new(HashMap::new()),
			prune_threshold,
		}
	}

	pub async fn len(&self) -> usize {
		self.entries.lock().await.len()
	}

	pub async fn is_empty(&self) -> bool {
		self.entries.lock().await.is_empty()
	}
}

impl Default for MemoryCounterStore {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
	fn name(&self) -> &'static str {
		"memory"
	}

	fn is_shared(&self) -> bool {
		false
	}

	async fn hit(
		&self,
		key: &str,
		limit: u32,
		window: Duration,
		now: DateTime<Utc>,
	) -> Result<CounterState> {
		let window = chrono::Duration::from_std(window)
			.map_err(|_| RateLimitError::InvalidRule("window too large".to_string()))?;
		let cutoff = now - window;

		let mut entries = self.entries.lock().await;

		if entries.len() >= self.prune_threshold {
			let before = entries.len();
			entries.retain(|_, log| log.expires_at > now);
			debug!(pruned = before - entries.len(), "pruned expired rate limit counters");
		}

		let log = entries.entry(key.to_string()).or_insert_with(|| HitLog {
			hits: Vec::new(),
			expires_at: now,
		});
		log.hits.retain(|&hit| hit > cutoff);

		let allowed = (log.hits.len() as u64) < u64::from(limit);
		if allowed {
			log.hits.push(now);
			log.expires_at = log.expires_at.max(now + window);
		}

		let oldest = log.hits.iter().min().copied().map_or(now, |oldest| oldest.min(now));
		Ok(CounterState {
			allowed,
			count: log.hits.len() as u64,
			reset_at: oldest + window,
		})
	}

	async fn reset(&self, key: &str) -> Result<()> {
		self.entries.lock().await.remove(key);
		Ok(())
	}
}

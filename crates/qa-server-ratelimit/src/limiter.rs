// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use qa_server_config::{RateLimitBackend, RateLimitConfig};
use qa_server_db::SqlitePool;
use tracing::{debug, warn};

use crate::error::{RateLimitError, Result};
use crate::memory::MemoryCounterStore;
use crate::rules::{validate, RateLimitRule};
use crate::sqlite::SqliteCounterStore;
use crate::store::{CounterState, CounterStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
	pub allowed: bool,
	pub limit: u32,
	pub remaining: u32,
	pub reset_at: DateTime<Utc>,
}

impl RateLimitDecision {
	fn from_state(state: CounterState, limit: u32) -> Self {
		let limit_u64 = u64::from(limit);
		let used = state.count.min(limit_u64);
		Self {
			allowed: state.allowed,
			limit,
			// used <= limit, so this fits
			remaining: u32::try_from(limit_u64 - used).unwrap_or(0),
			reset_at: state.reset_at,
		}
	}
}

/// Sliding-window rate limiter.
///
/// Counts in `primary`. If `primary` fails and a fallback is configured, the
/// call is answered from the in-process fallback instead of failing open.
#[derive(Clone)]
pub struct RateLimiter {
	primary: Arc<dyn CounterStore>,
	fallback: Option<Arc<MemoryCounterStore>>,
}

impl RateLimiter {
	pub fn new(primary: Arc<dyn CounterStore>) -> Self {
		if !primary.is_shared() {
			warn!(
				store = primary.name(),
				"rate limit counters are process-local; limits are not shared across server instances"
			);
		}
		Self {
			primary,
			fallback: None,
		}
	}

	pub fn with_fallback(primary: Arc<dyn CounterStore>, fallback: Arc<MemoryCounterStore>) -> Self {
		Self {
			primary,
			fallback: Some(fallback),
		}
	}

	/// Shared SQLite counters, degrading to process-local counters on error.
	pub fn sqlite(pool: SqlitePool) -> Self {
		Self::with_fallback(
			Arc::new(SqliteCounterStore::new(pool)),
			Arc::new(MemoryCounterStore::new()),
		)
	}

	pub fn in_memory() -> Self {
		Self::new(Arc::new(MemoryCounterStore::new()))
	}

	pub fn from_config(config: &RateLimitConfig, pool: Option<SqlitePool>) -> Result<Self> {
		match (config.backend, pool) {
			(RateLimitBackend::Sqlite, Some(pool)) => Ok(Self::sqlite(pool)),
			(RateLimitBackend::Sqlite, None) => Err(RateLimitError::Store(
				"sqlite rate limit backend needs a database pool".to_string(),
			)),
			(RateLimitBackend::Memory, _) => Ok(Self::in_memory()),
		}
	}

	pub fn backend_name(&self) -> &'static str {
		self.primary.name()
	}

	/// Whether the primary store enforces one budget across server instances.
	pub fn is_shared(&self) -> bool {
		self.primary.is_shared()
	}

	/// Count one hit against `key` and report whether it is within `limit`.
	pub async fn check_limit(
		&self,
		key: &str,
		limit: u32,
		window: Duration,
	) -> Result<RateLimitDecision> {
		self.check_limit_at(key, limit, window, Utc::now()).await
	}

	pub async fn check_limit_at(
		&self,
		key: &str,
		limit: u32,
		window: Duration,
		now: DateTime<Utc>,
	) -> Result<RateLimitDecision> {
		validate(limit, window)?;

		let state = match self.primary.hit(key, limit, window, now).await {
			Ok(state) => state,
			Err(primary_error) => {
				let Some(fallback) = &self.fallback else {
					return Err(primary_error);
				};
				warn!(
					store = self.primary.name(),
					fallback = fallback.name(),
					fallback_shared = fallback.is_shared(),
					error = %primary_error,
					"rate limit store failed; using in-memory counters, which are neither atomic across requests nor shared across server instances"
				);
				fallback.hit(key, limit, window, now).await?
			}
		};

		let decision = RateLimitDecision::from_state(state, limit);
		if decision.allowed {
			debug!(rate_limit_key = %key, remaining = decision.remaining, "rate limit check passed");
		} else {
			warn!(rate_limit_key = %key, reset_at = %decision.reset_at, "rate limit exceeded");
		}
		Ok(decision)
	}

	/// Like [`check_limit`](Self::check_limit), but a denial is an error.
	pub async fn enforce(&self, key: &str, limit: u32, window: Duration) -> Result<RateLimitDecision> {
		self.enforce_at(key, limit, window, Utc::now()).await
	}

	pub async fn enforce_at(
		&self,
		key: &str,
		limit: u32,
		window: Duration,
		now: DateTime<Utc>,
	) -> Result<RateLimitDecision> {
		let decision = self.check_limit_at(key, limit, window, now).await?;
		if !decision.allowed {
			return Err(RateLimitError::Exceeded {
				key: key.to_string(),
				reset_at: decision.reset_at,
			});
		}
		Ok(decision)
	}

	/// Check `subject` against a named rule.
	pub async fn check_rule(&self, rule: &RateLimitRule, subject: &str) -> Result<RateLimitDecision> {
		self
			.check_limit(&rule.key_for(subject), rule.limit, rule.window)
			.await
	}

	pub async fn enforce_rule(
		&self,
		rule: &RateLimitRule,
		subject: &str,
	) -> Result<RateLimitDecision> {
		self
			.enforce(&rule.key_for(subject), rule.limit, rule.window)
			.await
	}

	/// Clear the counter for `key`, e.g. after a successful login.
	pub async fn reset(&self, key: &str) -> Result<()> {
		if let Some(fallback) = &self.fallback {
			fallback.reset(key).await?;
		}
		self.primary.reset(key).await
	}
}

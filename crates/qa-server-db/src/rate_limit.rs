// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Shared sliding-window hit log.
//!
//! Each key keeps one row per allowed hit still inside its window, so a key
//! never holds more than `limit` rows. Times are unix milliseconds.

use sqlx::sqlite::SqlitePool;

use crate::error::DbError;

/// Window state after a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowRow {
	/// Whether the hit fit under the limit and was recorded.
	pub allowed: bool,
	/// Hits inside the window, including this one if it was recorded.
	pub count: i64,
	/// When the oldest hit in the window leaves it.
	pub reset_at: i64,
}

#[derive(Clone)]
pub struct RateLimitRepository {
	pool: SqlitePool,
}

impl RateLimitRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Record one hit for `key` at `now_ms` if fewer than `limit` hits fall in
	/// `(now_ms - window_ms, now_ms]`.
	///
	/// Runs as one write transaction. The first statement is a write, so the
	/// database write lock is held before the window is counted and concurrent
	/// instances cannot both take the last slot.
	#[tracing::instrument(skip(self), fields(rate_limit_key = %key))]
	pub async fn record_hit(
		&self,
		key: &str,
		limit: i64,
		window_ms: i64,
		now_ms: i64,
	) -> Result<WindowRow, DbError> {
		let mut tx = self.pool.begin().await?;

		sqlx::query("DELETE FROM rate_limit_hits WHERE key = ? AND hit_at <= ?")
			.bind(key)
			.bind(now_ms.saturating_sub(window_ms))
			.execute(&mut *tx)
			.await?;

		let (in_window, oldest): (i64, Option<i64>) =
			sqlx::query_as("SELECT COUNT(*), MIN(hit_at) FROM rate_limit_hits WHERE key = ?")
				.bind(key)
				.fetch_one(&mut *tx)
				.await?;

		let allowed = in_window < limit;
		if allowed {
			sqlx::query("INSERT INTO rate_limit_hits (key, hit_at, expires_at) VALUES (?, ?, ?)")
				.bind(key)
				.bind(now_ms)
				.bind(now_ms.saturating_add(window_ms))
				.execute(&mut *tx)
				.await?;
		}

		tx.commit().await?;

		let oldest = oldest.map_or(now_ms, |oldest| oldest.min(now_ms));
		Ok(WindowRow {
			allowed,
			count: if allowed { in_window + 1 } else { in_window },
			reset_at: oldest.saturating_add(window_ms),
		})
	}

	#[tracing::instrument(skip(self), fields(rate_limit_key = %key))]
	pub async fn reset(&self, key: &str) -> Result<(), DbError> {
		sqlx::query("DELETE FROM rate_limit_hits WHERE key = ?")
			.bind(key)
			.execute(&self.pool)
			.await?;
		Ok(())
	}

	/// Delete hits whose window ended at or before `now_ms`, across all keys.
	#[tracing::instrument(skip(self))]
	pub async fn purge_expired(&self, now_ms: i64) -> Result<u64, DbError> {
		let result = sqlx::query("DELETE FROM rate_limit_hits WHERE expires_at <= ?")
			.bind(now_ms)
			.execute(&self.pool)
			.await?;
		let purged = result.rows_affected();
		if purged > 0 {
			tracing::debug!(purged, "purged expired rate limit hits");
		}
		Ok(purged)
	}

	/// Keys with at least one stored hit.
	pub async fn tracked_keys(&self) -> Result<u64, DbError> {
		let (keys,): (i64,) = sqlx::query_as("SELECT COUNT(DISTINCT key) FROM rate_limit_hits")
			.fetch_one(&self.pool)
			.await?;
		Ok(u64::try_from(keys).unwrap_or(0))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::create_test_pool;
	use proptest::prelude::*;

	const WINDOW_MS: i64 = 60_000;

	async fn repo() -> RateLimitRepository {
		RateLimitRepository::new(create_test_pool().await.unwrap())
	}

	#[tokio::test]
	async fn test_first_hit_opens_window() {
		let repo = repo().await;
		let row = repo.record_hit("login:alice", 5, WINDOW_MS, 1_000).await.unwrap();
		assert_eq!(
			row,
			WindowRow {
				allowed: true,
				count: 1,
				reset_at: 61_000
			}
		);
	}

	#[tokio::test]
	async fn test_denied_hits_are_not_recorded() {
		let repo = repo().await;
		repo.record_hit("login:alice", 2, WINDOW_MS, 0).await.unwrap();
		repo.record_hit("login:alice", 2, WINDOW_MS, 10_000).await.unwrap();
		let denied = repo.record_hit("login:alice", 2, WINDOW_MS, 20_000).await.unwrap();
		assert_eq!(
			denied,
			WindowRow {
				allowed: false,
				count: 2,
				reset_at: 60_000
			}
		);

		let (rows,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM rate_limit_hits")
			.fetch_one(&repo.pool)
			.await
			.unwrap();
		assert_eq!(rows, 2);
	}

	#[tokio::test]
	async fn test_window_slides_one_hit_at_a_time() {
		let repo = repo().await;
		repo.record_hit("api:key-1", 2, WINDOW_MS, 0).await.unwrap();
		repo.record_hit("api:key-1", 2, WINDOW_MS, 30_000).await.unwrap();
		assert!(!repo.record_hit("api:key-1", 2, WINDOW_MS, 59_999).await.unwrap().allowed);

		// The hit at 0 has left the window; the one at 30s has not.
		let row = repo.record_hit("api:key-1", 2, WINDOW_MS, 60_000).await.unwrap();
		assert_eq!(
			row,
			WindowRow {
				allowed: true,
				count: 2,
				reset_at: 90_000
			}
		);
		assert!(!repo.record_hit("api:key-1", 2, WINDOW_MS, 60_001).await.unwrap().allowed);
	}

	#[tokio::test]
	async fn test_no_burst_across_window_boundary() {
		let repo = repo().await;
		repo.record_hit("login:mallory", 5, WINDOW_MS, 0).await.unwrap();
		let mut allowed = 0;
		for at in [59_000, 59_000, 59_000, 59_000, 60_000, 60_000, 60_000, 60_000, 60_000] {
			if repo.record_hit("login:mallory", 5, WINDOW_MS, at).await.unwrap().allowed {
				allowed += 1;
			}
		}
		// Four at 59s fill the window; only the slot freed by the hit at 0 opens at 60s.
		assert_eq!(allowed, 5);
	}

	#[tokio::test]
	async fn test_keys_are_independent() {
		let repo = repo().await;
		repo.record_hit("login:alice", 1, WINDOW_MS, 0).await.unwrap();
		let bob = repo.record_hit("login:bob", 1, WINDOW_MS, 0).await.unwrap();
		assert!(bob.allowed);
		assert_eq!(bob.count, 1);
	}

	#[tokio::test]
	async fn test_reset_and_purge() {
		let repo = repo().await;
		repo.record_hit("login:alice", 5, WINDOW_MS, 0).await.unwrap();
		repo.record_hit("login:bob", 5, WINDOW_MS, 50_000).await.unwrap();

		repo.reset("login:bob").await.unwrap();
		assert_eq!(
			repo.record_hit("login:bob", 5, WINDOW_MS, 50_001).await.unwrap().count,
			1
		);

		assert_eq!(repo.purge_expired(60_000).await.unwrap(), 1);
		assert_eq!(repo.tracked_keys().await.unwrap(), 1);
	}

	proptest! {
		#![proptest_config(ProptestConfig::with_cases(32))]

		#[test]
		fn hits_inside_one_window_stop_at_limit(
			limit in 1i64..10,
			offsets in proptest::collection::vec(0i64..WINDOW_MS, 1..20),
		) {
			let runtime = tokio::runtime::Builder::new_current_thread()
				.enable_all()
				.build()
				.unwrap();
			runtime.block_on(async {
				let repo = repo().await;
				let mut sorted = offsets.clone();
				sorted.sort_unstable();
				for (i, at) in sorted.iter().enumerate() {
					let row = repo.record_hit("api:prop", limit, WINDOW_MS, *at).await.unwrap();
					let i = i as i64;
					assert_eq!(row.allowed, i < limit);
					assert_eq!(row.count, (i + 1).min(limit));
					assert_eq!(row.reset_at, sorted[0] + WINDOW_MS);
				}
			});
		}
	}
}

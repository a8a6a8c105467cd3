// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Tables owned by this crate.
//!
//! Encrypted columns hold envelope strings only; plaintext never reaches the
//! database.

use sqlx::sqlite::SqlitePool;

use crate::error::DbError;

const SCHEMA: &[&str] = &[
	r#"
	CREATE TABLE IF NOT EXISTS integrations (
		id TEXT PRIMARY KEY,
		org_id TEXT NOT NULL,
		kind TEXT NOT NULL,
		name TEXT NOT NULL,
		webhook_url TEXT NOT NULL,
		access_token TEXT,
		created_at TEXT NOT NULL,
		updated_at TEXT NOT NULL
	)
	"#,
	r#"
	CREATE INDEX IF NOT EXISTS idx_integrations_org_id ON integrations(org_id)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS user_two_factor (
		user_id TEXT PRIMARY KEY,
		totp_secret TEXT NOT NULL,
		enabled INTEGER NOT NULL DEFAULT 0,
		created_at TEXT NOT NULL,
		updated_at TEXT NOT NULL
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS rate_limit_hits (
		key TEXT NOT NULL,
		hit_at INTEGER NOT NULL,
		expires_at INTEGER NOT NULL
	)
	"#,
	r#"
	CREATE INDEX IF NOT EXISTS idx_rate_limit_hits_key_hit_at ON rate_limit_hits(key, hit_at)
	"#,
	r#"
	CREATE INDEX IF NOT EXISTS idx_rate_limit_hits_expires_at ON rate_limit_hits(expires_at)
	"#,
];

/// Create every table and index if missing. Idempotent.
#[tracing::instrument(skip(pool))]
pub async fn apply_schema(pool: &SqlitePool) -> Result<(), DbError> {
	for statement in SCHEMA {
		sqlx::query(statement).execute(pool).await?;
	}
	tracing::debug!(statements = SCHEMA.len(), "schema applied");
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::create_test_pool;

	#[tokio::test]
	async fn test_apply_schema_is_idempotent() {
		let pool = create_test_pool().await.unwrap();
		apply_schema(&pool).await.unwrap();
		apply_schema(&pool).await.unwrap();

		let (tables,): (i64,) = sqlx::query_as(
			"SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' \
			 AND name IN ('integrations', 'user_two_factor', 'rate_limit_hits')",
		)
		.fetch_one(&pool)
		.await
		.unwrap();
		assert_eq!(tables, 3);
	}
}

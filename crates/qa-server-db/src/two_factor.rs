// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! TOTP enrollment storage. The seed is stored as an envelope.

use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePool, Row};

use crate::error::DbError;
use crate::integration::parse_timestamp;

#[derive(Debug, Clone)]
pub struct TwoFactorEnrollment {
	pub user_id: String,
	pub totp_secret: String,
	pub enabled: bool,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TwoFactorRepository {
	pool: SqlitePool,
}

impl TwoFactorRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Store a (re-)enrollment. Re-enrolling replaces the seed and disables
	/// the factor until it is confirmed again.
	#[tracing::instrument(skip(self, totp_secret))]
	pub async fn upsert_secret(&self, user_id: &str, totp_secret: &str) -> Result<(), DbError> {
		let now = Utc::now().to_rfc3339();
		sqlx::query(
			r#"
			INSERT INTO user_two_factor (user_id, totp_secret, enabled, created_at, updated_at)
			VALUES (?, ?, 0, ?, ?)
			ON CONFLICT(user_id) DO UPDATE SET
				totp_secret = excluded.totp_secret,
				enabled = 0,
				updated_at = excluded.updated_at
			"#,
		)
		.bind(user_id)
		.bind(totp_secret)
		.bind(&now)
		.bind(&now)
		.execute(&self.pool)
		.await?;
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn set_enabled(&self, user_id: &str, enabled: bool) -> Result<(), DbError> {
		let result = sqlx::query(
			"UPDATE user_two_factor SET enabled = ?, updated_at = ? WHERE user_id = ?",
		)
		.bind(enabled)
		.bind(Utc::now().to_rfc3339())
		.bind(user_id)
		.execute(&self.pool)
		.await?;

		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(format!(
				"no two-factor enrollment for user {user_id}"
			)));
		}
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn get(&self, user_id: &str) -> Result<Option<TwoFactorEnrollment>, DbError> {
		let row = sqlx::query(
			r#"
			SELECT user_id, totp_secret, enabled, created_at, updated_at
			FROM user_two_factor
			WHERE user_id = ?
			"#,
		)
		.bind(user_id)
		.fetch_optional(&self.pool)
		.await?;

		let Some(row) = row else {
			return Ok(None);
		};
		let created_at: String = row.try_get("created_at")?;
		let updated_at: String = row.try_get("updated_at")?;
		Ok(Some(TwoFactorEnrollment {
			user_id: row.try_get("user_id")?,
			totp_secret: row.try_get("totp_secret")?,
			enabled: row.try_get("enabled")?,
			created_at: parse_timestamp(&created_at)?,
			updated_at: parse_timestamp(&updated_at)?,
		}))
	}

	#[tracing::instrument(skip(self))]
	pub async fn delete(&self, user_id: &str) -> Result<bool, DbError> {
		let result = sqlx::query("DELETE FROM user_two_factor WHERE user_id = ?")
			.bind(user_id)
			.execute(&self.pool)
			.await?;
		Ok(result.rows_affected() > 0)
	}
}

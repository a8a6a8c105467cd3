// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Enumeration and compare-and-swap update of every encrypted column.
//!
//! Used by key rotation. Values are envelope strings; this module never sees
//! plaintext.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqlitePool, Row};

use crate::error::DbError;

/// A column that stores encrypted secrets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EncryptedColumn {
	IntegrationWebhookUrl,
	IntegrationAccessToken,
	TwoFactorTotpSecret,
}

impl EncryptedColumn {
	pub const ALL: [EncryptedColumn; 3] = [
		EncryptedColumn::IntegrationWebhookUrl,
		EncryptedColumn::IntegrationAccessToken,
		EncryptedColumn::TwoFactorTotpSecret,
	];

	pub fn table(self) -> &'static str {
		match self {
			EncryptedColumn::IntegrationWebhookUrl | EncryptedColumn::IntegrationAccessToken => {
				"integrations"
			}
			EncryptedColumn::TwoFactorTotpSecret => "user_two_factor",
		}
	}

	pub fn id_column(self) -> &'static str {
		match self {
			EncryptedColumn::IntegrationWebhookUrl | EncryptedColumn::IntegrationAccessToken => "id",
			EncryptedColumn::TwoFactorTotpSecret => "user_id",
		}
	}

	pub fn value_column(self) -> &'static str {
		match self {
			EncryptedColumn::IntegrationWebhookUrl => "webhook_url",
			EncryptedColumn::IntegrationAccessToken => "access_token",
			EncryptedColumn::TwoFactorTotpSecret => "totp_secret",
		}
	}

	/// `table.column`, as accepted by [`FromStr`].
	pub fn label(self) -> &'static str {
		match self {
			EncryptedColumn::IntegrationWebhookUrl => "integrations.webhook_url",
			EncryptedColumn::IntegrationAccessToken => "integrations.access_token",
			EncryptedColumn::TwoFactorTotpSecret => "user_two_factor.totp_secret",
		}
	}
}

impl fmt::Display for EncryptedColumn {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.label())
	}
}

impl FromStr for EncryptedColumn {
	type Err = DbError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		EncryptedColumn::ALL
			.into_iter()
			.find(|c| c.label() == s)
			.ok_or_else(|| {
				let known: Vec<&str> = EncryptedColumn::ALL.iter().map(|c| c.label()).collect();
				DbError::NotFound(format!(
					"unknown encrypted column '{s}' (known: {})",
					known.join(", ")
				))
			})
	}
}

/// One stored envelope and where it lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedRecord {
	pub column: EncryptedColumn,
	pub id: String,
	pub value: String,
}

#[async_trait]
pub trait EncryptedRecordStore: Send + Sync {
	/// Every non-empty value in `column`, ordered by record id.
	async fn list_encrypted_records(
		&self,
		column: EncryptedColumn,
	) -> Result<Vec<EncryptedRecord>, DbError>;

	/// Replace `expected` with `new` only if the row still holds `expected`.
	///
	/// Returns `false` when the row was deleted or changed since it was read.
	async fn update_encrypted_value(
		&self,
		column: EncryptedColumn,
		id: &str,
		expected: &str,
		new: &str,
	) -> Result<bool, DbError>;
}

#[derive(Clone)]
pub struct SqliteEncryptedRecordStore {
	pool: SqlitePool,
}

impl SqliteEncryptedRecordStore {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}
}

// Identifiers below come from `EncryptedColumn`'s fixed strings, never from input.
#[async_trait]
impl EncryptedRecordStore for SqliteEncryptedRecordStore {
	#[tracing::instrument(skip(self), fields(column = %column))]
	async fn list_encrypted_records(
		&self,
		column: EncryptedColumn,
	) -> Result<Vec<EncryptedRecord>, DbError> {
		let sql = format!(
			"SELECT {id} AS id, {value} AS value FROM {table} \
			 WHERE {value} IS NOT NULL AND {value} != '' ORDER BY {id}",
			id = column.id_column(),
			value = column.value_column(),
			table = column.table(),
		);

		let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
		let records = rows
			.iter()
			.map(|row| {
				Ok(EncryptedRecord {
					column,
					id: row.try_get("id")?,
					value: row.try_get("value")?,
				})
			})
			.collect::<Result<Vec<_>, sqlx::Error>>()?;

		tracing::debug!(count = records.len(), "listed encrypted records");
		Ok(records)
	}

	#[tracing::instrument(skip(self, expected, new), fields(column = %column, record_id = %id))]
	async fn update_encrypted_value(
		&self,
		column: EncryptedColumn,
		id: &str,
		expected: &str,
		new: &str,
	) -> Result<bool, DbError> {
		let sql = format!(
			"UPDATE {table} SET {value} = ?, updated_at = ? WHERE {id} = ? AND {value} = ?",
			table = column.table(),
			value = column.value_column(),
			id = column.id_column(),
		);

		let result = sqlx::query(&sql)
			.bind(new)
			.bind(Utc::now().to_rfc3339())
			.bind(id)
			.bind(expected)
			.execute(&self.pool)
			.await?;

		let updated = result.rows_affected() == 1;
		if !updated {
			tracing::debug!("encrypted value changed or row removed since read");
		}
		Ok(updated)
	}
}

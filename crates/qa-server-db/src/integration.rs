// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Integration repository.
//!
//! Integrations connect an organization to Slack, Discord or Jira. The
//! webhook URL and the optional access token are stored as encryption
//! envelopes; callers encrypt before writing and decrypt after reading.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePool, sqlite::SqliteRow, Row};
use uuid::Uuid;

use crate::error::DbError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrationKind {
	Slack,
	Discord,
	Jira,
}

impl IntegrationKind {
	pub fn as_str(self) -> &'static str {
		match self {
			IntegrationKind::Slack => "slack",
			IntegrationKind::Discord => "discord",
			IntegrationKind::Jira => "jira",
		}
	}
}

impl fmt::Display for IntegrationKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for IntegrationKind {
	type Err = DbError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"slack" => Ok(IntegrationKind::Slack),
			"discord" => Ok(IntegrationKind::Discord),
			"jira" => Ok(IntegrationKind::Jira),
			other => Err(DbError::Internal(format!("unknown integration kind '{other}'"))),
		}
	}
}

/// Stored integration. `webhook_url` and `access_token` are envelopes.
#[derive(Debug, Clone)]
pub struct Integration {
	pub id: String,
	pub org_id: String,
	pub kind: IntegrationKind,
	pub name: String,
	pub webhook_url: String,
	pub access_token: Option<String>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewIntegration {
	pub org_id: String,
	pub kind: IntegrationKind,
	pub name: String,
	pub webhook_url: String,
	pub access_token: Option<String>,
}

#[derive(Clone)]
pub struct IntegrationRepository {
	pool: SqlitePool,
}

impl IntegrationRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Insert an integration and return its generated id.
	#[tracing::instrument(skip(self, new), fields(org_id = %new.org_id, kind = %new.kind))]
	pub async fn create_integration(&self, new: &NewIntegration) -> Result<String, DbError> {
		let id = Uuid::new_v4().to_string();
		let now = Utc::now().to_rfc3339();

		sqlx::query(
			r#"
			INSERT INTO integrations (
				id, org_id, kind, name, webhook_url, access_token, created_at, updated_at
			) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(&id)
		.bind(&new.org_id)
		.bind(new.kind.as_str())
		.bind(&new.name)
		.bind(&new.webhook_url)
		.bind(new.access_token.as_deref())
		.bind(&now)
		.bind(&now)
		.execute(&self.pool)
		.await?;

		tracing::debug!(integration_id = %id, "integration created");
		Ok(id)
	}

	#[tracing::instrument(skip(self), fields(integration_id = %id))]
	pub async fn get_integration(&self, id: &str) -> Result<Option<Integration>, DbError> {
		let row = sqlx::query(
			r#"
			SELECT id, org_id, kind, name, webhook_url, access_token, created_at, updated_at
			FROM integrations
			WHERE id = ?
			"#,
		)
		.bind(id)
		.fetch_optional(&self.pool)
		.await?;

		row.map(|row| parse_integration_row(&row)).transpose()
	}

	#[tracing::instrument(skip(self))]
	pub async fn list_integrations_for_org(&self, org_id: &str) -> Result<Vec<Integration>, DbError> {
		let rows = sqlx::query(
			r#"
			SELECT id, org_id, kind, name, webhook_url, access_token, created_at, updated_at
			FROM integrations
			WHERE org_id = ?
			ORDER BY created_at, id
			"#,
		)
		.bind(org_id)
		.fetch_all(&self.pool)
		.await?;

		rows.iter().map(parse_integration_row).collect()
	}

	/// Delete an integration together with its encrypted secrets.
	#[tracing::instrument(skip(self), fields(integration_id = %id))]
	pub async fn delete_integration(&self, id: &str) -> Result<bool, DbError> {
		let result = sqlx::query("DELETE FROM integrations WHERE id = ?")
			.bind(id)
			.execute(&self.pool)
			.await?;
		Ok(result.rows_affected() > 0)
	}
}

fn parse_integration_row(row: &SqliteRow) -> Result<Integration, DbError> {
	let kind: String = row.try_get("kind")?;
	let created_at: String = row.try_get("created_at")?;
	let updated_at: String = row.try_get("updated_at")?;

	Ok(Integration {
		id: row.try_get("id")?,
		org_id: row.try_get("org_id")?,
		kind: kind.parse()?,
		name: row.try_get("name")?,
		webhook_url: row.try_get("webhook_url")?,
		access_token: row.try_get("access_token")?,
		created_at: parse_timestamp(&created_at)?,
		updated_at: parse_timestamp(&updated_at)?,
	})
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, DbError> {
	DateTime::parse_from_rfc3339(value)
		.map(|dt| dt.with_timezone(&Utc))
		.map_err(|e| DbError::Internal(format!("invalid timestamp '{value}': {e}")))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::create_test_pool;

	fn slack(org: &str) -> NewIntegration {
		NewIntegration {
			org_id: org.to_string(),
			kind: IntegrationKind::Slack,
			name: "#release-qa".to_string(),
			webhook_url: "v1:0a0b:0c0d:0e0f".to_string(),
			access_token: None,
		}
	}

	#[tokio::test]
	async fn test_create_and_get_integration() {
		let repo = IntegrationRepository::new(create_test_pool().await.unwrap());
		let id = repo.create_integration(&slack("org-a")).await.unwrap();

		let stored = repo.get_integration(&id).await.unwrap().unwrap();
		assert_eq!(stored.org_id, "org-a");
		assert_eq!(stored.kind, IntegrationKind::Slack);
		assert_eq!(stored.webhook_url, "v1:0a0b:0c0d:0e0f");
		assert!(stored.access_token.is_none());
	}

	#[tokio::test]
	async fn test_list_is_scoped_to_org() {
		let repo = IntegrationRepository::new(create_test_pool().await.unwrap());
		repo.create_integration(&slack("org-a")).await.unwrap();
		repo.create_integration(&slack("org-a")).await.unwrap();
		repo.create_integration(&slack("org-b")).await.unwrap();

		assert_eq!(repo.list_integrations_for_org("org-a").await.unwrap().len(), 2);
		assert_eq!(repo.list_integrations_for_org("org-b").await.unwrap().len(), 1);
	}

	#[tokio::test]
	async fn test_delete_integration() {
		let repo = IntegrationRepository::new(create_test_pool().await.unwrap());
		let id = repo.create_integration(&slack("org-a")).await.unwrap();

		assert!(repo.delete_integration(&id).await.unwrap());
		assert!(!repo.delete_integration(&id).await.unwrap());
		assert!(repo.get_integration(&id).await.unwrap().is_none());
	}

	#[test]
	fn test_kind_parsing() {
		assert_eq!("jira".parse::<IntegrationKind>().unwrap(), IntegrationKind::Jira);
		assert!("teams".parse::<IntegrationKind>().is_err());
	}
}

// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Utc};
use qa_server_db::DbError;

pub type Result<T> = std::result::Result<T, RateLimitError>;

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
	#[error("rate limit exceeded for {key}; retry after {reset_at}")]
	Exceeded { key: String, reset_at: DateTime<Utc> },

	#[error("rate limit store error: {0}")]
	Store(String),

	#[error("invalid rate limit rule: {0}")]
	InvalidRule(String),
}

impl From<DbError> for RateLimitError {
	fn from(e: DbError) -> Self {
		RateLimitError::Store(e.to_string())
	}
}

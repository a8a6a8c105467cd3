// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Named rules for the operations QA Studio throttles.

use std::time::Duration;

use qa_server_config::{RateLimitConfig, RateLimitRuleConfig};

use crate::error::{RateLimitError, Result};

/// `limit` hits per `window` for one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitRule {
	pub name: &'static str,
	pub limit: u32,
	pub window: Duration,
}

impl RateLimitRule {
	pub fn new(name: &'static str, limit: u32, window: Duration) -> Result<Self> {
		validate(limit, window)?;
		Ok(Self {
			name,
			limit,
			window,
		})
	}

	fn from_config(name: &'static str, config: &RateLimitRuleConfig) -> Result<Self> {
		Self::new(name, config.limit, Duration::from_secs(config.window_secs))
	}

	/// Counter key for `subject`, e.g. `login:alice@example.com`.
	pub fn key_for(&self, subject: &str) -> String {
		format!("{}:{subject}", self.name)
	}
}

pub(crate) fn validate(limit: u32, window: Duration) -> Result<()> {
	if limit == 0 {
		return Err(RateLimitError::InvalidRule(
			"limit must be at least 1".to_string(),
		));
	}
	if window.is_zero() {
		return Err(RateLimitError::InvalidRule(
			"window must be longer than zero".to_string(),
		));
	}
	Ok(())
}

#[derive(Debug, Clone)]
pub struct RateLimitRules {
	pub login: RateLimitRule,
	pub password_reset: RateLimitRule,
	pub api: RateLimitRule,
}

impl RateLimitRules {
	pub fn from_config(config: &RateLimitConfig) -> Result<Self> {
		Ok(Self {
			login: RateLimitRule::from_config("login", &config.login)?,
			password_reset: RateLimitRule::from_config("password_reset", &config.password_reset)?,
			api: RateLimitRule::from_config("api", &config.api)?,
		})
	}
}

impl Default for RateLimitRules {
	fn default() -> Self {
		Self {
			login: RateLimitRule {
				name: "login",
				limit: 5,
				window: Duration::from_secs(15 * 60),
			},
			password_reset: RateLimitRule {
				name: "password_reset",
				limit: 3,
				window: Duration::from_secs(60 * 60),
			},
			api: RateLimitRule {
				name: "api",
				limit: 100,
				window: Duration::from_secs(60),
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_agree_with_config_defaults() {
		let from_config = RateLimitRules::from_config(&RateLimitConfig::default()).unwrap();
		let defaults = RateLimitRules::default();
		assert_eq!(from_config.login, defaults.login);
		assert_eq!(from_config.password_reset, defaults.password_reset);
		assert_eq!(from_config.api, defaults.api);
	}

	#[test]
	fn key_is_prefixed_by_rule_name() {
		let rules = RateLimitRules::default();
		assert_eq!(rules.login.key_for("alice@example.com"), "login:alice@example.com");
		assert_eq!(rules.api.key_for("key_123"), "api:key_123");
	}

	#[test]
	fn zero_limit_or_window_is_invalid() {
		assert!(matches!(
			RateLimitRule::new("login", 0, Duration::from_secs(1)),
			Err(RateLimitError::InvalidRule(_))
		));
		assert!(matches!(
			RateLimitRule::new("login", 1, Duration::ZERO),
			Err(RateLimitError::InvalidRule(_))
		));
	}
}

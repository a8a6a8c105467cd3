// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Rate limiting configuration.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::ConfigError;

/// Where rate limit counters live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitBackend {
	/// Shared across every server instance using the same database.
	#[default]
	Sqlite,
	/// Process-local. Each instance counts independently.
	Memory,
}

impl fmt::Display for RateLimitBackend {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			RateLimitBackend::Sqlite => f.write_str("sqlite"),
			RateLimitBackend::Memory => f.write_str("memory"),
		}
	}
}

impl FromStr for RateLimitBackend {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"sqlite" | "database" => Ok(RateLimitBackend::Sqlite),
			"memory" => Ok(RateLimitBackend::Memory),
			other => Err(ConfigError::InvalidValue {
				key: "QA_STUDIO_RATE_LIMIT_BACKEND".to_string(),
				message: format!("unknown backend '{other}' (expected sqlite or memory)"),
			}),
		}
	}
}

/// A single sliding-window rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRuleConfig {
	pub limit: u32,
	pub window_secs: u64,
}

/// Partial rule, for merging.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RateLimitRuleLayer {
	#[serde(default)]
	pub limit: Option<u32>,
	#[serde(default)]
	pub window_secs: Option<u64>,
}

impl RateLimitRuleLayer {
	pub fn merge(&mut self, other: RateLimitRuleLayer) {
		if other.limit.is_some() {
			self.limit = other.limit;
		}
		if other.window_secs.is_some() {
			self.window_secs = other.window_secs;
		}
	}

	fn finalize(
		self,
		name: &str,
		default: RateLimitRuleConfig,
	) -> Result<RateLimitRuleConfig, ConfigError> {
		let rule = RateLimitRuleConfig {
			limit: self.limit.unwrap_or(default.limit),
			window_secs: self.window_secs.unwrap_or(default.window_secs),
		};
		if rule.limit == 0 {
			return Err(ConfigError::InvalidValue {
				key: format!("rate_limit.{name}.limit"),
				message: "must be at least 1".to_string(),
			});
		}
		if rule.window_secs == 0 {
			return Err(ConfigError::InvalidValue {
				key: format!("rate_limit.{name}.window_secs"),
				message: "must be at least 1 second".to_string(),
			});
		}
		Ok(rule)
	}
}

pub const DEFAULT_LOGIN_RULE: RateLimitRuleConfig = RateLimitRuleConfig {
	limit: 5,
	window_secs: 900,
};

pub const DEFAULT_PASSWORD_RESET_RULE: RateLimitRuleConfig = RateLimitRuleConfig {
	limit: 3,
	window_secs: 3600,
};

pub const DEFAULT_API_RULE: RateLimitRuleConfig = RateLimitRuleConfig {
	limit: 100,
	window_secs: 60,
};

/// Rate limiting configuration (runtime, fully resolved).
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
	pub backend: RateLimitBackend,
	pub login: RateLimitRuleConfig,
	pub password_reset: RateLimitRuleConfig,
	pub api: RateLimitRuleConfig,
}

impl Default for RateLimitConfig {
	fn default() -> Self {
		Self {
			backend: RateLimitBackend::default(),
			login: DEFAULT_LOGIN_RULE,
			password_reset: DEFAULT_PASSWORD_RESET_RULE,
			api: DEFAULT_API_RULE,
		}
	}
}

/// Rate limiting configuration layer (partial, for merging).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RateLimitConfigLayer {
	#[serde(default)]
	pub backend: Option<RateLimitBackend>,
	#[serde(default)]
	pub login: Option<RateLimitRuleLayer>,
	#[serde(default)]
	pub password_reset: Option<RateLimitRuleLayer>,
	#[serde(default)]
	pub api: Option<RateLimitRuleLayer>,
}

impl RateLimitConfigLayer {
	pub fn merge(&mut self, other: RateLimitConfigLayer) {
		if other.backend.is_some() {
			self.backend = other.backend;
		}
		merge_rule(&mut self.login, other.login);
		merge_rule(&mut self.password_reset, other.password_reset);
		merge_rule(&mut self.api, other.api);
	}

	pub fn finalize(self) -> Result<RateLimitConfig, ConfigError> {
		Ok(RateLimitConfig {
			backend: self.backend.unwrap_or_default(),
			login: self
				.login
				.unwrap_or_default()
				.finalize("login", DEFAULT_LOGIN_RULE)?,
			password_reset: self
				.password_reset
				.unwrap_or_default()
				.finalize("password_reset", DEFAULT_PASSWORD_RESET_RULE)?,
			api: self
				.api
				.unwrap_or_default()
				.finalize("api", DEFAULT_API_RULE)?,
		})
	}
}

fn merge_rule(base: &mut Option<RateLimitRuleLayer>, other: Option<RateLimitRuleLayer>) {
	match (base.as_mut(), other) {
		(Some(b), Some(o)) => b.merge(o),
		(None, Some(o)) => *base = Some(o),
		(_, None) => {}
	}
}

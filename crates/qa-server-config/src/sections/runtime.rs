// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Deployment environment.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::ConfigError;

/// Where the process is running. Drives how strictly key material is checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
	#[default]
	Development,
	Test,
	Staging,
	Production,
}

impl Environment {
	/// Staging and production hold real customer secrets.
	pub fn is_production_like(self) -> bool {
		matches!(self, Environment::Staging | Environment::Production)
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Environment::Development => "development",
			Environment::Test => "test",
			Environment::Staging => "staging",
			Environment::Production => "production",
		}
	}
}

impl fmt::Display for Environment {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Environment {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"development" | "dev" => Ok(Environment::Development),
			"test" => Ok(Environment::Test),
			"staging" => Ok(Environment::Staging),
			"production" | "prod" => Ok(Environment::Production),
			other => Err(ConfigError::InvalidValue {
				key: "QA_STUDIO_ENV".to_string(),
				message: format!(
					"unknown environment '{other}' (expected development, test, staging or production)"
				),
			}),
		}
	}
}

/// Runtime configuration (runtime, fully resolved).
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
	pub environment: Environment,
}

/// Runtime configuration layer (partial, for merging).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuntimeConfigLayer {
	#[serde(default)]
	pub environment: Option<Environment>,
}

impl RuntimeConfigLayer {
	pub fn merge(&mut self, other: RuntimeConfigLayer) {
		if other.environment.is_some() {
			self.environment = other.environment;
		}
	}

	pub fn finalize(self) -> RuntimeConfig {
		RuntimeConfig {
			environment: self.environment.unwrap_or_default(),
		}
	}
}

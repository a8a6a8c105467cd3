// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Partial configuration merged across sources.

use serde::Deserialize;

use crate::sections::{
	DatabaseConfigLayer, EncryptionConfigLayer, LoggingConfigLayer, RateLimitConfigLayer,
	RuntimeConfigLayer,
};

/// One source's view of the configuration. Every section is optional so that
/// later sources only override what they actually set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfigLayer {
	#[serde(default)]
	pub runtime: Option<RuntimeConfigLayer>,
	#[serde(default)]
	pub database: Option<DatabaseConfigLayer>,
	#[serde(default)]
	pub encryption: Option<EncryptionConfigLayer>,
	#[serde(default)]
	pub rate_limit: Option<RateLimitConfigLayer>,
	#[serde(default)]
	pub logging: Option<LoggingConfigLayer>,
}

impl ServerConfigLayer {
	/// Merge `other` on top of `self`; `other` wins field by field.
	pub fn merge(&mut self, other: ServerConfigLayer) {
		merge_option(&mut self.runtime, other.runtime, RuntimeConfigLayer::merge);
		merge_option(&mut self.database, other.database, DatabaseConfigLayer::merge);
		merge_option(
			&mut self.encryption,
			other.encryption,
			EncryptionConfigLayer::merge,
		);
		merge_option(
			&mut self.rate_limit,
			other.rate_limit,
			RateLimitConfigLayer::merge,
		);
		merge_option(&mut self.logging, other.logging, LoggingConfigLayer::merge);
	}
}

fn merge_option<T>(base: &mut Option<T>, other: Option<T>, merge: impl FnOnce(&mut T, T)) {
	match (base.as_mut(), other) {
		(Some(b), Some(o)) => merge(b, o),
		(None, Some(o)) => *base = Some(o),
		(_, None) => {}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::sections::Environment;

	#[test]
	fn test_merge_fills_missing_sections() {
		let mut base = ServerConfigLayer::default();
		base.merge(ServerConfigLayer {
			database: Some(DatabaseConfigLayer {
				url: Some("sqlite::memory:".to_string()),
			}),
			..Default::default()
		});
		assert_eq!(
			base.database.and_then(|d| d.url).as_deref(),
			Some("sqlite::memory:")
		);
	}

	#[test]
	fn test_merge_keeps_base_when_other_unset() {
		let mut base = ServerConfigLayer {
			runtime: Some(RuntimeConfigLayer {
				environment: Some(Environment::Staging),
			}),
			..Default::default()
		};
		base.merge(ServerConfigLayer {
			runtime: Some(RuntimeConfigLayer { environment: None }),
			..Default::default()
		});
		assert_eq!(
			base.runtime.and_then(|r| r.environment),
			Some(Environment::Staging)
		);
	}

	#[test]
	fn test_parse_full_toml() {
		let layer: ServerConfigLayer = toml::from_str(
			r#"
			[runtime]
			environment = "production"

			[database]
			url = "sqlite:/var/lib/qa-studio/qa.db"

			[encryption]
			current_version = 2

			[rate_limit.api]
			limit = 250

			[logging]
			format = "json"
			"#,
		)
		.unwrap();
		assert_eq!(
			layer.encryption.and_then(|e| e.current_version),
			Some(2)
		);
		assert_eq!(
			layer
				.rate_limit
				.and_then(|r| r.api)
				.and_then(|a| a.limit),
			Some(250)
		);
	}
}

// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Centralized configuration management for QA Studio server components.
//!
//! This crate provides:
//! - Layered configuration from multiple sources (defaults, TOML file, environment)
//! - Encryption key loading and validation, done once at startup
//! - Consistent environment variable naming (`QA_STUDIO_*`)
//!
//! # Usage
//!
//! ```ignore
//! use qa_server_config::load_config;
//!
//! let config = load_config()?;
//! println!("current key version: v{}", config.encryption.current_version());
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

use std::collections::BTreeMap;

pub use error::ConfigError;
pub use layer::ServerConfigLayer;
pub use qa_common_config::SecretString;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use qa_common_config::{load_secret_env, load_versioned_secret_env};
use tracing::{debug, info};

/// Fully resolved server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
	pub runtime: RuntimeConfig,
	pub database: DatabaseConfig,
	pub encryption: EncryptionConfig,
	pub rate_limit: RateLimitConfig,
	pub logging: LoggingConfig,
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`QA_STUDIO_*`)
/// 2. Config file (`/etc/qa-studio/server.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration from environment only (for testing or simple deployments).
pub fn load_config_from_env() -> Result<ServerConfig, ConfigError> {
	let mut merged = ServerConfigLayer::default();
	merged.merge(EnvSource.load()?);
	finalize(merged)
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

fn load_from_sources(mut sources: Vec<Box<dyn ConfigSource>>) -> Result<ServerConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = ServerConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		let layer = source.load()?;
		merged.merge(layer);
	}

	finalize(merged)
}

/// Read every configured encryption key from the environment.
///
/// Combines `QA_STUDIO_ENCRYPTION_KEY_V{N}` (and `_FILE`) with the older
/// unversioned `QA_STUDIO_ENCRYPTION_KEY`, which is version 1.
pub fn load_encryption_keys() -> Result<BTreeMap<u32, SecretString>, ConfigError> {
	let versioned = load_versioned_secret_env(ENCRYPTION_KEY_ENV)
		.map_err(|e| ConfigError::Secret(e.to_string()))?;
	let legacy =
		load_secret_env(ENCRYPTION_KEY_ENV).map_err(|e| ConfigError::Secret(e.to_string()))?;
	let keys = merge_legacy_key(versioned, legacy)?;
	debug!(versions = ?keys.keys().collect::<Vec<_>>(), "loaded encryption keys from environment");
	Ok(keys)
}

/// Finalize configuration layer into resolved config, reading keys from the environment.
fn finalize(layer: ServerConfigLayer) -> Result<ServerConfig, ConfigError> {
	let keys = load_encryption_keys()?;
	finalize_with_keys(layer, keys)
}

/// Finalize a merged layer with explicitly supplied key material.
pub fn finalize_with_keys(
	layer: ServerConfigLayer,
	keys: BTreeMap<u32, SecretString>,
) -> Result<ServerConfig, ConfigError> {
	let runtime = layer.runtime.unwrap_or_default().finalize();
	let database = layer.database.unwrap_or_default().finalize();
	let rate_limit = layer.rate_limit.unwrap_or_default().finalize()?;
	let logging = layer.logging.unwrap_or_default().finalize();
	let encryption = layer
		.encryption
		.unwrap_or_default()
		.finalize(keys, runtime.environment)?;

	info!(
		environment = %runtime.environment,
		database = %database.url,
		key_versions = ?encryption.versions(),
		current_key_version = encryption.current_version(),
		rate_limit_backend = %rate_limit.backend,
		"Server configuration loaded"
	);

	Ok(ServerConfig {
		runtime,
		database,
		encryption,
		rate_limit,
		logging,
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	const KEY_V1: &str = "6f1c0e8b9a4d2f73c5e18a90b4d67e2f3a9c1b0d8e7f6a5b4c3d2e1f0a9b8c7d";
	const KEY_V2: &str = "9e3b7a1f0c4d8e2a6b5f1c0d9e8a7b6c5d4e3f2a1b0c9d8e7f6a5b4c3d2e1f0a";

	fn keys(entries: &[(u32, &str)]) -> BTreeMap<u32, SecretString> {
		entries
			.iter()
			.map(|(v, k)| (*v, SecretString::new(k.to_string())))
			.collect()
	}

	#[test]
	fn test_finalize_defaults() {
		let config = finalize_with_keys(ServerConfigLayer::default(), keys(&[(1, KEY_V1)])).unwrap();
		assert_eq!(config.runtime.environment, Environment::Development);
		assert_eq!(config.database.url, "sqlite:./qa-studio.db");
		assert_eq!(config.encryption.current_version(), 1);
		assert_eq!(config.rate_limit.backend, RateLimitBackend::Sqlite);
	}

	#[test]
	fn test_finalize_without_keys_fails() {
		let err = finalize_with_keys(ServerConfigLayer::default(), BTreeMap::new()).unwrap_err();
		assert!(matches!(err, ConfigError::MissingEncryptionKey(_)));
	}

	#[test]
	fn test_production_rejects_weak_key() {
		let layer = ServerConfigLayer {
			runtime: Some(RuntimeConfigLayer {
				environment: Some(Environment::Production),
			}),
			..Default::default()
		};
		let weak = "0".repeat(KEY_HEX_LEN);
		let err = finalize_with_keys(layer, keys(&[(1, &weak)])).unwrap_err();
		assert!(matches!(
			err,
			ConfigError::InvalidEncryptionKey { version: 1, .. }
		));
	}

	#[test]
	fn test_current_version_from_layer() {
		let layer = ServerConfigLayer {
			encryption: Some(EncryptionConfigLayer {
				current_version: Some(1),
			}),
			..Default::default()
		};
		let config = finalize_with_keys(layer, keys(&[(1, KEY_V1), (2, KEY_V2)])).unwrap();
		assert_eq!(config.encryption.current_version(), 1);
	}

	#[test]
	fn test_config_debug_never_prints_keys() {
		let config = finalize_with_keys(ServerConfigLayer::default(), keys(&[(1, KEY_V1)])).unwrap();
		assert!(!format!("{config:?}").contains(KEY_V1));
	}
}

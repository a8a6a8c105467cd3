// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Environment variable helpers for loading secrets.
//!
//! Every secret can be given directly (`VAR`) or as a path to a file holding
//! it (`VAR_FILE`), the convention used by Docker and Kubernetes secret
//! mounts. Encryption keys are additionally versioned: `VAR_V1`, `VAR_V2`, ...
//! each follow the same `VAR` / `VAR_FILE` rule.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::{env, fs};

use qa_common_secret::Secret;
use thiserror::Error;

/// Errors that can occur when loading secrets from environment variables.
#[derive(Debug, Error)]
pub enum SecretEnvError {
	#[error("failed to read secret file at {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("secret file path in {var} is empty")]
	EmptyPath { var: String },

	#[error("invalid key version in {var}: versions start at 1")]
	InvalidVersion { var: String },

	#[error("both {var} and {file_var} are set; set only one")]
	Conflict { var: String, file_var: String },
}

/// Load a secret using the `VAR` / `VAR_FILE` convention.
///
/// Setting both is an error. Trailing `\n` / `\r\n` is stripped from file
/// contents. Returns `Ok(None)` when neither is set.
pub fn load_secret_env(var: &str) -> Result<Option<Secret<String>>, SecretEnvError> {
	let file_var = format!("{var}_FILE");

	if env::var_os(var).is_some() && env::var_os(&file_var).is_some() {
		return Err(SecretEnvError::Conflict {
			var: var.to_string(),
			file_var,
		});
	}

	if let Ok(path_str) = env::var(&file_var) {
		if path_str.is_empty() {
			return Err(SecretEnvError::EmptyPath { var: file_var });
		}

		let path = PathBuf::from(&path_str);
		let content = fs::read_to_string(&path).map_err(|e| SecretEnvError::Io {
			path: path.clone(),
			source: e,
		})?;

		let secret = content.trim_end_matches(['\r', '\n']).to_string();
		return Ok(Some(Secret::new(secret)));
	}

	if let Ok(value) = env::var(var) {
		return Ok(Some(Secret::new(value)));
	}

	Ok(None)
}

/// Load a secret that must be present.
pub fn require_secret_env(var: &str) -> Result<Secret<String>, RequiredSecretError> {
	load_secret_env(var)
		.map_err(RequiredSecretError::Load)?
		.ok_or_else(|| RequiredSecretError::Missing {
			var: var.to_string(),
			file_var: format!("{var}_FILE"),
		})
}

/// Error returned when a required secret is not found.
#[derive(Debug, Error)]
pub enum RequiredSecretError {
	#[error("required secret not found: set either {var} or {file_var}")]
	Missing { var: String, file_var: String },

	#[error(transparent)]
	Load(#[from] SecretEnvError),
}

/// Discover every versioned secret `{base}_V{N}` (or `{base}_V{N}_FILE`).
///
/// Variables whose suffix after `_V` is not a plain decimal number are
/// ignored, so `{base}_VERSION` does not collide with key material.
///
/// ```no_run
/// use qa_common_config::load_versioned_secret_env;
///
/// // QA_STUDIO_ENCRYPTION_KEY_V1=..., QA_STUDIO_ENCRYPTION_KEY_V2_FILE=/run/secrets/key_v2
/// let keys = load_versioned_secret_env("QA_STUDIO_ENCRYPTION_KEY")?;
/// for (version, key) in &keys {
///     println!("v{version}: {key}"); // prints "[REDACTED]"
/// }
/// # Ok::<(), qa_common_config::SecretEnvError>(())
/// ```
pub fn load_versioned_secret_env(
	base: &str,
) -> Result<BTreeMap<u32, Secret<String>>, SecretEnvError> {
	let prefix = format!("{base}_V");
	let mut versions = Vec::new();

	for (name, _) in env::vars_os() {
		let Some(name) = name.to_str() else {
			continue;
		};
		let Some(rest) = name.strip_prefix(&prefix) else {
			continue;
		};
		let digits = rest.strip_suffix("_FILE").unwrap_or(rest);
		if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
			continue;
		}
		match digits.parse::<u32>() {
			Ok(0) | Err(_) => {
				return Err(SecretEnvError::InvalidVersion {
					var: name.to_string(),
				})
			}
			Ok(version) => versions.push(version),
		}
	}

	let mut secrets = BTreeMap::new();
	for version in versions {
		if secrets.contains_key(&version) {
			continue;
		}
		if let Some(secret) = load_secret_env(&format!("{prefix}{version}"))? {
			secrets.insert(version, secret);
		}
	}

	Ok(secrets)
}

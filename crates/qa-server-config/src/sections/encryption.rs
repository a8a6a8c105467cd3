// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Encryption key configuration.
//!
//! Key material only ever comes from the environment (`VAR` or `VAR_FILE`),
//! never from the TOML file:
//!
//! - `QA_STUDIO_ENCRYPTION_KEY_V{N}`: key for version `N`
//! - `QA_STUDIO_ENCRYPTION_KEY`: older single-key name, treated as version 1
//! - `QA_STUDIO_ENCRYPTION_KEY_VERSION`: current version (defaults to the
//!   highest configured)
//!
//! Every key is validated here, once, before anything is encrypted.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use qa_common_config::SecretString;
use serde::Deserialize;
use tracing::warn;

use crate::error::ConfigError;
use crate::sections::Environment;

/// Base name of the key environment variables.
pub const ENCRYPTION_KEY_ENV: &str = "QA_STUDIO_ENCRYPTION_KEY";

/// Version bound to the unversioned variable and to legacy envelopes.
pub const LEGACY_KEY_VERSION: u32 = 1;

/// 32 bytes, hex encoded.
pub const KEY_HEX_LEN: usize = 64;

/// Random keys land near 3.75 bits per hex digit; patterned keys far below.
const MIN_KEY_ENTROPY_BITS: f64 = 3.0;

/// Keys copied from documentation and tutorials.
const KNOWN_EXAMPLE_KEYS: &[&str] = &[
	"0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef",
	"fedcba9876543210fedcba9876543210fedcba9876543210fedcba9876543210",
	"1234567890abcdef1234567890abcdef1234567890abcdef1234567890abcdef",
	"abcdef0123456789abcdef0123456789abcdef0123456789abcdef0123456789",
];

/// Why a well-formed key was judged unsafe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyWeakness {
	KnownExample,
	LowEntropy,
}

impl fmt::Display for KeyWeakness {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			KeyWeakness::KnownExample => f.write_str("key matches a published example key"),
			KeyWeakness::LowEntropy => f.write_str("key has too little entropy to be random"),
		}
	}
}

/// Encryption configuration (runtime, fully resolved).
#[derive(Clone)]
pub struct EncryptionConfig {
	keys: BTreeMap<u32, SecretString>,
	current_version: u32,
}

impl EncryptionConfig {
	/// Validate key material and pick the current version.
	///
	/// Malformed keys are always rejected. Example or low-entropy keys are
	/// rejected in staging and production and logged elsewhere.
	pub fn new(
		keys: BTreeMap<u32, SecretString>,
		current_version: Option<u32>,
		environment: Environment,
	) -> Result<Self, ConfigError> {
		let Some(&highest) = keys.keys().next_back() else {
			return Err(ConfigError::MissingEncryptionKey(ENCRYPTION_KEY_ENV));
		};

		for (&version, key) in &keys {
			if version == 0 {
				return Err(ConfigError::InvalidEncryptionKey {
					version,
					message: "versions start at 1".to_string(),
				});
			}
			validate_key_format(version, key)?;
			if let Some(weakness) = key_weakness(key) {
				if environment.is_production_like() {
					return Err(ConfigError::InvalidEncryptionKey {
						version,
						message: format!("{weakness}; refusing to start in {environment}"),
					});
				}
				warn!(
					key_version = version,
					%environment,
					"{weakness}; acceptable only outside staging/production"
				);
			}
		}

		let current_version = current_version.unwrap_or(highest);
		if !keys.contains_key(&current_version) {
			return Err(ConfigError::Validation(format!(
				"current encryption key version {current_version} has no key material \
				 (set {ENCRYPTION_KEY_ENV}_V{current_version})"
			)));
		}

		Ok(Self {
			keys,
			current_version,
		})
	}

	pub fn keys(&self) -> &BTreeMap<u32, SecretString> {
		&self.keys
	}

	pub fn key(&self, version: u32) -> Option<&SecretString> {
		self.keys.get(&version)
	}

	pub fn current_version(&self) -> u32 {
		self.current_version
	}

	pub fn versions(&self) -> Vec<u32> {
		self.keys.keys().copied().collect()
	}
}

impl fmt::Debug for EncryptionConfig {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("EncryptionConfig")
			.field("keys", &self.versions())
			.field("current_version", &self.current_version)
			.finish()
	}
}

/// Encryption configuration layer (partial, for merging).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EncryptionConfigLayer {
	#[serde(default)]
	pub current_version: Option<u32>,
}

impl EncryptionConfigLayer {
	pub fn merge(&mut self, other: EncryptionConfigLayer) {
		if other.current_version.is_some() {
			self.current_version = other.current_version;
		}
	}

	pub fn finalize(
		self,
		keys: BTreeMap<u32, SecretString>,
		environment: Environment,
	) -> Result<EncryptionConfig, ConfigError> {
		EncryptionConfig::new(keys, self.current_version, environment)
	}
}

/// Combine versioned keys with the older unversioned variable.
///
/// The unversioned key maps to [`LEGACY_KEY_VERSION`]; setting it alongside a
/// different `_V1` key is ambiguous and rejected.
pub fn merge_legacy_key(
	mut versioned: BTreeMap<u32, SecretString>,
	legacy: Option<SecretString>,
) -> Result<BTreeMap<u32, SecretString>, ConfigError> {
	if let Some(legacy) = legacy {
		match versioned.get(&LEGACY_KEY_VERSION) {
			Some(existing) if existing != &legacy => {
				return Err(ConfigError::Validation(format!(
					"{ENCRYPTION_KEY_ENV} and {ENCRYPTION_KEY_ENV}_V{LEGACY_KEY_VERSION} are both set \
					 to different keys"
				)));
			}
			Some(_) => {}
			None => {
				versioned.insert(LEGACY_KEY_VERSION, legacy);
			}
		}
	}
	Ok(versioned)
}

fn validate_key_format(version: u32, key: &SecretString) -> Result<(), ConfigError> {
	let raw = key.expose();
	if raw.len() != KEY_HEX_LEN {
		return Err(ConfigError::InvalidEncryptionKey {
			version,
			message: format!(
				"expected {KEY_HEX_LEN} hex characters (32 bytes), got {}",
				raw.len()
			),
		});
	}
	if !raw.bytes().all(|b| b.is_ascii_hexdigit()) {
		return Err(ConfigError::InvalidEncryptionKey {
			version,
			message: "key must contain only hex characters".to_string(),
		});
	}
	Ok(())
}

/// Judge a well-formed key. Returns `None` when it looks random.
pub fn key_weakness(key: &SecretString) -> Option<KeyWeakness> {
	let normalized = key.expose().to_ascii_lowercase();
	if KNOWN_EXAMPLE_KEYS.contains(&normalized.as_str()) {
		return Some(KeyWeakness::KnownExample);
	}
	if shannon_entropy(&normalized) < MIN_KEY_ENTROPY_BITS {
		return Some(KeyWeakness::LowEntropy);
	}
	None
}

/// Bits of entropy per character over the character distribution of `s`.
fn shannon_entropy(s: &str) -> f64 {
	if s.is_empty() {
		return 0.0;
	}
	let mut counts: HashMap<char, usize> = HashMap::new();
	for c in s.chars() {
		*counts.entry(c).or_default() += 1;
	}
	let len = s.chars().count() as f64;
	counts
		.values()
		.map(|&n| {
			let p = n as f64 / len;
			-p * p.log2()
		})
		.sum()
}

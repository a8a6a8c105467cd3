// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Key versions and the registry that resolves them.

use std::collections::BTreeMap;
use std::fmt;

use qa_common_secret::SecretString;
use qa_server_config::EncryptionConfig;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::encryption::{generate_key, KEY_SIZE};
use crate::error::{SecretsError, SecretsResult};

/// Positive key version number, rendered as `v{N}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyVersion(u32);

impl KeyVersion {
	/// Version bound to unversioned legacy envelopes.
	pub const LEGACY: KeyVersion = KeyVersion(1);

	pub fn new(version: u32) -> SecretsResult<Self> {
		if version == 0 {
			return Err(SecretsError::Configuration(
				"key versions start at 1".to_string(),
			));
		}
		Ok(Self(version))
	}

	pub fn get(self) -> u32 {
		self.0
	}
}

impl fmt::Display for KeyVersion {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "v{}", self.0)
	}
}

/// 32 bytes of AES-256 key material, zeroized on drop.
#[derive(Clone)]
pub struct KeyMaterial {
	bytes: Zeroizing<[u8; KEY_SIZE]>,
}

impl KeyMaterial {
	pub fn generate() -> Self {
		Self {
			bytes: generate_key(),
		}
	}

	pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
		Self {
			bytes: Zeroizing::new(bytes),
		}
	}

	/// Decode 64 hex characters (either case).
	pub fn from_hex(hex_key: &str) -> SecretsResult<Self> {
		let decoded = Zeroizing::new(
			hex::decode(hex_key.trim())
				.map_err(|_| SecretsError::Configuration("key is not valid hex".to_string()))?,
		);
		if decoded.len() != KEY_SIZE {
			return Err(SecretsError::InvalidKeySize {
				expected: KEY_SIZE,
				actual: decoded.len(),
			});
		}
		let mut bytes = Zeroizing::new([0u8; KEY_SIZE]);
		bytes.copy_from_slice(&decoded);
		Ok(Self { bytes })
	}

	/// Lowercase hex, suitable for `QA_STUDIO_ENCRYPTION_KEY_V{N}`.
	pub fn to_hex(&self) -> SecretString {
		SecretString::new(hex::encode(self.bytes.as_slice()))
	}

	/// First 8 bytes of SHA-256 over the key, hex encoded. Safe to log.
	pub fn fingerprint(&self) -> String {
		let digest = Sha256::digest(self.bytes.as_slice());
		hex::encode(&digest[..8])
	}

	pub(crate) fn as_bytes(&self) -> &[u8; KEY_SIZE] {
		&self.bytes
	}
}

impl fmt::Debug for KeyMaterial {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("KeyMaterial")
			.field("fingerprint", &self.fingerprint())
			.finish_non_exhaustive()
	}
}

/// Every configured key version, plus which one encrypts new values.
///
/// Immutable once built. Share it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct KeyRegistry {
	keys: BTreeMap<KeyVersion, KeyMaterial>,
	current_version: KeyVersion,
	current_key: KeyMaterial,
}

impl KeyRegistry {
	pub fn new(
		keys: BTreeMap<KeyVersion, KeyMaterial>,
		current_version: KeyVersion,
	) -> SecretsResult<Self> {
		if keys.is_empty() {
			return Err(SecretsError::Configuration(
				"no encryption keys configured".to_string(),
			));
		}
		let current_key = keys
			.get(&current_version)
			.cloned()
			.ok_or(SecretsError::UnsupportedKeyVersion(current_version.get()))?;

		tracing::debug!(
			versions = ?keys.keys().map(|v| v.get()).collect::<Vec<_>>(),
			current_version = current_version.get(),
			fingerprint = %current_key.fingerprint(),
			"key registry built"
		);

		Ok(Self {
			keys,
			current_version,
			current_key,
		})
	}

	/// Decode every key from validated configuration.
	pub fn from_config(config: &EncryptionConfig) -> SecretsResult<Self> {
		let mut keys = BTreeMap::new();
		for (&version, hex_key) in config.keys() {
			let material = KeyMaterial::from_hex(hex_key.expose()).map_err(|e| {
				SecretsError::Configuration(format!("key v{version}: {e}"))
			})?;
			keys.insert(KeyVersion::new(version)?, material);
		}
		Self::new(keys, KeyVersion::new(config.current_version())?)
	}

	pub fn resolve(&self, version: KeyVersion) -> SecretsResult<&KeyMaterial> {
		self.keys
			.get(&version)
			.ok_or(SecretsError::UnsupportedKeyVersion(version.get()))
	}

	pub fn current_version(&self) -> KeyVersion {
		self.current_version
	}

	pub fn current_key(&self) -> &KeyMaterial {
		&self.current_key
	}

	pub fn versions(&self) -> Vec<KeyVersion> {
		self.keys.keys().copied().collect()
	}
}

// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for secret encryption.
//!
//! Messages describe what failed, never the data involved: no plaintext, no
//! key material, no cipher library internals.

use qa_server_db::DbError;

pub type SecretsResult<T> = Result<T, SecretsError>;

#[derive(Debug, thiserror::Error)]
pub enum SecretsError {
	#[error("decryption failed: {0}")]
	Decryption(String),

	#[error("unsupported key version v{0}: no key material configured")]
	UnsupportedKeyVersion(u32),

	#[error("invalid envelope format: {0}")]
	InvalidEnvelopeFormat(String),

	#[error("encryption failed: {0}")]
	Encryption(String),

	#[error("configuration error: {0}")]
	Configuration(String),

	#[error("invalid key size: expected {expected} bytes, got {actual}")]
	InvalidKeySize { expected: usize, actual: usize },

	#[error("database error: {0}")]
	Database(#[from] DbError),
}

impl SecretsError {
	/// Errors caused by this process rather than by the stored value.
	///
	/// Internal errors are logged at `error`; the rest describe bad or
	/// foreign data and are logged at `warn`.
	pub fn is_internal(&self) -> bool {
		matches!(
			self,
			SecretsError::Encryption(_)
				| SecretsError::Configuration(_)
				| SecretsError::InvalidKeySize { .. }
				| SecretsError::Database(_)
		)
	}
}

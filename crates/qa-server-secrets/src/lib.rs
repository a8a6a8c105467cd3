// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! At-rest encryption for QA Studio secrets.
//!
//! Webhook URLs, integration tokens and TOTP seeds are stored as versioned
//! envelopes (`v{N}:{nonce}:{ciphertext}:{tag}`) so key versions can be added
//! and old data rotated without a code change:
//!
//! - [`encryption`]: AES-256-GCM primitives, plus legacy AES-CBC decryption
//! - [`envelope`]: envelope parsing and serialization
//! - [`keys`]: key versions, key material and the [`KeyRegistry`]
//! - [`cipher`]: [`SecretCipher`], the type application code uses
//! - [`rotation`]: the batch job that re-encrypts everything under the current key

pub mod cipher;
pub mod encryption;
pub mod envelope;
pub mod error;
pub mod keys;
pub mod rotation;

pub use cipher::SecretCipher;
pub use envelope::Envelope;
pub use error::{SecretsError, SecretsResult};
pub use keys::{KeyMaterial, KeyRegistry, KeyVersion};
pub use rotation::{
	FailureKind, KeyRotationJob, RotationError, RotationFailure, RotationOptions, RotationReport,
};

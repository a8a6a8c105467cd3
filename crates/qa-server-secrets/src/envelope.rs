// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Self-describing ciphertext envelopes.
//!
//! Two shapes are stored, distinguished by field count:
//!
//! ```text
//! v{N}:{nonce}:{ciphertext}:{tag}   AES-256-GCM under key version N
//! {iv}:{ciphertext}                 AES-256-CBC, legacy, key version 1
//! ```
//!
//! All binary fields are lowercase hex. Only the authenticated shape is ever
//! written.

use std::fmt;
use std::str::FromStr;

use crate::encryption::{BLOCK_SIZE, NONCE_SIZE, TAG_SIZE};
use crate::error::{SecretsError, SecretsResult};
use crate::keys::KeyVersion;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
	Legacy {
		iv: [u8; BLOCK_SIZE],
		ciphertext: Vec<u8>,
	},
	Authenticated {
		version: KeyVersion,
		nonce: [u8; NONCE_SIZE],
		ciphertext: Vec<u8>,
		tag: [u8; TAG_SIZE],
	},
}

impl Envelope {
	pub fn parse(value: &str) -> SecretsResult<Self> {
		let fields: Vec<&str> = value.split(':').collect();
		match fields.as_slice() {
			[iv, ciphertext] => {
				let iv = decode_fixed::<BLOCK_SIZE>(iv, "iv")?;
				let ciphertext = decode_hex(ciphertext, "ciphertext")?;
				if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
					return Err(invalid(
						"legacy ciphertext must be a non-empty multiple of 16 bytes",
					));
				}
				Ok(Envelope::Legacy { iv, ciphertext })
			}
			[version, nonce, ciphertext, tag] => Ok(Envelope::Authenticated {
				version: parse_version(version)?,
				nonce: decode_fixed::<NONCE_SIZE>(nonce, "nonce")?,
				ciphertext: decode_hex(ciphertext, "ciphertext")?,
				tag: decode_fixed::<TAG_SIZE>(tag, "tag")?,
			}),
			_ => Err(invalid("expected 2 or 4 colon-separated fields")),
		}
	}

	pub fn serialize(&self) -> String {
		match self {
			Envelope::Legacy { iv, ciphertext } => {
				format!("{}:{}", hex::encode(iv), hex::encode(ciphertext))
			}
			Envelope::Authenticated {
				version,
				nonce,
				ciphertext,
				tag,
			} => format!(
				"{version}:{}:{}:{}",
				hex::encode(nonce),
				hex::encode(ciphertext),
				hex::encode(tag)
			),
		}
	}

	/// Key version that decrypts this envelope.
	pub fn key_version(&self) -> KeyVersion {
		match self {
			Envelope::Legacy { .. } => KeyVersion::LEGACY,
			Envelope::Authenticated { version, .. } => *version,
		}
	}

	pub fn is_legacy(&self) -> bool {
		matches!(self, Envelope::Legacy { .. })
	}
}

impl fmt::Display for Envelope {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.serialize())
	}
}

impl FromStr for Envelope {
	type Err = SecretsError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Envelope::parse(s)
	}
}

fn invalid(reason: impl Into<String>) -> SecretsError {
	SecretsError::InvalidEnvelopeFormat(reason.into())
}

fn parse_version(field: &str) -> SecretsResult<KeyVersion> {
	let digits = field
		.strip_prefix('v')
		.ok_or_else(|| invalid("version must look like v{N}"))?;
	if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
		return Err(invalid("version must look like v{N}"));
	}
	if digits.starts_with('0') {
		return Err(invalid("version must be a positive number without leading zeros"));
	}
	let version: u32 = digits
		.parse()
		.map_err(|_| invalid("version out of range"))?;
	KeyVersion::new(version).map_err(|_| invalid("version must be positive"))
}

fn decode_hex(field: &str, name: &str) -> SecretsResult<Vec<u8>> {
	if !field.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
		return Err(invalid(format!("{name} must be lowercase hex")));
	}
	hex::decode(field).map_err(|_| invalid(format!("{name} has odd hex length")))
}

fn decode_fixed<const N: usize>(field: &str, name: &str) -> SecretsResult<[u8; N]> {
	let bytes = decode_hex(field, name)?;
	bytes.try_into().map_err(|bytes: Vec<u8>| {
		invalid(format!("{name} must be {N} bytes, got {}", bytes.len()))
	})
}

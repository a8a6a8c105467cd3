// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Cipher primitives.
//!
//! AES-256-GCM with a detached tag for everything written today, and
//! AES-256-CBC/PKCS#7 decryption for values written before envelopes were
//! versioned. CBC is never used to encrypt.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};
use aes_gcm::{
	aead::{AeadInPlace, KeyInit, OsRng},
	Aes256Gcm, Key, Nonce, Tag,
};
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::{SecretsError, SecretsResult};

/// Size of encryption keys in bytes (256 bits for AES-256).
pub const KEY_SIZE: usize = 32;

/// Size of AES-GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;

/// Size of the AES-GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// AES block size; also the legacy CBC IV size.
pub const BLOCK_SIZE: usize = 16;

type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Output of [`seal`].
#[derive(Debug, Clone)]
pub struct SealedData {
	pub nonce: [u8; NONCE_SIZE],
	pub ciphertext: Vec<u8>,
	pub tag: [u8; TAG_SIZE],
}

/// Generate a random encryption key.
pub fn generate_key() -> Zeroizing<[u8; KEY_SIZE]> {
	let mut key = Zeroizing::new([0u8; KEY_SIZE]);
	OsRng.fill_bytes(key.as_mut());
	key
}

/// Generate a random nonce.
///
/// 96-bit random nonces are safe for well under 2^32 encryptions per key.
/// Rotating to a new key version resets that budget.
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
	let mut nonce = [0u8; NONCE_SIZE];
	OsRng.fill_bytes(&mut nonce);
	nonce
}

/// Encrypt `plaintext` under `key` with a fresh nonce.
pub fn seal(key: &[u8; KEY_SIZE], plaintext: &[u8]) -> SecretsResult<SealedData> {
	let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
	let nonce = generate_nonce();

	let mut buffer = plaintext.to_vec();
	let tag = cipher
		.encrypt_in_place_detached(Nonce::from_slice(&nonce), b"", &mut buffer)
		.map_err(|_| SecretsError::Encryption("AES-GCM encryption failed".to_string()))?;

	let mut tag_bytes = [0u8; TAG_SIZE];
	tag_bytes.copy_from_slice(tag.as_slice());

	Ok(SealedData {
		nonce,
		ciphertext: buffer,
		tag: tag_bytes,
	})
}

/// Verify the tag and decrypt. Nothing is returned unless the tag matches.
pub fn open(
	key: &[u8; KEY_SIZE],
	nonce: &[u8; NONCE_SIZE],
	ciphertext: &[u8],
	tag: &[u8; TAG_SIZE],
) -> SecretsResult<Zeroizing<Vec<u8>>> {
	let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

	let mut buffer = Zeroizing::new(ciphertext.to_vec());
	cipher
		.decrypt_in_place_detached(
			Nonce::from_slice(nonce),
			b"",
			buffer.as_mut_slice(),
			Tag::from_slice(tag),
		)
		.map_err(|_| SecretsError::Decryption("authentication tag mismatch".to_string()))?;

	Ok(buffer)
}

/// Decrypt a legacy AES-256-CBC value.
///
/// CBC carries no authentication; a wrong key is only detected when the
/// padding or the UTF-8 check downstream fails.
pub fn open_legacy(
	key: &[u8; KEY_SIZE],
	iv: &[u8; BLOCK_SIZE],
	ciphertext: &[u8],
) -> SecretsResult<Zeroizing<Vec<u8>>> {
	if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
		return Err(SecretsError::Decryption(
			"legacy ciphertext is not a whole number of blocks".to_string(),
		));
	}

	let decryptor = Aes256CbcDec::new_from_slices(key, iv).map_err(|_| {
		SecretsError::InvalidKeySize {
			expected: KEY_SIZE,
			actual: key.len(),
		}
	})?;

	let plaintext = decryptor
		.decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
		.map_err(|_| SecretsError::Decryption("invalid legacy padding".to_string()))?;

	Ok(Zeroizing::new(plaintext))
}

/// Produce a legacy CBC value, for fixtures only.
#[cfg(test)]
pub(crate) fn seal_legacy(
	key: &[u8; KEY_SIZE],
	iv: &[u8; BLOCK_SIZE],
	plaintext: &[u8],
) -> Vec<u8> {
	use aes::cipher::BlockEncryptMut;

	cbc::Encryptor::<aes::Aes256>::new_from_slices(key, iv)
		.unwrap()
		.encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Re-encrypt every stored secret under the current key version.
//!
//! Records are processed independently: a record that cannot be parsed,
//! decrypted or written is reported and the batch moves on. Writes are
//! compare-and-swap, so a value changed by the application mid-rotation is
//! reported as a conflict rather than overwritten.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use qa_server_db::{DbError, EncryptedColumn, EncryptedRecord, EncryptedRecordStore};
use tracing::{error, info, warn};

use crate::cipher::SecretCipher;
use crate::envelope::Envelope;
use crate::error::SecretsError;
use crate::keys::KeyVersion;

#[derive(Debug, thiserror::Error)]
pub enum RotationError {
	#[error("rotation incomplete: {failed} of {total} records failed; keep every old key configured")]
	Incomplete { failed: usize, total: usize },

	#[error("failed to enumerate {column}: {source}")]
	Enumerate {
		column: EncryptedColumn,
		#[source]
		source: DbError,
	},
}

#[derive(Debug, Clone)]
pub struct RotationOptions {
	/// Decrypt only; never write.
	pub dry_run: bool,
	/// Records processed at once. Zero is treated as one.
	pub concurrency: usize,
	pub columns: Vec<EncryptedColumn>,
}

impl Default for RotationOptions {
	fn default() -> Self {
		Self {
			dry_run: false,
			concurrency: 1,
			columns: EncryptedColumn::ALL.to_vec(),
		}
	}
}

/// Why a single record failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
	InvalidEnvelope,
	UnsupportedKeyVersion,
	Decryption,
	Encryption,
	/// The stored value changed or the row disappeared before the write.
	Conflict,
	Database,
}

impl FailureKind {
	fn from_error(error: &SecretsError) -> Self {
		match error {
			SecretsError::InvalidEnvelopeFormat(_) => FailureKind::InvalidEnvelope,
			SecretsError::UnsupportedKeyVersion(_) => FailureKind::UnsupportedKeyVersion,
			SecretsError::Decryption(_) => FailureKind::Decryption,
			SecretsError::Database(_) => FailureKind::Database,
			SecretsError::Encryption(_)
			| SecretsError::Configuration(_)
			| SecretsError::InvalidKeySize { .. } => FailureKind::Encryption,
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			FailureKind::InvalidEnvelope => "invalid_envelope",
			FailureKind::UnsupportedKeyVersion => "unsupported_key_version",
			FailureKind::Decryption => "decryption",
			FailureKind::Encryption => "encryption",
			FailureKind::Conflict => "conflict",
			FailureKind::Database => "database",
		}
	}
}

impl fmt::Display for FailureKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// One record that was not rotated. Never carries plaintext.
#[derive(Debug, Clone)]
pub struct RotationFailure {
	pub column: EncryptedColumn,
	pub record_id: String,
	pub source_version: Option<KeyVersion>,
	pub kind: FailureKind,
	pub message: String,
}

impl fmt::Display for RotationFailure {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} id={} [{}]", self.column, self.record_id, self.kind)?;
		if let Some(version) = self.source_version {
			write!(f, " from {version}")?;
		}
		write!(f, ": {}", self.message)
	}
}

#[derive(Debug, Clone)]
pub struct RotationReport {
	pub target_version: KeyVersion,
	pub dry_run: bool,
	pub total: usize,
	/// Written under the target version.
	pub rotated: usize,
	/// Decrypted successfully in a dry run.
	pub verified: usize,
	/// Records found per source key version (legacy counted under v1).
	pub source_versions: BTreeMap<KeyVersion, usize>,
	pub legacy_records: usize,
	pub failures: Vec<RotationFailure>,
	pub started_at: DateTime<Utc>,
	pub finished_at: DateTime<Utc>,
}

impl RotationReport {
	pub fn succeeded(&self) -> usize {
		self.rotated + self.verified
	}

	pub fn failed(&self) -> usize {
		self.failures.len()
	}

	pub fn is_complete(&self) -> bool {
		self.failures.is_empty()
	}

	/// `Err(Incomplete)` if any record failed.
	pub fn into_result(self) -> Result<RotationReport, RotationError> {
		if self.is_complete() {
			Ok(self)
		} else {
			Err(RotationError::Incomplete {
				failed: self.failed(),
				total: self.total,
			})
		}
	}
}

enum Outcome {
	Rotated,
	Verified,
}

struct RecordResult {
	source_version: Option<KeyVersion>,
	legacy: bool,
	outcome: Result<Outcome, RotationFailure>,
}

pub struct KeyRotationJob {
	cipher: SecretCipher,
	store: Arc<dyn EncryptedRecordStore>,
	options: RotationOptions,
}

impl KeyRotationJob {
	pub fn new(
		cipher: SecretCipher,
		store: Arc<dyn EncryptedRecordStore>,
		options: RotationOptions,
	) -> Self {
		Self {
			cipher,
			store,
			options,
		}
	}

	/// Run the batch. Only enumeration failures abort; per-record failures
	/// are collected in the report.
	#[tracing::instrument(
		skip(self),
		fields(
			target_version = self.cipher.current_version().get(),
			dry_run = self.options.dry_run,
			concurrency = self.options.concurrency,
		)
	)]
	pub async fn run(&self) -> Result<RotationReport, RotationError> {
		let started_at = Utc::now();
		let target_version = self.cipher.current_version();

		let mut records: Vec<EncryptedRecord> = Vec::new();
		for &column in &self.options.columns {
			let found = self
				.store
				.list_encrypted_records(column)
				.await
				.map_err(|source| RotationError::Enumerate { column, source })?;
			info!(%column, count = found.len(), "enumerated encrypted records");
			records.extend(found);
		}

		let total = records.len();
		info!(total, "starting key rotation");

		let results: Vec<RecordResult> = stream::iter(records)
			.map(|record| self.process(record))
			.buffer_unordered(self.options.concurrency.max(1))
			.collect()
			.await;

		let mut report = RotationReport {
			target_version,
			dry_run: self.options.dry_run,
			total,
			rotated: 0,
			verified: 0,
			source_versions: BTreeMap::new(),
			legacy_records: 0,
			failures: Vec::new(),
			started_at,
			finished_at: started_at,
		};

		for result in results {
			if let Some(version) = result.source_version {
				*report.source_versions.entry(version).or_default() += 1;
			}
			if result.legacy {
				report.legacy_records += 1;
			}
			match result.outcome {
				Ok(Outcome::Rotated) => report.rotated += 1,
				Ok(Outcome::Verified) => report.verified += 1,
				Err(failure) => report.failures.push(failure),
			}
		}

		report
			.failures
			.sort_by(|a, b| (a.column, &a.record_id).cmp(&(b.column, &b.record_id)));
		report.finished_at = Utc::now();

		info!(
			total = report.total,
			rotated = report.rotated,
			verified = report.verified,
			failed = report.failed(),
			legacy = report.legacy_records,
			"key rotation finished"
		);

		Ok(report)
	}

	async fn process(&self, record: EncryptedRecord) -> RecordResult {
		let column = record.column;
		let fail = |source_version: Option<KeyVersion>, kind: FailureKind, message: String| {
			RotationFailure {
				column,
				record_id: record.id.clone(),
				source_version,
				kind,
				message,
			}
		};

		let envelope = match Envelope::parse(&record.value) {
			Ok(envelope) => envelope,
			Err(e) => {
				return finish(
					None,
					false,
					Err(fail(None, FailureKind::from_error(&e), e.to_string())),
				)
			}
		};
		let version = Some(envelope.key_version());
		let legacy = envelope.is_legacy();

		let plaintext = match self.cipher.decrypt_envelope(&envelope) {
			Ok(plaintext) => plaintext,
			Err(e) => {
				return finish(
					version,
					legacy,
					Err(fail(version, FailureKind::from_error(&e), e.to_string())),
				)
			}
		};

		if self.options.dry_run {
			return finish(version, legacy, Ok(Outcome::Verified));
		}

		let new_value = match self.cipher.encrypt(plaintext.expose()) {
			Ok(value) => value,
			Err(e) => {
				return finish(
					version,
					legacy,
					Err(fail(version, FailureKind::from_error(&e), e.to_string())),
				)
			}
		};
		drop(plaintext);

		let outcome = match self
			.store
			.update_encrypted_value(column, &record.id, &record.value, &new_value)
			.await
		{
			Ok(true) => Ok(Outcome::Rotated),
			Ok(false) => Err(fail(
				version,
				FailureKind::Conflict,
				"value changed or row removed since it was read".to_string(),
			)),
			Err(e) => Err(fail(version, FailureKind::Database, e.to_string())),
		};

		finish(version, legacy, outcome)
	}
}

fn finish(
	source_version: Option<KeyVersion>,
	legacy: bool,
	outcome: Result<Outcome, RotationFailure>,
) -> RecordResult {
	if let Err(failure) = &outcome {
		match failure.kind {
			FailureKind::Encryption | FailureKind::Database => error!(
				column = %failure.column,
				record_id = %failure.record_id,
				kind = %failure.kind,
				error = %failure.message,
				"record rotation failed"
			),
			_ => warn!(
				column = %failure.column,
				record_id = %failure.record_id,
				kind = %failure.kind,
				error = %failure.message,
				"record rotation failed"
			),
		}
	}
	RecordResult {
		source_version,
		legacy,
		outcome,
	}
}

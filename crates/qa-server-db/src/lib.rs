// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Database layer for QA Studio secret storage.
//!
//! Repositories store encryption envelopes as opaque strings. Encryption and
//! decryption happen in `qa-server-secrets`; this crate never sees plaintext.

pub mod encrypted_field;
pub mod error;
pub mod integration;
pub mod pool;
pub mod rate_limit;
pub mod schema;
pub mod testing;
pub mod two_factor;

pub use encrypted_field::{
	EncryptedColumn, EncryptedRecord, EncryptedRecordStore, SqliteEncryptedRecordStore,
};
pub use error::{DbError, Result};
pub use integration::{Integration, IntegrationKind, IntegrationRepository, NewIntegration};
pub use pool::create_pool;
pub use rate_limit::{RateLimitRepository, WindowRow};
pub use schema::apply_schema;
pub use sqlx::sqlite::SqlitePool;
pub use two_factor::{TwoFactorEnrollment, TwoFactorRepository};

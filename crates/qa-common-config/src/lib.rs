// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Shared configuration primitives for QA Studio crates.
//!
//! - [`Secret<T>`]: redacting wrapper (re-exported from [`qa_common_secret`])
//! - [`load_secret_env`]: load one secret from `VAR` or `VAR_FILE`
//! - [`load_versioned_secret_env`]: discover every `VAR_V{N}` secret, used for
//!   encryption keys that are rotated by version

pub mod env;

pub use qa_common_secret::{Secret, SecretString, REDACTED};

pub use env::{
	load_secret_env, load_versioned_secret_env, require_secret_env, RequiredSecretError,
	SecretEnvError,
};

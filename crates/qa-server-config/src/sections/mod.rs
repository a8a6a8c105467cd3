// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sections.

mod database;
mod encryption;
mod logging;
mod rate_limit;
mod runtime;

pub use database::{DatabaseConfig, DatabaseConfigLayer};
pub use encryption::{
	key_weakness, merge_legacy_key, EncryptionConfig, EncryptionConfigLayer, KeyWeakness,
	ENCRYPTION_KEY_ENV, KEY_HEX_LEN, LEGACY_KEY_VERSION,
};
pub use logging::{LogFormat, LoggingConfig, LoggingConfigLayer};
pub use rate_limit::{
	RateLimitBackend, RateLimitConfig, RateLimitConfigLayer, RateLimitRuleConfig,
	RateLimitRuleLayer, DEFAULT_API_RULE, DEFAULT_LOGIN_RULE, DEFAULT_PASSWORD_RESET_RULE,
};
pub use runtime::{Environment, RuntimeConfig, RuntimeConfigLayer};

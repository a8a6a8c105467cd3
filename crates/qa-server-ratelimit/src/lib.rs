// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Rate limiting for login, password reset and API calls.
//!
//! Limits use a sliding window over recorded hits:
//!
//! ```text
//! drop hits at or before now - window
//! allowed = hits remaining < limit; an allowed hit is recorded at now
//! reset_at = oldest remaining hit + window
//! ```
//!
//! No interval of length `window` ever admits more than `limit` hits, so a
//! burst straddling a boundary gets no extra budget. Denied hits are not
//! recorded.
//!
//! The default store is the shared `rate_limit_hits` table, so every
//! server instance enforces one budget. When it fails, the limiter answers
//! from process-local counters and says so in the logs.

pub mod error;
pub mod limiter;
pub mod memory;
pub mod rules;
pub mod sqlite;
pub mod store;

pub use error::{RateLimitError, Result};
pub use limiter::{RateLimitDecision, RateLimiter};
pub use memory::MemoryCounterStore;
pub use rules::{RateLimitRule, RateLimitRules};
pub use sqlite::SqliteCounterStore;
pub use store::{CounterState, CounterStore};

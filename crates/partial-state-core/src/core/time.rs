// crates/partial-state-core/src/core/time.rs
// ============================================================================
// Module: Partial State Time Model
// Description: Timestamps for partial record expiry.
// Purpose: Keep expiry arithmetic explicit and independent of wall-clock reads.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Partial records that expire carry a unix-millisecond [`Timestamp`]. Stores
//! never read wall-clock time directly; they ask an injected
//! [`crate::interfaces::Clock`], so expiry is replayable under test.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Time Values
// ============================================================================

/// Unix epoch timestamp in milliseconds.
///
/// # Invariants
/// - No validation is performed; monotonicity is a clock responsibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from unix milliseconds.
    #[must_use]
    pub const fn from_unix_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as unix milliseconds.
    #[must_use]
    pub const fn as_unix_millis(self) -> i64 {
        self.0
    }

    /// Returns the timestamp advanced by `millis`, saturating on overflow.
    #[must_use]
    pub fn saturating_add_millis(self, millis: u64) -> Self {
        let delta = i64::try_from(millis).unwrap_or(i64::MAX);
        Self(self.0.saturating_add(delta))
    }

    /// Returns true when a record expiring at `self` is expired at `now`.
    #[must_use]
    pub const fn is_expired_at(self, now: Self) -> bool {
        self.0 < now.0
    }
}

// crates/partial-state-core/src/runtime/clock.rs
// ============================================================================
// Module: Partial State Clocks
// Description: Wall-clock and manually driven time sources.
// Purpose: Feed expiry decisions from an injectable clock.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! [`SystemClock`] reads wall-clock time. [`ManualClock`] only moves when told
//! to, which keeps expiry tests deterministic.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use crate::core::Timestamp;
use crate::interfaces::Clock;

// ============================================================================
// SECTION: System Clock
// ============================================================================

/// Wall-clock time source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX));
        Timestamp::from_unix_millis(millis)
    }
}

// ============================================================================
// SECTION: Manual Clock
// ============================================================================

/// Clock that only advances when instructed.
#[derive(Debug, Default)]
pub struct ManualClock {
    /// Current unix milliseconds.
    millis: AtomicI64,
}

impl ManualClock {
    /// Creates a clock reading `start`.
    #[must_use]
    pub const fn new(start: Timestamp) -> Self {
        Self {
            millis: AtomicI64::new(start.as_unix_millis()),
        }
    }

    /// Sets the current time.
    pub fn set(&self, now: Timestamp) {
        self.millis.store(now.as_unix_millis(), Ordering::SeqCst);
    }

    /// Moves the clock forward by `millis`.
    pub fn advance_millis(&self, millis: u64) {
        let delta = i64::try_from(millis).unwrap_or(i64::MAX);
        let _ = self.millis.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
            Some(current.saturating_add(delta))
        });
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_unix_millis(self.millis.load(Ordering::SeqCst))
    }
}

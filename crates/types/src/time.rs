// Path: crates/types/src/time.rs

//! Timestamp helpers and the `Clock` abstraction.
//!
//! All timestamps in Switchboard are UTC milliseconds since the UNIX epoch.
//! Components never read the wall clock directly; they take a `Clock` so that
//! expiry, cooldown, and window logic is deterministic under test.

use std::time::{SystemTime, UNIX_EPOCH};

/// A UTC timestamp in milliseconds since the UNIX epoch.
pub type TimestampMs = i64;

/// Milliseconds in one day.
pub const DAY_MS: i64 = 24 * 60 * 60 * 1000;
/// Milliseconds in one week.
pub const WEEK_MS: i64 = 7 * DAY_MS;
/// Milliseconds in thirty days, used as the monthly spend window.
pub const MONTH_MS: i64 = 30 * DAY_MS;

/// A source of the current time.
pub trait Clock: Send + Sync {
    /// Returns the current UTC time in milliseconds since the UNIX epoch.
    fn now_ms(&self) -> TimestampMs;
}

/// The production clock backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> TimestampMs {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

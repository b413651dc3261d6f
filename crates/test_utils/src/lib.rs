// Path: crates/test_utils/src/lib.rs
#![forbid(unsafe_code)]

//! Test scaffolding for the Switchboard workspace: a scriptable mock
//! cartridge, a recording notifier, a manual clock, and a one-call wiring
//! helper that assembles an orchestrator over memory stores.

mod cartridge;
mod fixtures;
mod harness;

pub use cartridge::{MockCartridge, ScriptedAction};
pub use fixtures::{identity_spec, low_risk, policy_denying, principal};
pub use harness::{Harness, RecordingNotifier};

use std::sync::atomic::{AtomicI64, Ordering};
use switchboard_types::time::{Clock, TimestampMs};

/// A clock tests can set and advance explicitly.
#[derive(Debug, Default)]
pub struct ManualClock(AtomicI64);

impl ManualClock {
    /// Creates a clock at the given instant.
    pub fn at(now: TimestampMs) -> Self {
        Self(AtomicI64::new(now))
    }

    /// Sets the clock.
    pub fn set(&self, now: TimestampMs) {
        self.0.store(now, Ordering::SeqCst);
    }

    /// Moves the clock forward.
    pub fn advance(&self, delta: TimestampMs) {
        self.0.fetch_add(delta, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> TimestampMs {
        self.0.load(Ordering::SeqCst)
    }
}

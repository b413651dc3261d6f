// Path: crates/telemetry/src/lib.rs
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::unimplemented,
        clippy::todo,
        clippy::indexing_slicing
    )
)]

//! # Switchboard Telemetry
//!
//! Structured logging initialization for the governance spine. Metrics
//! backends hang off the same `tracing` spans; this crate only owns the
//! global subscriber setup.

/// The initialization routine for global structured logging.
pub mod init;

pub use init::init_tracing;

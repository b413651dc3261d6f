// Path: crates/api/src/lib.rs
#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! # Switchboard API
//!
//! Capability traits for the governance spine. Cartridges, stores,
//! notifiers, and interceptors are all trait objects wired together by the
//! lifecycle orchestrator; this crate defines the contracts and nothing
//! else, so plugin and backend crates depend only on `switchboard-types`
//! and this crate.

/// The cartridge plugin contract.
pub mod cartridge;
/// Before/after/error hooks chained around cartridge execution.
pub mod interceptor;
/// Approval notification fan-out.
pub mod notify;
/// Cumulative spend window lookups.
pub mod spend;
/// Polymorphic persistence contracts, one per entity.
pub mod store;

// Path: crates/types/src/lib.rs
#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! # Switchboard Types
//!
//! This crate is the foundational library for Switchboard, containing all core
//! data structures, error types, and configuration objects of the governance
//! spine.
//!
//! ## Architectural Role
//!
//! As the base crate, `switchboard-types` has minimal dependencies and is
//! itself a dependency for almost every other crate in the workspace. This
//! structure prevents circular dependencies and provides a stable, canonical
//! definition for shared types like `ActionEnvelope`, `DecisionTrace`,
//! `ApprovalRequest`, `AuditEntry`, and the error enums.

/// Maximum nesting depth accepted when walking a policy rule tree.
pub const MAX_RULE_DEPTH: usize = 32;
/// Default idempotency replay window for the orchestrator, in milliseconds.
pub const DEFAULT_IDEMPOTENCY_TTL_MS: i64 = 24 * 60 * 60 * 1000; // 24 h

/// A top-level, crate-wide `Result` type alias with a default error type.
pub type Result<T, E = crate::error::CoreError> = std::result::Result<T, E>;

/// Canonical JSON serialization (RFC 8785 subset) and reproducible hashing.
pub mod canonical;
/// Shared configuration structures loaded from the process environment.
pub mod config;
/// Core governance data structures: envelopes, decisions, approvals, audit.
pub mod domain;
/// A unified set of all error types used across the workspace.
pub mod error;
/// Wire-level request and response contracts for the HTTP surface.
pub mod gateway;
/// Identifier generation helpers.
pub mod id;
/// A prelude containing useful extension traits like `OptionExt`.
pub mod prelude;
/// Timestamp helpers and the `Clock` abstraction.
pub mod time;

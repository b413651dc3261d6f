// Path: crates/services/src/lib.rs
#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! # Switchboard Services
//!
//! The engines of the governance spine, composed by the lifecycle
//! orchestrator: identity resolution, rule evaluation, risk scoring, the
//! ordered policy pipeline, the approval state machine, the cartridge
//! registry, the execution guard with its interceptor chain, the
//! hash-chained audit ledger, in-process guardrail state, and notification
//! fan-out.
//!
//! Pure evaluation (resolver, evaluator, scorer, engine) never suspends;
//! everything that touches a store, a cartridge, or a notifier is async and
//! carries a deadline.

/// The approval state machine.
pub mod approval;
/// The hash-chained audit ledger.
pub mod audit;
/// The execution guard and built-in interceptors.
pub mod guard;
/// In-process guardrail counters and the spend ledger.
pub mod guardrail;
/// Identity resolution: spec + overlays -> resolved identity.
pub mod identity;
/// The lifecycle orchestrator.
pub mod lifecycle;
/// Notification fan-out, token buckets, and backoff.
pub mod notify;
/// Rule evaluation, risk scoring, and the ordered policy engine.
pub mod policy;
/// The cartridge registry.
pub mod registry;

// Path: crates/storage/src/lib.rs
#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! # Switchboard Storage
//!
//! In-process store backends for the governance artifacts. These are the
//! single-instance defaults; multi-instance deployments swap in SQL or
//! Redis implementations of the same traits so counters and the audit
//! chain tip are shared.

mod memory;

pub use memory::{
    MemoryApprovalStore, MemoryAuditStore, MemoryCompetenceStore, MemoryEnvelopeStore,
    MemoryIdentityStore, MemoryPolicyStore,
};

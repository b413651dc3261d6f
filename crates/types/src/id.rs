// Path: crates/types/src/id.rs

//! Identifier generation for governance artifacts.
//!
//! Every entity in the system is addressed by a string id with a short type
//! prefix, which keeps logs and audit trails readable without a lookup table.

use uuid::Uuid;

/// Generates a new prefixed identifier, e.g. `env_6f9a...`.
pub fn new_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}

/// Identifier prefix for action envelopes.
pub const ENVELOPE: &str = "env";
/// Identifier prefix for action proposals.
pub const PROPOSAL: &str = "prop";
/// Identifier prefix for decision traces.
pub const DECISION: &str = "dec";
/// Identifier prefix for approval requests.
pub const APPROVAL: &str = "apr";
/// Identifier prefix for audit entries.
pub const AUDIT: &str = "aud";
/// Identifier prefix for trace correlation ids.
pub const TRACE: &str = "trc";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_prefixed_and_unique() {
        let a = new_id(ENVELOPE);
        let b = new_id(ENVELOPE);
        assert!(a.starts_with("env_"));
        assert_ne!(a, b);
    }
}

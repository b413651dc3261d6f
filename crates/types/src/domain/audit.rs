// Path: crates/types/src/domain/audit.rs

//! Hash-chained audit entries.
//!
//! Entries form a tamper-evident chain: each entry's `previous_entry_hash`
//! is the `entry_hash` of the entry before it, and `entry_hash` is the
//! SHA-256 of the entry's canonical JSON form with the `entryHash` field
//! removed. Redaction is applied to the snapshot before hashing, and the
//! list of redacted paths is itself part of the hashed entry.

use super::risk::RiskCategory;
use crate::canonical;
use crate::error::CanonicalError;
use crate::time::TimestampMs;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Current version of the chain-hash scheme.
pub const CHAIN_HASH_VERSION: u32 = 1;
/// Current version of the audit entry schema.
pub const AUDIT_SCHEMA_VERSION: u32 = 1;

/// The kind of actor an audit entry attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorType {
    /// A human user.
    User,
    /// An autonomous agent.
    Agent,
    /// The system itself (expiry sweeps, posture changes).
    System,
}

/// Who may see an entry when audit data is surfaced outward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VisibilityLevel {
    /// Visible to the whole organization.
    #[default]
    Internal,
    /// Visible outside the organization.
    Public,
    /// Visible to compliance roles only.
    Restricted,
}

/// A pointer from an audit entry to a piece of evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidencePointer {
    /// Pointer kind. Inline evidence is hashed and embedded.
    #[serde(rename = "type")]
    pub pointer_type: String,
    /// Canonical hash of the evidence payload.
    pub hash: String,
    /// External storage reference, for non-inline evidence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_ref: Option<String>,
}

impl EvidencePointer {
    /// Builds an inline pointer by hashing the payload canonically.
    pub fn inline(payload: &Value) -> Result<Self, CanonicalError> {
        Ok(Self {
            pointer_type: "inline".into(),
            hash: canonical::canonical_hash_hex(payload)?,
            storage_ref: None,
        })
    }
}

/// One tamper-evident audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    /// Stable identifier.
    pub id: String,
    /// Event name, e.g. `action.executed`.
    pub event_type: String,
    /// When the event occurred.
    pub timestamp: TimestampMs,
    /// The kind of actor.
    pub actor_type: ActorType,
    /// The acting principal or `system`.
    pub actor_id: String,
    /// The kind of entity the event is about.
    pub entity_type: String,
    /// The id of the entity the event is about.
    pub entity_id: String,
    /// Risk category in effect, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_category: Option<RiskCategory>,
    /// Outward visibility.
    #[serde(default)]
    pub visibility_level: VisibilityLevel,
    /// Human-readable summary.
    pub summary: String,
    /// Redacted snapshot of the event payload.
    pub snapshot: Value,
    /// Evidence pointers.
    #[serde(default)]
    pub evidence_pointers: Vec<EvidencePointer>,
    /// Whether redaction removed anything from the snapshot.
    pub redaction_applied: bool,
    /// Dotted paths that were redacted, part of the hashed content.
    #[serde(default)]
    pub redacted_fields: Vec<String>,
    /// Version of the chain-hash scheme.
    pub chain_hash_version: u32,
    /// Version of the entry schema.
    pub schema_version: u32,
    /// SHA-256 of this entry's canonical form minus this field.
    pub entry_hash: String,
    /// The previous entry's hash; `None` only for the first entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_entry_hash: Option<String>,
    /// The envelope this entry belongs to, when any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub envelope_id: Option<String>,
    /// Organization scope, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    /// Correlation id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

impl AuditEntry {
    /// Recomputes the entry hash from the entry's fields.
    ///
    /// The hash covers the canonical JSON form of the entry with the
    /// `entryHash` key removed, so a stored entry verifies iff
    /// `compute_hash() == entry_hash`.
    pub fn compute_hash(&self) -> Result<String, CanonicalError> {
        let mut value = serde_json::to_value(self)
            .map_err(|e| CanonicalError::Serialize(e.to_string()))?;
        if let Some(obj) = value.as_object_mut() {
            obj.remove("entryHash");
        }
        canonical::canonical_hash_hex(&value)
    }
}

/// Well-known audit event names.
pub mod events {
    /// An action was proposed and entered the pipeline.
    pub const ACTION_PROPOSED: &str = "action.proposed";
    /// An action was denied by policy.
    pub const ACTION_DENIED: &str = "action.denied";
    /// An approval request was raised.
    pub const APPROVAL_REQUESTED: &str = "approval.requested";
    /// An approver approved.
    pub const APPROVAL_APPROVED: &str = "approval.approved";
    /// An approver rejected.
    pub const APPROVAL_REJECTED: &str = "approval.rejected";
    /// An approver patched the parameters.
    pub const APPROVAL_PATCHED: &str = "approval.patched";
    /// A pending request expired.
    pub const APPROVAL_EXPIRED: &str = "approval.expired";
    /// An action executed successfully.
    pub const ACTION_EXECUTED: &str = "action.executed";
    /// An action failed after the retry budget.
    pub const ACTION_FAILED: &str = "action.failed";
    /// An undo was requested for an executed action.
    pub const UNDO_REQUESTED: &str = "action.undo_requested";
    /// An executed action was reversed.
    pub const ACTION_UNDONE: &str = "action.undone";
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry() -> AuditEntry {
        AuditEntry {
            id: "aud_1".into(),
            event_type: events::ACTION_EXECUTED.into(),
            timestamp: 1_700_000_000_000,
            actor_type: ActorType::Agent,
            actor_id: "agent_1".into(),
            entity_type: "envelope".into(),
            entity_id: "env_1".into(),
            risk_category: Some(RiskCategory::Low),
            visibility_level: VisibilityLevel::Internal,
            summary: "paused campaign camp_1".into(),
            snapshot: json!({"campaignId": "camp_1"}),
            evidence_pointers: vec![],
            redaction_applied: false,
            redacted_fields: vec![],
            chain_hash_version: CHAIN_HASH_VERSION,
            schema_version: AUDIT_SCHEMA_VERSION,
            entry_hash: String::new(),
            previous_entry_hash: None,
            envelope_id: Some("env_1".into()),
            organization_id: None,
            trace_id: Some("trc_1".into()),
        }
    }

    #[test]
    fn hash_ignores_stored_entry_hash() {
        let mut e = entry();
        let h1 = e.compute_hash().unwrap();
        e.entry_hash = h1.clone();
        // Recomputing over the entry with the hash filled in yields the same
        // digest, because the field is excluded.
        assert_eq!(e.compute_hash().unwrap(), h1);
    }

    #[test]
    fn hash_covers_redaction_metadata() {
        let mut e = entry();
        let h1 = e.compute_hash().unwrap();
        e.redaction_applied = true;
        e.redacted_fields = vec!["parameters.apiKey".into()];
        assert_ne!(e.compute_hash().unwrap(), h1);
    }

    #[test]
    fn inline_evidence_pointer_hashes_payload() {
        let p = EvidencePointer::inline(&json!({"metric": "ctr", "drop": 0.4})).unwrap();
        assert_eq!(p.pointer_type, "inline");
        assert_eq!(p.hash.len(), 64);
    }
}

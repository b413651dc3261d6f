// Path: crates/types/src/domain/approval.rs

//! Approval requests: pending human decisions bound by hash to the frozen
//! action parameters.

use super::risk::RiskCategory;
use crate::time::TimestampMs;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What happens when a pending request reaches its expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExpiredBehavior {
    /// The action is denied on expiry.
    #[default]
    Deny,
    /// The action is executed on expiry.
    Allow,
}

/// Lifecycle states of an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    /// Waiting on a response.
    Pending,
    /// Approved; the orchestrator executes.
    Approved,
    /// Rejected; the envelope is denied.
    Rejected,
    /// Parameters were amended; a fresh pending request was issued.
    Patched,
    /// The expiry passed without a response.
    Expired,
    /// The envelope was cancelled before a response arrived.
    Cancelled,
}

impl ApprovalStatus {
    /// Whether this status permits no further transitions.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// The action a responder takes on a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalAction {
    /// Approve as frozen.
    Approve,
    /// Reject outright.
    Reject,
    /// Amend the parameters; a new request is issued for the amended tuple.
    Patch,
}

/// A pending (or resolved) human decision on one envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    /// Stable identifier.
    pub id: String,
    /// The envelope awaiting the decision.
    pub envelope_id: String,
    /// Human-readable summary of what is being approved.
    pub summary: String,
    /// The risk category computed at evaluation time.
    pub risk_category: RiskCategory,
    /// Canonical hash of the frozen action tuple. Responses must echo it.
    pub binding_hash: String,
    /// Evidence presented to the approver.
    #[serde(default)]
    pub evidence_bundle: Value,
    /// Principals allowed to respond.
    pub approvers: Vec<String>,
    /// Principal allowed to respond after the escalation delay.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_approver: Option<String>,
    /// Delay before the fallback approver may respond, measured from
    /// request creation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalation_delay_ms: Option<i64>,
    /// Creation time.
    pub created_at: TimestampMs,
    /// Expiry deadline.
    pub expires_at: TimestampMs,
    /// What happens at expiry.
    #[serde(default)]
    pub expired_behavior: ExpiredBehavior,
    /// Current state.
    pub status: ApprovalStatus,
    /// Who responded, once resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub responded_by: Option<String>,
    /// When the response arrived.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub responded_at: Option<TimestampMs>,
    /// The amended parameters carried by a patch response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch_value: Option<Value>,
    /// Optimistic-concurrency version.
    pub version: u64,
}

impl ApprovalRequest {
    /// Whether `who` may respond at `now`, honoring the fallback escalation
    /// delay measured from request creation.
    pub fn responder_allowed(&self, who: &str, now: TimestampMs) -> bool {
        if self.approvers.iter().any(|a| a == who) {
            return true;
        }
        if let Some(fallback) = &self.fallback_approver {
            if fallback == who {
                let delay = self.escalation_delay_ms.unwrap_or(0);
                return now >= self.created_at + delay;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> ApprovalRequest {
        ApprovalRequest {
            id: "apr_1".into(),
            envelope_id: "env_1".into(),
            summary: "pause campaign".into(),
            risk_category: RiskCategory::High,
            binding_hash: "abc".into(),
            evidence_bundle: json!({}),
            approvers: vec!["reviewer_1".into()],
            fallback_approver: Some("backup_1".into()),
            escalation_delay_ms: Some(60_000),
            created_at: 1_000,
            expires_at: 100_000,
            expired_behavior: ExpiredBehavior::Deny,
            status: ApprovalStatus::Pending,
            responded_by: None,
            responded_at: None,
            patch_value: None,
            version: 1,
        }
    }

    #[test]
    fn primary_approver_always_allowed() {
        let r = request();
        assert!(r.responder_allowed("reviewer_1", 1_001));
    }

    #[test]
    fn fallback_waits_for_escalation_delay() {
        let r = request();
        assert!(!r.responder_allowed("backup_1", 60_999));
        assert!(r.responder_allowed("backup_1", 61_000));
    }

    #[test]
    fn strangers_never_allowed() {
        let r = request();
        assert!(!r.responder_allowed("mallory", i64::MAX));
    }
}

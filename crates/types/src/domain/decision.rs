// Path: crates/types/src/domain/decision.rs

//! Decision traces: the full ordered evidence for one policy evaluation.

use super::risk::{ApprovalRequirement, RiskScore};
use crate::time::TimestampMs;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The stable code identifying what a check examined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckCode {
    /// The action type is on the principal's forbidden list.
    ForbiddenBehavior,
    /// The action type is on the principal's trust list.
    TrustBehavior,
    /// Informational annotation of the principal's competence record.
    CompetenceTrust,
    /// A guardrail rate limit.
    RateLimit,
    /// A guardrail cooldown on the target entity.
    Cooldown,
    /// The target entity is protected.
    ProtectedEntity,
    /// A per-action or windowed spend ceiling.
    SpendLimit,
    /// A stored policy rule.
    PolicyRule,
    /// The computed risk score.
    RiskScoring,
    /// The composite-risk adjustment.
    CompositeRisk,
    /// The system-wide risk posture.
    SystemPosture,
    /// Delegation-chain annotation for agent-spawned agents.
    DelegationChain,
}

/// The local effect of one check on the evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckEffect {
    /// The check passed or recorded an allow.
    Allow,
    /// The check denied; evaluation stops here.
    Deny,
    /// The check adjusted the evaluation.
    Modify,
    /// The check did not apply.
    Skip,
}

/// One entry in a decision trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionCheck {
    /// What the check examined.
    pub code: CheckCode,
    /// Machine-readable detail for dashboards.
    #[serde(default)]
    pub data: Value,
    /// Human-readable detail.
    pub human_detail: String,
    /// Whether the condition the check looks for was present.
    pub matched: bool,
    /// The check's effect on the evaluation.
    pub effect: CheckEffect,
}

/// The engine's terminal decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinalDecision {
    /// The action may proceed (possibly after approval).
    Allow,
    /// The action is denied.
    Deny,
    /// The action may proceed in modified form.
    Modify,
}

/// Immutable record of one policy evaluation.
///
/// Checks are appended in evaluation order and never mutated. When the final
/// decision is a deny, the denying check is the last one in the list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionTrace {
    /// Stable identifier.
    pub id: String,
    /// Ordered checks.
    pub checks: Vec<DecisionCheck>,
    /// The computed risk score, when evaluation got that far.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub computed_risk_score: Option<RiskScore>,
    /// The terminal decision.
    pub final_decision: FinalDecision,
    /// The approval requirement attached to an allow.
    pub approval_required: ApprovalRequirement,
    /// Human-readable summary of the terminal reason.
    pub explanation: String,
    /// When the evaluation ran.
    pub created_at: TimestampMs,
}

impl DecisionTrace {
    /// The check that terminated evaluation with a deny, if any.
    pub fn denying_check(&self) -> Option<&DecisionCheck> {
        self.checks.iter().find(|c| c.effect == CheckEffect::Deny)
    }
}

// Path: crates/types/src/domain/action.rs

//! Action proposals, lifecycle envelopes, and execution results.

use super::decision::DecisionTrace;
use crate::time::TimestampMs;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A reference to an external entity named by the agent, before resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRef {
    /// The agent-supplied reference: an id, a name, or a partial match.
    pub reference: String,
    /// The entity kind, e.g. `campaign` or `account`.
    pub entity_type: String,
}

/// The outcome of resolving one [`EntityRef`] through a cartridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EntityResolution {
    /// Exactly one entity matched.
    Resolved {
        /// The canonical entity id in the external system.
        entity_id: String,
        /// Human-readable name.
        display_name: String,
        /// Cartridge-supplied detail about the entity.
        #[serde(default)]
        data: Value,
    },
    /// More than one plausible entity matched; the caller must disambiguate.
    Ambiguous {
        /// Candidate entities, each with at least an id and display name.
        alternatives: Vec<Value>,
    },
    /// Nothing matched.
    NotFound,
}

/// A proposed action, as emitted by an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionProposal {
    /// Stable identifier.
    pub id: String,
    /// Namespaced action type, e.g. `ads.campaign.pause`.
    pub action_type: String,
    /// Action parameters as free-form JSON.
    pub parameters: Value,
    /// Evidence the agent supplied for why the action is warranted.
    #[serde(default)]
    pub evidence: Vec<Value>,
    /// The agent's confidence in the proposal, in [0, 1].
    pub confidence: f64,
    /// The inbound message that triggered the proposal, when any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub originating_message_id: Option<String>,
}

/// Lifecycle states of an [`ActionEnvelope`].
///
/// Transitions are monotonic; once an envelope reaches a terminal state
/// (`executed`, `denied`, `failed`, `undone`) it is never mutated again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeStatus {
    /// Created; evaluation in progress.
    Proposed,
    /// Waiting on a human response.
    PendingApproval,
    /// Approved; execution not yet started.
    Approved,
    /// Denied by policy or by a human. Terminal.
    Denied,
    /// Execution in progress.
    Executing,
    /// Executed successfully. Terminal unless undone.
    Executed,
    /// Execution failed after the retry budget. Terminal.
    Failed,
    /// Reversed via its undo recipe. Terminal.
    Undone,
}

impl EnvelopeStatus {
    /// Whether this status permits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Denied | Self::Failed | Self::Undone)
    }

    /// Legal forward transitions. `Executed` is terminal except for the
    /// undo edge.
    pub fn can_transition_to(self, next: EnvelopeStatus) -> bool {
        use EnvelopeStatus::*;
        matches!(
            (self, next),
            (Proposed, PendingApproval)
                | (Proposed, Denied)
                | (Proposed, Executing)
                | (PendingApproval, Approved)
                | (PendingApproval, Denied)
                | (PendingApproval, Executing)
                | (Approved, Executing)
                | (Executing, Executed)
                | (Executing, Failed)
                | (Executed, Undone)
        )
    }
}

impl std::fmt::Display for EnvelopeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Proposed => "proposed",
            Self::PendingApproval => "pending_approval",
            Self::Approved => "approved",
            Self::Denied => "denied",
            Self::Executing => "executing",
            Self::Executed => "executed",
            Self::Failed => "failed",
            Self::Undone => "undone",
        };
        write!(f, "{}", s)
    }
}

/// The per-lifecycle aggregate tying proposal, decisions, approvals, and
/// results together.
///
/// Child records that carry their own mutable state (approval requests,
/// audit entries) are held by id and looked up through their stores; records
/// that are immutable once appended (proposals, decision traces, execution
/// results) are embedded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionEnvelope {
    /// Stable identifier.
    pub id: String,
    /// Monotonic version, incremented on every update.
    pub version: u64,
    /// The acting principal.
    pub principal_id: String,
    /// Organization scope, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    /// The cartridge that owns the action type.
    pub cartridge_id: String,
    /// The action type under governance.
    pub action_type: String,
    /// The current (frozen or patched) action parameters.
    pub parameters: Value,
    /// The inbound message that triggered the lifecycle, when any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incoming_message: Option<Value>,
    /// Proposals attached to this lifecycle.
    #[serde(default)]
    pub proposals: Vec<ActionProposal>,
    /// Resolved external entities, keyed by the original reference.
    #[serde(default)]
    pub resolved_entities: Vec<EntityResolution>,
    /// Optional multi-step plan attached by the agent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<Value>,
    /// Decision traces, in evaluation order.
    #[serde(default)]
    pub decisions: Vec<DecisionTrace>,
    /// Ids of approval requests raised for this envelope.
    #[serde(default)]
    pub approval_request_ids: Vec<String>,
    /// Execution results, in order.
    #[serde(default)]
    pub execution_results: Vec<ExecuteResult>,
    /// Ids of audit entries recorded for this envelope.
    #[serde(default)]
    pub audit_entry_ids: Vec<String>,
    /// Current lifecycle state.
    pub status: EnvelopeStatus,
    /// The envelope this one reverses, for undo lifecycles.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_envelope_id: Option<String>,
    /// Correlation id flowing through logs and audit entries.
    pub trace_id: String,
    /// Creation time.
    pub created_at: TimestampMs,
    /// Last update time.
    pub updated_at: TimestampMs,
}

/// The reverse action attached to an executed result, consumable until
/// `undo_expires_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UndoRecipe {
    /// The action type that reverses the executed one.
    pub action_type: String,
    /// Parameters for the reverse action.
    pub parameters: Value,
    /// Deadline after which the recipe may no longer be used.
    pub undo_expires_at: TimestampMs,
}

/// The outcome of one cartridge execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResult {
    /// Whether the mutation took effect.
    pub success: bool,
    /// Human-readable summary. Post-mutation verification appends
    /// `[verified]` or `[verification pending]`.
    pub summary: String,
    /// References into the external system (object ids, receipt urls).
    #[serde(default)]
    pub external_refs: Vec<String>,
    /// Whether the external system offers a rollback path.
    #[serde(default)]
    pub rollback_available: bool,
    /// Partial failure notes for multi-part actions.
    #[serde(default)]
    pub partial_failures: Vec<String>,
    /// Wall-clock duration of the cartridge call.
    pub duration_ms: u64,
    /// Reverse action, when the cartridge can synthesize one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub undo_recipe: Option<UndoRecipe>,
}

impl ExecuteResult {
    /// A minimal successful result.
    pub fn ok(summary: impl Into<String>) -> Self {
        Self {
            success: true,
            summary: summary.into(),
            external_refs: Vec::new(),
            rollback_available: false,
            partial_failures: Vec::new(),
            duration_ms: 0,
            undo_recipe: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transition_table() {
        use EnvelopeStatus::*;
        assert!(Proposed.can_transition_to(PendingApproval));
        assert!(Proposed.can_transition_to(Denied));
        assert!(PendingApproval.can_transition_to(Approved));
        assert!(Executing.can_transition_to(Failed));
        assert!(Executed.can_transition_to(Undone));
        // No backward or skipping edges.
        assert!(!Denied.can_transition_to(Proposed));
        assert!(!Executed.can_transition_to(Executing));
        assert!(!Failed.can_transition_to(Executed));
        assert!(!Undone.can_transition_to(Executed));
    }

    #[test]
    fn terminal_states() {
        assert!(EnvelopeStatus::Denied.is_terminal());
        assert!(EnvelopeStatus::Failed.is_terminal());
        assert!(EnvelopeStatus::Undone.is_terminal());
        assert!(!EnvelopeStatus::PendingApproval.is_terminal());
    }
}

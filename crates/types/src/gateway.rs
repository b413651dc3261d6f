// Path: crates/types/src/gateway.rs

//! Wire-level request and response contracts for the HTTP surface.
//!
//! The HTTP server itself lives outside the core; these DTOs pin the
//! on-the-wire shapes so every frontend speaks the same dialect. Path
//! shapes are fixed: `POST /api/execute`, `POST /api/approvals/:id/respond`,
//! `GET /api/approvals/pending`, `POST /api/actions/:id/undo`,
//! `GET /api/audit`, `GET /api/audit/verify`.

use crate::domain::{ApprovalAction, EntityRef, ExecuteResult};
use crate::error::{CoreError, ErrorCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The action block of an execute request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionBody {
    /// Namespaced action type.
    pub action_type: String,
    /// Action parameters.
    pub parameters: Value,
    /// Whether the action mutates the external system.
    pub side_effect: bool,
    /// Caller-estimated magnitude, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub magnitude: Option<f64>,
}

/// Body of `POST /api/execute`. Requires an `Idempotency-Key` header.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequestBody {
    /// The acting principal.
    pub actor_id: String,
    /// Organization scope, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    /// The proposed action.
    pub action: ActionBody,
    /// External entities the action refers to.
    #[serde(default)]
    pub entity_refs: Vec<EntityRef>,
    /// The triggering message, when any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Caller-supplied correlation id; generated when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

/// The terminal outcome of a synchronous execute call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecuteOutcome {
    /// The action ran to completion.
    Executed,
    /// The action is held for human approval.
    PendingApproval,
    /// The action was denied.
    Denied,
}

/// Body of a 200 response to `POST /api/execute`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResponseBody {
    /// The terminal outcome.
    pub outcome: ExecuteOutcome,
    /// The envelope created (or replayed) for this call.
    pub envelope_id: String,
    /// Correlation id.
    pub trace_id: String,
    /// The approval request raised, for `PENDING_APPROVAL`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_id: Option<String>,
    /// The binding hash a responder must echo, for `PENDING_APPROVAL`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binding_hash: Option<String>,
    /// Why the action was denied, for `DENIED`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub denied_explanation: Option<String>,
    /// The execution result, for `EXECUTED`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_result: Option<ExecuteResult>,
}

/// Body of `POST /api/approvals/:id/respond`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRespondBody {
    /// Approve, reject, or patch.
    pub action: ApprovalAction,
    /// The responding principal.
    pub responded_by: String,
    /// The binding hash being confirmed. Required for approve and patch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binding_hash: Option<String>,
    /// The amended parameters, for patch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch_value: Option<Value>,
}

/// The shared error body every endpoint uses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    /// Human-readable message.
    pub error: String,
    /// The HTTP status, duplicated for clients that lose it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Structured detail, e.g. clarification alternatives.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorBody {
    /// Renders a core error into the wire shape, sanitizing internals.
    pub fn from_core(err: &CoreError) -> Self {
        let status = err.http_status();
        let (error, details) = match err {
            // Never leak internal detail on a 500.
            CoreError::Fatal(_) => ("internal error".to_string(), None),
            CoreError::NeedsClarification {
                question,
                alternatives,
            } => (
                question.clone(),
                Some(serde_json::json!({
                    "status": "needs_clarification",
                    "alternatives": alternatives,
                })),
            ),
            CoreError::NotFound { .. } => (
                err.to_string(),
                Some(serde_json::json!({"status": "not_found"})),
            ),
            other => (other.to_string(), None),
        };
        Self {
            error,
            status_code: Some(status),
            details,
        }
        .with_code(err.code())
    }

    fn with_code(mut self, code: &str) -> Self {
        let mut details = self
            .details
            .take()
            .unwrap_or_else(|| serde_json::json!({}));
        if let Some(obj) = details.as_object_mut() {
            obj.insert("code".into(), serde_json::json!(code));
        }
        self.details = Some(details);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_errors_are_sanitized() {
        let body = ErrorBody::from_core(&CoreError::Fatal("stack trace here".into()));
        assert_eq!(body.error, "internal error");
        assert_eq!(body.status_code, Some(500));
        assert!(!body.details.unwrap().to_string().contains("stack trace"));
    }

    #[test]
    fn clarification_carries_question_and_alternatives() {
        let body = ErrorBody::from_core(&CoreError::NeedsClarification {
            question: "which campaign?".into(),
            alternatives: vec![serde_json::json!({"id": "camp_1"})],
        });
        assert_eq!(body.status_code, Some(422));
        let details = body.details.unwrap();
        assert_eq!(details["status"], "needs_clarification");
        assert_eq!(details["alternatives"][0]["id"], "camp_1");
    }

    #[test]
    fn outcome_wire_format() {
        let v = serde_json::to_value(ExecuteOutcome::PendingApproval).unwrap();
        assert_eq!(v, serde_json::json!("PENDING_APPROVAL"));
    }
}

// Path: crates/services/src/approval/mod.rs

//! The approval state machine.
//!
//! `pending -> {approved, rejected, patched, expired, cancelled}`, guarded
//! by binding-hash integrity, responder membership (fallback only after the
//! escalation delay), expiry, and optimistic versioning. Responders racing
//! each other are serialized by a compare-and-swap on the request version;
//! losers surface `StaleVersion`.
//!
//! The machine owns the transition itself. The orchestrator layers the
//! envelope-level guards on top (parameter drift, patch schema validation)
//! and drives execution after an approve.

use serde_json::Value;
use std::sync::Arc;
use switchboard_api::store::ApprovalStore;
use switchboard_types::domain::{ApprovalAction, ApprovalRequest, ApprovalStatus};
use switchboard_types::error::CoreError;
use switchboard_types::time::{Clock, TimestampMs};

/// A response to apply to a pending request.
#[derive(Debug, Clone)]
pub struct ApprovalResponse {
    /// Approve, reject, or patch.
    pub action: ApprovalAction,
    /// The responding principal.
    pub responded_by: String,
    /// The binding hash being confirmed. Required for approve and patch.
    pub binding_hash: Option<String>,
    /// The amended parameters, for patch.
    pub patch_value: Option<Value>,
}

/// Drives approval request transitions against the store.
pub struct ApprovalStateMachine {
    store: Arc<dyn ApprovalStore>,
    clock: Arc<dyn Clock>,
}

impl ApprovalStateMachine {
    /// Creates a machine over the given store and clock.
    pub fn new(store: Arc<dyn ApprovalStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Applies a human response to a pending request and returns the
    /// updated record.
    ///
    /// Guard order: existence, pending, expiry, responder membership,
    /// binding hash, then the version CAS. The caller supplies no version;
    /// the CAS uses the version read here, so a racing responder loses with
    /// `StaleVersion`.
    pub async fn respond(
        &self,
        approval_id: &str,
        response: &ApprovalResponse,
    ) -> Result<ApprovalRequest, CoreError> {
        let request = self
            .store
            .get(approval_id)
            .await?
            .ok_or_else(|| CoreError::not_found("approval", approval_id))?;

        if request.status != ApprovalStatus::Pending {
            return Err(CoreError::Validation(format!(
                "approval '{}' is already {:?}",
                approval_id, request.status
            )));
        }

        let now = self.clock.now_ms();
        if now >= request.expires_at {
            // The clock beat the responder; apply the expiry transition and
            // tell them.
            self.transition(request, ApprovalStatus::Expired, None, now, None)
                .await?;
            return Err(CoreError::Validation(format!(
                "approval '{}' has expired",
                approval_id
            )));
        }

        if !request.responder_allowed(&response.responded_by, now) {
            return Err(CoreError::Forbidden(format!(
                "'{}' is not an approver for '{}'",
                response.responded_by, approval_id
            )));
        }

        let next = match response.action {
            ApprovalAction::Approve => {
                self.require_binding_hash(&request, response)?;
                ApprovalStatus::Approved
            }
            ApprovalAction::Reject => ApprovalStatus::Rejected,
            ApprovalAction::Patch => {
                self.require_binding_hash(&request, response)?;
                if response.patch_value.is_none() {
                    return Err(CoreError::Validation(
                        "patch response requires a patchValue".into(),
                    ));
                }
                ApprovalStatus::Patched
            }
        };

        self.transition(
            request,
            next,
            Some(response.responded_by.clone()),
            now,
            response.patch_value.clone(),
        )
        .await
    }

    /// Sweeps pending requests past their expiry and transitions each to
    /// `expired`. Returns the requests that expired in this sweep; the
    /// orchestrator applies each request's `expired_behavior`.
    pub async fn expire_due(&self, now: TimestampMs) -> Result<Vec<ApprovalRequest>, CoreError> {
        let due = self.store.list_expired(now).await?;
        let mut expired = Vec::with_capacity(due.len());
        for request in due {
            match self
                .transition(request, ApprovalStatus::Expired, None, now, None)
                .await
            {
                Ok(updated) => expired.push(updated),
                // A racing responder got there first; skip.
                Err(CoreError::StaleVersion { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(expired)
    }

    /// Cancels a pending request on envelope cancellation.
    pub async fn cancel(&self, approval_id: &str) -> Result<ApprovalRequest, CoreError> {
        let request = self
            .store
            .get(approval_id)
            .await?
            .ok_or_else(|| CoreError::not_found("approval", approval_id))?;
        if request.status.is_terminal() {
            return Err(CoreError::Validation(format!(
                "approval '{}' is already {:?}",
                approval_id, request.status
            )));
        }
        self.transition(
            request,
            ApprovalStatus::Cancelled,
            None,
            self.clock.now_ms(),
            None,
        )
        .await
    }

    fn require_binding_hash(
        &self,
        request: &ApprovalRequest,
        response: &ApprovalResponse,
    ) -> Result<(), CoreError> {
        match response.binding_hash.as_deref() {
            Some(hash) if hash == request.binding_hash => Ok(()),
            _ => Err(CoreError::BindingHashMismatch),
        }
    }

    async fn transition(
        &self,
        mut request: ApprovalRequest,
        next: ApprovalStatus,
        responded_by: Option<String>,
        now: TimestampMs,
        patch_value: Option<Value>,
    ) -> Result<ApprovalRequest, CoreError> {
        let expected = request.version;
        request.status = next;
        request.responded_by = responded_by;
        request.responded_at = Some(now);
        request.patch_value = patch_value;
        request.version += 1;
        self.store.update_state(&request, expected).await?;
        tracing::info!(
            approval = %request.id,
            status = ?request.status,
            version = request.version,
            "approval transitioned"
        );
        Ok(request)
    }
}

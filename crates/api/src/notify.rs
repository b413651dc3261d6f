// Path: crates/api/src/notify.rs

//! Approval notification fan-out.

use async_trait::async_trait;
use switchboard_types::domain::{ApprovalRequest, RiskCategory};
use thiserror::Error;

/// The payload a notifier formats for its channel.
#[derive(Debug, Clone)]
pub struct ApprovalNotification {
    /// The request awaiting a response.
    pub approval_id: String,
    /// The envelope under approval.
    pub envelope_id: String,
    /// Human-readable summary.
    pub summary: String,
    /// The risk category computed at evaluation time.
    pub risk_category: RiskCategory,
    /// The binding hash a responder must echo.
    pub binding_hash: String,
    /// Principals being asked.
    pub approvers: Vec<String>,
    /// Whether this is a reminder for an already-notified request.
    pub is_reminder: bool,
}

impl ApprovalNotification {
    /// Builds the payload for a request.
    pub fn for_request(request: &ApprovalRequest, is_reminder: bool) -> Self {
        Self {
            approval_id: request.id.clone(),
            envelope_id: request.envelope_id.clone(),
            summary: request.summary.clone(),
            risk_category: request.risk_category,
            binding_hash: request.binding_hash.clone(),
            approvers: request.approvers.clone(),
            is_reminder,
        }
    }
}

/// An error from one notification channel. Notification is best-effort:
/// failures are aggregated and logged, never propagated to the caller.
#[derive(Debug, Error)]
#[error("notifier '{notifier}' failed: {message}")]
pub struct NotifyError {
    /// Which notifier failed.
    pub notifier: String,
    /// What went wrong.
    pub message: String,
}

/// One outbound notification channel.
#[async_trait]
pub trait ApprovalNotifier: Send + Sync {
    /// A stable name for logs and failure aggregation.
    fn name(&self) -> &str;

    /// Delivers one notification. May perform I/O; carries the composite
    /// notifier's deadline.
    async fn notify(&self, notification: &ApprovalNotification) -> Result<(), NotifyError>;
}

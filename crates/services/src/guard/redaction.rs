// Path: crates/services/src/guard/redaction.rs

//! The redaction interceptor: scrubs sensitive fields from the execution's
//! audit snapshot before the ledger sees it.
//!
//! Undo recipe parameters are left intact: the reverse action needs them,
//! and they never reach the audit ledger unredacted anyway.

use async_trait::async_trait;
use switchboard_api::interceptor::{ExecutionCall, ExecutionInterceptor};
use switchboard_types::domain::ExecuteResult;
use switchboard_types::error::CoreError;

use crate::audit::Redactor;

/// Strips sensitive fields from the audit snapshot.
pub struct RedactionInterceptor {
    redactor: Redactor,
}

impl RedactionInterceptor {
    /// Creates an interceptor over the given redactor.
    pub fn new(redactor: Redactor) -> Self {
        Self { redactor }
    }
}

impl Default for RedactionInterceptor {
    fn default() -> Self {
        Self::new(Redactor::default())
    }
}

#[async_trait]
impl ExecutionInterceptor for RedactionInterceptor {
    fn name(&self) -> &'static str {
        "redaction"
    }

    async fn after_execute(
        &self,
        call: &mut ExecutionCall,
        _result: &mut ExecuteResult,
    ) -> Result<(), CoreError> {
        let snapshot = std::mem::take(&mut call.audit_snapshot);
        let (scrubbed, paths) = self.redactor.redact(snapshot);
        call.audit_snapshot = scrubbed;
        if !paths.is_empty() {
            tracing::debug!(count = paths.len(), "redacted fields from audit snapshot");
        }
        Ok(())
    }
}

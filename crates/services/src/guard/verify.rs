// Path: crates/services/src/guard/verify.rs

//! The post-mutation verification interceptor.
//!
//! For actions the cartridge declares in its manifest, polls the target
//! entity through the cartridge's read path after a successful execution
//! and annotates the summary with the outcome.

use async_trait::async_trait;
use std::time::Duration;
use switchboard_api::interceptor::{ExecutionCall, ExecutionInterceptor};
use switchboard_types::domain::ExecuteResult;
use switchboard_types::error::CoreError;

/// Suffix appended when the read-back confirms the mutation.
pub const VERIFIED_SUFFIX: &str = " [verified]";
/// Suffix appended when the read-back was inconclusive or unavailable.
pub const PENDING_SUFFIX: &str = " [verification pending]";

/// Verifies mutations by reading the target back through the cartridge.
pub struct VerificationInterceptor {
    read_deadline: Duration,
}

impl VerificationInterceptor {
    /// Creates an interceptor with the given read-back deadline.
    pub fn new(read_deadline: Duration) -> Self {
        Self { read_deadline }
    }
}

impl Default for VerificationInterceptor {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

#[async_trait]
impl ExecutionInterceptor for VerificationInterceptor {
    fn name(&self) -> &'static str {
        "post_mutation_verification"
    }

    async fn after_execute(
        &self,
        call: &mut ExecutionCall,
        result: &mut ExecuteResult,
    ) -> Result<(), CoreError> {
        if !result.success {
            return Ok(());
        }
        // Only verify action kinds the cartridge actually declares; inferred
        // routing may execute actions we cannot reason about.
        if !call.cartridge.manifest().declares(&call.action_type) {
            return Ok(());
        }
        let Some(entity_id) = call.entity_id.clone() else {
            return Ok(());
        };
        if result.summary.ends_with(VERIFIED_SUFFIX) || result.summary.ends_with(PENDING_SUFFIX) {
            return Ok(());
        }

        let snapshot = tokio::time::timeout(
            self.read_deadline,
            call.cartridge.capture_snapshot(&entity_id),
        )
        .await;

        match snapshot {
            Ok(Ok(Some(state))) => {
                result.summary.push_str(VERIFIED_SUFFIX);
                if let Some(obj) = call.audit_snapshot.as_object_mut() {
                    obj.insert("verifiedState".into(), state);
                }
            }
            Ok(Ok(None)) => {
                // The cartridge cannot snapshot this entity.
                result.summary.push_str(PENDING_SUFFIX);
            }
            Ok(Err(err)) => {
                tracing::warn!(entity = %entity_id, %err, "verification read-back failed");
                result.summary.push_str(PENDING_SUFFIX);
            }
            Err(_) => {
                tracing::warn!(entity = %entity_id, "verification read-back timed out");
                result.summary.push_str(PENDING_SUFFIX);
            }
        }
        Ok(())
    }
}

// Path: crates/services/src/guard/mod.rs

//! The execution guard: a deadline-bounded cartridge call wrapped in an
//! ordered interceptor chain.
//!
//! Before-hooks may short-circuit with a finished result (idempotent
//! replay). On failure the error hooks are consulted in order and the
//! first non-`Propagate` disposition wins; the retry interceptor turns
//! transient failures into bounded, backed-off re-attempts. After-hooks
//! run over whatever result survives (verification, redaction).

mod idempotency;
mod redaction;
mod retry;
mod verify;

pub use idempotency::IdempotencyInterceptor;
pub use redaction::RedactionInterceptor;
pub use retry::RetryInterceptor;
pub use verify::VerificationInterceptor;

use std::sync::Arc;
use std::time::Duration;
use switchboard_api::interceptor::{ErrorDisposition, ExecutionCall, ExecutionInterceptor};
use switchboard_types::domain::ExecuteResult;
use switchboard_types::error::{CartridgeError, CoreError};

/// Hard ceiling on attempts regardless of interceptor dispositions.
const ATTEMPT_CEILING: u32 = 10;

/// Wraps cartridge execution in deadlines and the interceptor chain.
pub struct ExecutionGuard {
    interceptors: Vec<Arc<dyn ExecutionInterceptor>>,
    call_deadline: Duration,
}

impl ExecutionGuard {
    /// Creates a guard with the given chain and per-call deadline.
    pub fn new(interceptors: Vec<Arc<dyn ExecutionInterceptor>>, call_deadline: Duration) -> Self {
        Self {
            interceptors,
            call_deadline,
        }
    }

    /// Runs one guarded execution.
    pub async fn execute(&self, mut call: ExecutionCall) -> Result<ExecutionOutcome, CoreError> {
        let started = tokio::time::Instant::now();

        // Before-hooks, in order. The first one returning a result
        // short-circuits the cartridge call.
        let mut result: Option<ExecuteResult> = None;
        for interceptor in &self.interceptors {
            if let Some(short_circuit) = interceptor.before_execute(&mut call).await? {
                tracing::debug!(
                    interceptor = interceptor.name(),
                    action_type = %call.action_type,
                    "execution short-circuited"
                );
                result = Some(short_circuit);
                break;
            }
        }

        let mut result = match result {
            Some(r) => r,
            None => self.attempt_loop(&call).await?,
        };

        if result.duration_ms == 0 {
            result.duration_ms = started.elapsed().as_millis() as u64;
        }

        // After-hooks, in order, over the surviving result.
        for interceptor in &self.interceptors {
            interceptor.after_execute(&mut call, &mut result).await?;
        }

        Ok(ExecutionOutcome {
            result,
            audit_snapshot: call.audit_snapshot,
        })
    }

    /// The attempt loop: run the cartridge under the deadline; on failure,
    /// let the chain decide between retry, recovery, and propagation.
    async fn attempt_loop(&self, call: &ExecutionCall) -> Result<ExecuteResult, CoreError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let outcome = tokio::time::timeout(
                self.call_deadline,
                call.cartridge
                    .execute(&call.action_type, &call.parameters, &call.context),
            )
            .await;

            let error = match outcome {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(e)) => e,
                Err(_) => CartridgeError::Transient(format!(
                    "cartridge call exceeded {} ms deadline",
                    self.call_deadline.as_millis()
                )),
            };

            tracing::warn!(
                action_type = %call.action_type,
                attempt,
                %error,
                "cartridge execution attempt failed"
            );

            if attempt >= ATTEMPT_CEILING {
                return Err(error.into());
            }

            let mut disposition = ErrorDisposition::Propagate;
            for interceptor in &self.interceptors {
                match interceptor.on_error(call, &error, attempt).await {
                    ErrorDisposition::Propagate => continue,
                    other => {
                        disposition = other;
                        break;
                    }
                }
            }

            match disposition {
                ErrorDisposition::Retry { delay_ms } => {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
                ErrorDisposition::Recover(result) => return Ok(result),
                ErrorDisposition::Propagate => return Err(error.into()),
            }
        }
    }
}

/// What a guarded execution produced.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    /// The final result.
    pub result: ExecuteResult,
    /// The snapshot destined for the audit ledger, after hook processing.
    pub audit_snapshot: serde_json::Value,
}

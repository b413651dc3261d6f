// Path: crates/services/src/guard/retry.rs

//! The retry interceptor: bounded, backed-off re-attempts for transient
//! failures.

use async_trait::async_trait;
use switchboard_api::interceptor::{ErrorDisposition, ExecutionCall, ExecutionInterceptor};
use switchboard_types::error::CartridgeError;

use crate::notify::ExponentialBackoff;

/// Retries transient failures with exponential backoff and jitter,
/// honoring an upstream retry-after hint when one is provided.
pub struct RetryInterceptor {
    max_attempts: u32,
    backoff: ExponentialBackoff,
}

impl RetryInterceptor {
    /// Creates an interceptor with the given attempt budget.
    pub fn new(max_attempts: u32, backoff: ExponentialBackoff) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }
}

impl Default for RetryInterceptor {
    fn default() -> Self {
        Self::new(3, ExponentialBackoff::default())
    }
}

#[async_trait]
impl ExecutionInterceptor for RetryInterceptor {
    fn name(&self) -> &'static str {
        "retry"
    }

    async fn on_error(
        &self,
        call: &ExecutionCall,
        error: &CartridgeError,
        attempt: u32,
    ) -> ErrorDisposition {
        if !error.is_retryable() {
            return ErrorDisposition::Propagate;
        }
        if attempt >= self.max_attempts {
            tracing::warn!(
                action_type = %call.action_type,
                attempt,
                "retry budget exhausted"
            );
            return ErrorDisposition::Propagate;
        }
        let delay_ms = match error {
            CartridgeError::RateLimited {
                retry_after_ms: Some(hint),
            } => (*hint).max(0) as u64,
            _ => self.backoff.delay_ms(attempt),
        };
        ErrorDisposition::Retry { delay_ms }
    }
}

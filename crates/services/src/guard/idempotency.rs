// Path: crates/services/src/guard/idempotency.rs

//! The idempotency interceptor: replays prior successful results instead of
//! re-invoking the cartridge.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use switchboard_api::interceptor::{ExecutionCall, ExecutionInterceptor};
use switchboard_types::domain::ExecuteResult;
use switchboard_types::error::CoreError;
use switchboard_types::time::{Clock, TimestampMs};

#[derive(Clone)]
struct CachedResult {
    result: ExecuteResult,
    stored_at: TimestampMs,
}

/// Keys `(envelope_id, action_type, parameter_hash)`; a prior successful
/// result inside the TTL is returned without re-invoking the cartridge.
pub struct IdempotencyInterceptor {
    cache: DashMap<(String, String, String), CachedResult>,
    ttl_ms: i64,
    clock: Arc<dyn Clock>,
}

impl IdempotencyInterceptor {
    /// Creates an interceptor with the given replay TTL.
    pub fn new(ttl_ms: i64, clock: Arc<dyn Clock>) -> Self {
        Self {
            cache: DashMap::new(),
            ttl_ms,
            clock,
        }
    }

    fn key(call: &ExecutionCall) -> (String, String, String) {
        (
            call.context.envelope_id.clone(),
            call.action_type.clone(),
            call.parameter_hash.clone(),
        )
    }
}

#[async_trait]
impl ExecutionInterceptor for IdempotencyInterceptor {
    fn name(&self) -> &'static str {
        "idempotency"
    }

    async fn before_execute(
        &self,
        call: &mut ExecutionCall,
    ) -> Result<Option<ExecuteResult>, CoreError> {
        let key = Self::key(call);
        if let Some(cached) = self.cache.get(&key) {
            let age = self.clock.now_ms() - cached.stored_at;
            if age <= self.ttl_ms {
                tracing::info!(
                    envelope = %call.context.envelope_id,
                    action_type = %call.action_type,
                    "replaying cached execution result"
                );
                return Ok(Some(cached.result.clone()));
            }
            drop(cached);
            self.cache.remove(&key);
        }
        Ok(None)
    }

    async fn after_execute(
        &self,
        call: &mut ExecutionCall,
        result: &mut ExecuteResult,
    ) -> Result<(), CoreError> {
        if result.success {
            self.cache.insert(
                Self::key(call),
                CachedResult {
                    result: result.clone(),
                    stored_at: self.clock.now_ms(),
                },
            );
        }
        Ok(())
    }
}

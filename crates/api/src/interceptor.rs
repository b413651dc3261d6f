// Path: crates/api/src/interceptor.rs

//! Before/after/error hooks chained around cartridge execution.
//!
//! The execution guard drives the chain: `before_execute` hooks run in
//! order and may short-circuit with a finished result (idempotency replay);
//! `after_execute` hooks run in order over the produced result and the
//! audit snapshot (verification, redaction); `on_error` hooks are consulted
//! after a failed attempt and the first non-`Propagate` disposition wins
//! (retry, recovery).

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use switchboard_types::domain::ExecuteResult;
use switchboard_types::error::{CartridgeError, CoreError};

use crate::cartridge::{Cartridge, CartridgeContext};

/// One cartridge execution as seen by the interceptor chain.
#[derive(Clone)]
pub struct ExecutionCall {
    /// The cartridge being invoked.
    pub cartridge: Arc<dyn Cartridge>,
    /// The cartridge id from the manifest.
    pub cartridge_id: String,
    /// The action type being executed.
    pub action_type: String,
    /// The frozen parameters.
    pub parameters: Value,
    /// The canonical hash of the parameters, for idempotency keying.
    pub parameter_hash: String,
    /// The target entity, when the parameters name one.
    pub entity_id: Option<String>,
    /// The per-call context.
    pub context: CartridgeContext,
    /// The snapshot that will reach the audit ledger. Hooks may redact or
    /// annotate it.
    pub audit_snapshot: Value,
}

impl std::fmt::Debug for ExecutionCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionCall")
            .field("cartridge_id", &self.cartridge_id)
            .field("action_type", &self.action_type)
            .field("entity_id", &self.entity_id)
            .finish()
    }
}

/// What the guard does with a failed attempt.
#[derive(Debug, Clone)]
pub enum ErrorDisposition {
    /// Re-attempt after the given delay.
    Retry {
        /// How long to wait before the next attempt.
        delay_ms: u64,
    },
    /// Swallow the error and use this result instead.
    Recover(ExecuteResult),
    /// Let the error propagate (or ask the next hook).
    Propagate,
}

/// A before/after/error hook around cartridge execution.
#[async_trait]
pub trait ExecutionInterceptor: Send + Sync {
    /// A stable name for logs.
    fn name(&self) -> &'static str;

    /// Runs before the cartridge call. Returning a result short-circuits
    /// execution; later before-hooks and the cartridge itself are skipped,
    /// but after-hooks still run.
    async fn before_execute(
        &self,
        call: &mut ExecutionCall,
    ) -> Result<Option<ExecuteResult>, CoreError> {
        let _ = call;
        Ok(None)
    }

    /// Runs after a successful (or short-circuited) execution.
    async fn after_execute(
        &self,
        call: &mut ExecutionCall,
        result: &mut ExecuteResult,
    ) -> Result<(), CoreError> {
        let _ = (call, result);
        Ok(())
    }

    /// Consulted after a failed attempt. `attempt` counts from 1.
    async fn on_error(
        &self,
        call: &ExecutionCall,
        error: &CartridgeError,
        attempt: u32,
    ) -> ErrorDisposition {
        let _ = (call, error, attempt);
        ErrorDisposition::Propagate
    }
}

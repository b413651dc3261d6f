// Path: crates/api/src/cartridge.rs

//! The cartridge plugin contract.
//!
//! A cartridge teaches the core how to resolve entities, enrich context,
//! score risk, and execute actions for one external service. Everything a
//! cartridge does may perform I/O; the orchestrator wraps every call in a
//! deadline and routes execution through the interceptor chain.

use async_trait::async_trait;
use serde_json::{Map, Value};
use switchboard_types::domain::{
    CartridgeManifest, EntityRef, EntityResolution, ExecuteResult, GuardrailConfig, HealthStatus,
    RiskInput,
};
use switchboard_types::error::CartridgeError;
use switchboard_types::time::TimestampMs;

/// Per-call context handed to every cartridge method.
#[derive(Debug, Clone)]
pub struct CartridgeContext {
    /// The envelope driving this call.
    pub envelope_id: String,
    /// The acting principal.
    pub principal_id: String,
    /// Organization scope, when present.
    pub organization_id: Option<String>,
    /// Correlation id for logs.
    pub trace_id: String,
    /// Absolute deadline for the call.
    pub deadline_at: TimestampMs,
    /// Enrichment accumulated earlier in the pipeline.
    pub enrichment: Map<String, Value>,
}

/// A domain plugin for one external service.
///
/// `resolve_entity` and `capture_snapshot` are optional capabilities; the
/// defaults pass references through untouched and decline snapshots.
#[async_trait]
pub trait Cartridge: Send + Sync {
    /// The cartridge's public contract.
    fn manifest(&self) -> CartridgeManifest;

    /// Called once at registration.
    async fn initialize(&self, ctx: &CartridgeContext) -> Result<(), CartridgeError> {
        let _ = ctx;
        Ok(())
    }

    /// Contributes domain context for policy evaluation. Keys land under
    /// `enrichment.*` in the evaluation context.
    async fn enrich_context(
        &self,
        action_type: &str,
        parameters: &Value,
        ctx: &CartridgeContext,
    ) -> Result<Map<String, Value>, CartridgeError> {
        let _ = (action_type, parameters, ctx);
        Ok(Map::new())
    }

    /// Scores the raw risk of one proposed action.
    async fn get_risk_input(
        &self,
        action_type: &str,
        parameters: &Value,
        ctx: &CartridgeContext,
    ) -> Result<RiskInput, CartridgeError>;

    /// Performs the side effect. Only called after policy allows and any
    /// required approval has been granted.
    async fn execute(
        &self,
        action_type: &str,
        parameters: &Value,
        ctx: &CartridgeContext,
    ) -> Result<ExecuteResult, CartridgeError>;

    /// The operational limits the core enforces for this cartridge.
    fn guardrails(&self) -> GuardrailConfig {
        GuardrailConfig::default()
    }

    /// Liveness and capability report.
    async fn health_check(&self) -> HealthStatus {
        HealthStatus::default()
    }

    /// Resolves an agent-supplied entity reference to a canonical id.
    async fn resolve_entity(&self, reference: &EntityRef) -> Result<EntityResolution, CartridgeError> {
        // Default: treat the reference as already canonical.
        Ok(EntityResolution::Resolved {
            entity_id: reference.reference.clone(),
            display_name: reference.reference.clone(),
            data: Value::Null,
        })
    }

    /// Reads back the current state of an entity, used by post-mutation
    /// verification. `None` means the cartridge cannot snapshot.
    async fn capture_snapshot(&self, entity_id: &str) -> Result<Option<Value>, CartridgeError> {
        let _ = entity_id;
        Ok(None)
    }
}

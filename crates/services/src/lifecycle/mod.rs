// Path: crates/services/src/lifecycle/mod.rs

//! The lifecycle orchestrator: the single choke point driving the
//! end-to-end flow.
//!
//! One `execute` call walks the whole pipeline: cartridge routing, entity
//! resolution, context enrichment, risk input, identity resolution, the
//! ordered policy engine, envelope assembly, approval routing with
//! cryptographic parameter binding, guarded execution, competence and
//! spend bookkeeping, and audit emission. The orchestrator is
//! parallel-safe: concurrent calls each build their own envelope and the
//! only cross-call state (guardrail counters, idempotency cache, audit
//! tip) is independently synchronized.

mod composite;

pub use composite::CompositeTracker;

use dashmap::DashMap;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use switchboard_api::cartridge::CartridgeContext;
use switchboard_api::interceptor::ExecutionCall;
use switchboard_api::notify::ApprovalNotification;
use switchboard_api::spend::SpendLookup;
use switchboard_api::store::{
    ApprovalStore, CompetenceStore, EnvelopeStore, IdentityStore, PolicyStore,
};
use switchboard_types::canonical::{self, BindingTuple};
use switchboard_types::config::SystemRiskPosture;
use switchboard_types::domain::{
    events, ActionEnvelope, ActionProposal, ActorType, ApprovalAction, ApprovalRequest,
    ApprovalStatus, CompetenceOutcome, CompetenceRecord, DecisionTrace, EntityRef,
    EntityResolution, EnvelopeStatus, ExecuteResult, ExpiredBehavior, FinalDecision,
    GovernanceProfile, RiskCategory, VisibilityLevel,
};
use switchboard_types::error::CoreError;
use switchboard_types::gateway::ExecuteOutcome;
use switchboard_types::id;
use switchboard_types::prelude::OptionExt;
use switchboard_types::time::{Clock, TimestampMs};

use crate::approval::{ApprovalResponse, ApprovalStateMachine};
use crate::audit::{AuditEvent, AuditLedger};
use crate::guard::ExecutionGuard;
use crate::guardrail::GuardrailState;
use crate::identity::{self, ResolutionContext};
use crate::notify::CompositeNotifier;
use crate::policy::engine::{entity_id_of, spend_amount_of};
use crate::policy::{EngineInput, EvalContextBuilder, PolicyEngine};
use crate::registry::{CartridgeRegistry, RegisteredCartridge};

/// The stores the orchestrator composes.
#[derive(Clone)]
pub struct Stores {
    /// Envelope persistence.
    pub envelopes: Arc<dyn EnvelopeStore>,
    /// Policy persistence.
    pub policies: Arc<dyn PolicyStore>,
    /// Principal, spec, and overlay persistence.
    pub identities: Arc<dyn IdentityStore>,
    /// Approval request persistence.
    pub approvals: Arc<dyn ApprovalStore>,
    /// Competence record persistence.
    pub competence: Arc<dyn CompetenceStore>,
}

/// Orchestrator tunables.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Replay window for the `Idempotency-Key` cache.
    pub idempotency_ttl_ms: i64,
    /// Deadline for any single cartridge call.
    pub call_deadline: Duration,
    /// How long approval requests stay open.
    pub approval_ttl_ms: i64,
    /// Delay before the fallback approver may respond, from creation.
    pub escalation_delay_ms: i64,
    /// Principals asked to approve.
    pub approvers: Vec<String>,
    /// Principal asked after the escalation delay.
    pub fallback_approver: Option<String>,
    /// What happens when an approval expires unanswered.
    pub expired_behavior: ExpiredBehavior,
    /// Window for the composite-risk context.
    pub composite_window_ms: i64,
    /// The operator-set system risk posture.
    pub system_risk_posture: SystemRiskPosture,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            idempotency_ttl_ms: switchboard_types::DEFAULT_IDEMPOTENCY_TTL_MS,
            call_deadline: Duration::from_secs(10),
            approval_ttl_ms: 24 * 60 * 60 * 1000,
            escalation_delay_ms: 4 * 60 * 60 * 1000,
            approvers: Vec::new(),
            fallback_approver: None,
            expired_behavior: ExpiredBehavior::Deny,
            composite_window_ms: 10 * 60 * 1000,
            system_risk_posture: SystemRiskPosture::Normal,
        }
    }
}

/// One action submission, as the frontends hand it to the core.
#[derive(Debug, Clone)]
pub struct ExecuteCommand {
    /// The acting principal.
    pub actor_id: String,
    /// Organization scope, when present.
    pub organization_id: Option<String>,
    /// Namespaced action type.
    pub action_type: String,
    /// Action parameters.
    pub parameters: Value,
    /// Whether the action mutates the external system.
    pub side_effect: bool,
    /// External entities the action refers to.
    pub entity_refs: Vec<EntityRef>,
    /// The triggering message, when any.
    pub message: Option<String>,
    /// Caller-supplied correlation id; generated when absent.
    pub trace_id: Option<String>,
    /// The caller's `Idempotency-Key`. Required.
    pub idempotency_key: String,
    /// The envelope this command reverses, for undo lifecycles.
    pub parent_envelope_id: Option<String>,
}

/// The synchronous answer to one `execute` call.
#[derive(Debug, Clone)]
pub struct ExecuteReport {
    /// The terminal outcome of this call.
    pub outcome: ExecuteOutcome,
    /// The envelope created (or replayed).
    pub envelope_id: String,
    /// Correlation id.
    pub trace_id: String,
    /// The approval raised, for `PendingApproval`.
    pub approval_id: Option<String>,
    /// The binding hash a responder must echo, for `PendingApproval`.
    pub binding_hash: Option<String>,
    /// Why the action was denied, for `Denied`.
    pub denied_explanation: Option<String>,
    /// The execution result, for `Executed`.
    pub execution_result: Option<ExecuteResult>,
}

#[derive(Clone)]
struct IdempotentReplay {
    report: ExecuteReport,
    stored_at: TimestampMs,
}

/// Pipeline state shared by first evaluation and patch re-evaluation.
struct EvaluatedAction {
    cartridge: RegisteredCartridge,
    proposal: ActionProposal,
    trace: DecisionTrace,
    enrichment: Map<String, Value>,
    resolved_entities: Vec<EntityResolution>,
}

/// The single choke point for the per-action lifecycle.
pub struct Orchestrator {
    registry: Arc<CartridgeRegistry>,
    stores: Stores,
    ledger: Arc<AuditLedger>,
    guardrails: Arc<GuardrailState>,
    composite: CompositeTracker,
    spend: Arc<dyn SpendLookup>,
    notifier: Arc<CompositeNotifier>,
    engine: PolicyEngine,
    approval_machine: ApprovalStateMachine,
    guard: ExecutionGuard,
    clock: Arc<dyn Clock>,
    config: OrchestratorConfig,
    idempotency: DashMap<String, IdempotentReplay>,
}

impl Orchestrator {
    /// Wires the orchestrator together.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<CartridgeRegistry>,
        stores: Stores,
        ledger: Arc<AuditLedger>,
        guardrails: Arc<GuardrailState>,
        spend: Arc<dyn SpendLookup>,
        notifier: Arc<CompositeNotifier>,
        guard: ExecutionGuard,
        clock: Arc<dyn Clock>,
        config: OrchestratorConfig,
    ) -> Self {
        let approval_machine = ApprovalStateMachine::new(stores.approvals.clone(), clock.clone());
        Self {
            registry,
            stores,
            ledger,
            guardrails,
            composite: CompositeTracker::new(),
            spend,
            notifier,
            engine: PolicyEngine::default(),
            approval_machine,
            guard,
            clock,
            config,
            idempotency: DashMap::new(),
        }
    }

    // ------------------------------------------------------------------
    // execute
    // ------------------------------------------------------------------

    /// Drives one proposed action through the full lifecycle.
    pub async fn execute(&self, cmd: ExecuteCommand) -> Result<ExecuteReport, CoreError> {
        if cmd.idempotency_key.trim().is_empty() {
            return Err(CoreError::Validation("Idempotency-Key is required".into()));
        }
        let now = self.clock.now_ms();
        if let Some(replay) = self.idempotency.get(&cmd.idempotency_key) {
            if now - replay.stored_at <= self.config.idempotency_ttl_ms {
                tracing::info!(
                    key = %cmd.idempotency_key,
                    envelope = %replay.report.envelope_id,
                    "replaying idempotent execute"
                );
                return Ok(replay.report.clone());
            }
            drop(replay);
            self.idempotency.remove(&cmd.idempotency_key);
        }

        let trace_id = cmd
            .trace_id
            .clone()
            .unwrap_or_else(|| id::new_id(id::TRACE));
        let evaluated = self.evaluate_action(&cmd, &trace_id, now).await?;

        // Assemble the envelope at version 1; its status follows from the
        // decision below.
        let envelope_id = id::new_id(id::ENVELOPE);
        let mut envelope = ActionEnvelope {
            id: envelope_id.clone(),
            version: 1,
            principal_id: cmd.actor_id.clone(),
            organization_id: cmd.organization_id.clone(),
            cartridge_id: evaluated.cartridge.manifest.id.clone(),
            action_type: cmd.action_type.clone(),
            parameters: cmd.parameters.clone(),
            incoming_message: cmd.message.clone().map(Value::String),
            proposals: vec![evaluated.proposal.clone()],
            resolved_entities: evaluated.resolved_entities.clone(),
            plan: None,
            decisions: vec![evaluated.trace.clone()],
            approval_request_ids: Vec::new(),
            execution_results: Vec::new(),
            audit_entry_ids: Vec::new(),
            status: EnvelopeStatus::Proposed,
            parent_envelope_id: cmd.parent_envelope_id.clone(),
            trace_id: trace_id.clone(),
            created_at: now,
            updated_at: now,
        };
        self.stores.envelopes.insert(&envelope).await?;

        let proposed_entry = self
            .record_audit(
                &envelope,
                events::ACTION_PROPOSED,
                ActorType::Agent,
                &cmd.actor_id,
                format!("proposed {}", cmd.action_type),
                json!({ "parameters": cmd.parameters, "confidence": evaluated.proposal.confidence }),
                self.trace_category(&evaluated.trace),
            )
            .await?;
        envelope.audit_entry_ids.push(proposed_entry.id);

        let report = self.dispatch_decision(envelope, &evaluated, &trace_id).await?;
        self.idempotency.insert(
            cmd.idempotency_key.clone(),
            IdempotentReplay {
                report: report.clone(),
                stored_at: now,
            },
        );
        Ok(report)
    }

    /// Steps 1-4 of the flow plus policy evaluation; shared with patch
    /// re-evaluation.
    async fn evaluate_action(
        &self,
        cmd: &ExecuteCommand,
        trace_id: &str,
        now: TimestampMs,
    ) -> Result<EvaluatedAction, CoreError> {
        // 1. Cartridge routing, inferring by prefix when undeclared.
        let cartridge = self.registry.route(&cmd.action_type).ok_or_else(|| {
            CoreError::NeedsClarification {
                question: format!(
                    "no cartridge handles action type '{}'",
                    cmd.action_type
                ),
                alternatives: self
                    .registry
                    .manifests()
                    .into_iter()
                    .map(|m| json!({ "cartridgeId": m.id }))
                    .collect(),
            }
        })?;

        let principal = self
            .stores
            .identities
            .get_principal(&cmd.actor_id)
            .await?
            .required(CoreError::not_found("principal", cmd.actor_id.clone()))?;

        let ctx = CartridgeContext {
            envelope_id: String::new(),
            principal_id: cmd.actor_id.clone(),
            organization_id: cmd.organization_id.clone(),
            trace_id: trace_id.to_string(),
            deadline_at: now + self.config.call_deadline.as_millis() as i64,
            enrichment: Map::new(),
        };

        // 2. Entity resolution. Ambiguity and misses surface to the caller
        // unchanged.
        let mut resolved_entities = Vec::with_capacity(cmd.entity_refs.len());
        for entity_ref in &cmd.entity_refs {
            let resolution = tokio::time::timeout(
                self.config.call_deadline,
                cartridge.cartridge.resolve_entity(entity_ref),
            )
            .await
            .map_err(|_| CoreError::Transient("entity resolution timed out".into()))??;
            match &resolution {
                EntityResolution::Ambiguous { alternatives } => {
                    return Err(CoreError::NeedsClarification {
                        question: format!(
                            "'{}' matches more than one {}",
                            entity_ref.reference, entity_ref.entity_type
                        ),
                        alternatives: alternatives.clone(),
                    });
                }
                EntityResolution::NotFound => {
                    return Err(CoreError::not_found(
                        "entity",
                        entity_ref.reference.clone(),
                    ));
                }
                EntityResolution::Resolved { .. } => resolved_entities.push(resolution),
            }
        }

        // 3. Context enrichment.
        let enrichment = tokio::time::timeout(
            self.config.call_deadline,
            cartridge
                .cartridge
                .enrich_context(&cmd.action_type, &cmd.parameters, &ctx),
        )
        .await
        .map_err(|_| CoreError::Transient("context enrichment timed out".into()))??;

        // 4. Cartridge risk input, then the policy engine.
        let risk_input = tokio::time::timeout(
            self.config.call_deadline,
            cartridge
                .cartridge
                .get_risk_input(&cmd.action_type, &cmd.parameters, &ctx),
        )
        .await
        .map_err(|_| CoreError::Transient("risk input timed out".into()))??;

        let spec = self
            .stores
            .identities
            .get_spec(&cmd.actor_id)
            .await?
            .required(CoreError::not_found("identity spec", cmd.actor_id.clone()))?;
        let overlays = self.stores.identities.list_overlays(&cmd.actor_id).await?;
        let resolved_identity = identity::resolve(
            &spec,
            &overlays,
            &ResolutionContext {
                action_type: &cmd.action_type,
                cartridge_id: &cartridge.manifest.id,
                now,
            },
        );

        let policies = self
            .stores
            .policies
            .list_active(Some(&cartridge.manifest.id), cmd.organization_id.as_deref())
            .await?;
        let competence = self
            .stores
            .competence
            .get(&cmd.actor_id, &cmd.action_type)
            .await?;
        let spend_snapshot = self
            .spend
            .snapshot(&cmd.actor_id, Some(&cartridge.manifest.id), now)
            .await?;
        let composite_ctx =
            self.composite
                .context(&cmd.actor_id, self.config.composite_window_ms, now);

        let proposal = ActionProposal {
            id: id::new_id(id::PROPOSAL),
            action_type: cmd.action_type.clone(),
            parameters: cmd.parameters.clone(),
            evidence: Vec::new(),
            confidence: 1.0,
            originating_message_id: None,
        };

        let eval_context = EvalContextBuilder::new()
            .action(&proposal, cmd.side_effect)
            .principal(&principal)
            .risk(&risk_input)
            .enrichment(&enrichment)
            .time(now)
            .build();

        let posture = effective_posture(
            self.config.system_risk_posture,
            resolved_identity.governance_profile,
        );
        let guardrail_config = cartridge.cartridge.guardrails();
        let trace = self.engine.evaluate(EngineInput {
            proposal: &proposal,
            cartridge_id: &cartridge.manifest.id,
            organization_id: cmd.organization_id.as_deref(),
            identity: &resolved_identity,
            policies: &policies,
            guardrails: &guardrail_config,
            guardrail_view: self.guardrails.as_ref(),
            spend: spend_snapshot,
            competence: competence.as_ref(),
            risk_input: &risk_input,
            composite: &composite_ctx,
            parent_envelope_id: cmd.parent_envelope_id.as_deref(),
            posture,
            eval_context: &eval_context,
            now,
        });

        Ok(EvaluatedAction {
            cartridge,
            proposal,
            trace,
            enrichment,
            resolved_entities,
        })
    }

    /// Step 5: derive the envelope's fate from the decision trace.
    async fn dispatch_decision(
        &self,
        mut envelope: ActionEnvelope,
        evaluated: &EvaluatedAction,
        trace_id: &str,
    ) -> Result<ExecuteReport, CoreError> {
        let trace = &evaluated.trace;
        match trace.final_decision {
            FinalDecision::Deny => {
                self.transition(&mut envelope, EnvelopeStatus::Denied).await?;
                let entry = self
                    .record_audit(
                        &envelope,
                        events::ACTION_DENIED,
                        ActorType::System,
                        "policy-engine",
                        trace.explanation.clone(),
                        json!({ "explanation": trace.explanation }),
                        self.trace_category(trace),
                    )
                    .await?;
                self.attach_audit(&mut envelope, entry.id).await?;
                Ok(ExecuteReport {
                    outcome: ExecuteOutcome::Denied,
                    envelope_id: envelope.id,
                    trace_id: trace_id.to_string(),
                    approval_id: None,
                    binding_hash: None,
                    denied_explanation: Some(trace.explanation.clone()),
                    execution_result: None,
                })
            }
            FinalDecision::Allow | FinalDecision::Modify
                if !trace.approval_required.blocks_execution() =>
            {
                let result = self.run_execution(&mut envelope, evaluated).await?;
                Ok(ExecuteReport {
                    outcome: ExecuteOutcome::Executed,
                    envelope_id: envelope.id,
                    trace_id: trace_id.to_string(),
                    approval_id: None,
                    binding_hash: None,
                    denied_explanation: None,
                    execution_result: Some(result),
                })
            }
            _ => {
                let request = self.raise_approval(&mut envelope, evaluated).await?;
                Ok(ExecuteReport {
                    outcome: ExecuteOutcome::PendingApproval,
                    envelope_id: envelope.id,
                    trace_id: trace_id.to_string(),
                    approval_id: Some(request.id),
                    binding_hash: Some(request.binding_hash),
                    denied_explanation: None,
                    execution_result: None,
                })
            }
        }
    }

    /// Creates the approval request with its binding hash and notifies.
    async fn raise_approval(
        &self,
        envelope: &mut ActionEnvelope,
        evaluated: &EvaluatedAction,
    ) -> Result<ApprovalRequest, CoreError> {
        let now = self.clock.now_ms();
        let category = self.trace_category(&evaluated.trace).unwrap_or_default();
        let binding_hash = canonical::binding_hash(&BindingTuple {
            action_type: &envelope.action_type,
            parameters: &envelope.parameters,
            principal_id: &envelope.principal_id,
            organization_id: envelope.organization_id.as_deref(),
            risk_category: category,
        })?;

        let request = ApprovalRequest {
            id: id::new_id(id::APPROVAL),
            envelope_id: envelope.id.clone(),
            summary: format!(
                "{} by {}: {}",
                envelope.action_type, envelope.principal_id, evaluated.trace.explanation
            ),
            risk_category: category,
            binding_hash,
            evidence_bundle: json!({
                "explanation": evaluated.trace.explanation,
                "riskScore": evaluated.trace.computed_risk_score,
                "parameters": envelope.parameters,
            }),
            approvers: self.config.approvers.clone(),
            fallback_approver: self.config.fallback_approver.clone(),
            escalation_delay_ms: Some(self.config.escalation_delay_ms),
            created_at: now,
            expires_at: now + self.config.approval_ttl_ms,
            expired_behavior: self.config.expired_behavior,
            status: ApprovalStatus::Pending,
            responded_by: None,
            responded_at: None,
            patch_value: None,
            version: 1,
        };
        self.stores.approvals.insert(&request).await?;

        envelope.approval_request_ids.push(request.id.clone());
        self.transition(envelope, EnvelopeStatus::PendingApproval)
            .await?;

        let entry = self
            .record_audit(
                envelope,
                events::APPROVAL_REQUESTED,
                ActorType::System,
                "policy-engine",
                format!("approval requested: {}", request.summary),
                json!({ "approvalId": request.id, "bindingHash": request.binding_hash }),
                Some(category),
            )
            .await?;
        self.attach_audit(envelope, entry.id).await?;

        self.notifier
            .notify_all(&ApprovalNotification::for_request(&request, false))
            .await;

        Ok(request)
    }

    /// Step 7: guarded execution plus all post-execution bookkeeping.
    async fn run_execution(
        &self,
        envelope: &mut ActionEnvelope,
        evaluated: &EvaluatedAction,
    ) -> Result<ExecuteResult, CoreError> {
        self.transition(envelope, EnvelopeStatus::Executing).await?;

        let parameter_hash = canonical::parameter_hash(&envelope.parameters)?;
        let entity_id = entity_id_of(&envelope.parameters).map(String::from);
        let call = ExecutionCall {
            cartridge: evaluated.cartridge.cartridge.clone(),
            cartridge_id: evaluated.cartridge.manifest.id.clone(),
            action_type: envelope.action_type.clone(),
            parameters: envelope.parameters.clone(),
            parameter_hash,
            entity_id: entity_id.clone(),
            context: CartridgeContext {
                envelope_id: envelope.id.clone(),
                principal_id: envelope.principal_id.clone(),
                organization_id: envelope.organization_id.clone(),
                trace_id: envelope.trace_id.clone(),
                deadline_at: self.clock.now_ms() + self.config.call_deadline.as_millis() as i64,
                enrichment: evaluated.enrichment.clone(),
            },
            audit_snapshot: json!({
                "actionType": envelope.action_type,
                "parameters": envelope.parameters,
            }),
        };

        let now = self.clock.now_ms();
        match self.guard.execute(call).await {
            Ok(outcome) => {
                envelope.execution_results.push(outcome.result.clone());
                self.transition(envelope, EnvelopeStatus::Executed).await?;
                self.record_competence(envelope, CompetenceOutcome::Success, now)
                    .await?;
                self.guardrails.record_action(
                    &envelope.principal_id,
                    &envelope.cartridge_id,
                    &envelope.action_type,
                    entity_id.as_deref(),
                    now,
                );
                let exposure = spend_amount_of(&envelope.parameters).unwrap_or(0.0);
                self.composite.record(
                    &envelope.principal_id,
                    &envelope.cartridge_id,
                    entity_id.as_deref(),
                    exposure,
                    now,
                );
                if let Some(amount) = spend_amount_of(&envelope.parameters) {
                    self.spend
                        .record_spend(&envelope.principal_id, &envelope.cartridge_id, amount, now)
                        .await?;
                }
                let entry = self
                    .record_audit(
                        envelope,
                        events::ACTION_EXECUTED,
                        ActorType::Agent,
                        &envelope.principal_id.clone(),
                        outcome.result.summary.clone(),
                        outcome.audit_snapshot,
                        self.trace_category_of(envelope),
                    )
                    .await?;
                self.attach_audit(envelope, entry.id).await?;
                Ok(outcome.result)
            }
            Err(err) => {
                self.transition(envelope, EnvelopeStatus::Failed).await?;
                self.record_competence(envelope, CompetenceOutcome::Failure, now)
                    .await?;
                let entry = self
                    .record_audit(
                        envelope,
                        events::ACTION_FAILED,
                        ActorType::Agent,
                        &envelope.principal_id.clone(),
                        format!("execution failed: {}", err),
                        json!({ "error": err.to_string() }),
                        self.trace_category_of(envelope),
                    )
                    .await?;
                self.attach_audit(envelope, entry.id).await?;
                Err(err)
            }
        }
    }

    // ------------------------------------------------------------------
    // respondToApproval
    // ------------------------------------------------------------------

    /// Applies a human response and, on approve, executes; on patch,
    /// re-evaluates with the amended parameters.
    pub async fn respond_to_approval(
        &self,
        approval_id: &str,
        response: ApprovalResponse,
    ) -> Result<ExecuteReport, CoreError> {
        let request = self
            .stores
            .approvals
            .get(approval_id)
            .await?
            .required(CoreError::not_found("approval", approval_id.to_string()))?;
        let mut envelope = self
            .stores
            .envelopes
            .get(&request.envelope_id)
            .await?
            .required(CoreError::not_found(
                "envelope",
                request.envelope_id.clone(),
            ))?;

        // Binding integrity against the envelope's current parameters: a
        // patched or drifted envelope invalidates every outstanding hash.
        if matches!(
            response.action,
            ApprovalAction::Approve | ApprovalAction::Patch
        ) {
            let current = canonical::binding_hash(&BindingTuple {
                action_type: &envelope.action_type,
                parameters: &envelope.parameters,
                principal_id: &envelope.principal_id,
                organization_id: envelope.organization_id.as_deref(),
                risk_category: request.risk_category,
            })?;
            if current != request.binding_hash {
                return Err(CoreError::BindingHashMismatch);
            }
        }

        if response.action == ApprovalAction::Patch {
            self.validate_patch(&envelope, response.patch_value.as_ref())?;
        }

        let updated = self.approval_machine.respond(approval_id, &response).await?;

        match updated.status {
            ApprovalStatus::Approved => {
                let entry = self
                    .record_audit(
                        &envelope,
                        events::APPROVAL_APPROVED,
                        ActorType::User,
                        &response.responded_by,
                        format!("approved by {}", response.responded_by),
                        json!({ "approvalId": approval_id }),
                        Some(updated.risk_category),
                    )
                    .await?;
                self.attach_audit(&mut envelope, entry.id).await?;
                self.transition(&mut envelope, EnvelopeStatus::Approved)
                    .await?;
                self.execute_approved_envelope(envelope).await
            }
            ApprovalStatus::Rejected => {
                let entry = self
                    .record_audit(
                        &envelope,
                        events::APPROVAL_REJECTED,
                        ActorType::User,
                        &response.responded_by,
                        format!("rejected by {}", response.responded_by),
                        json!({ "approvalId": approval_id }),
                        Some(updated.risk_category),
                    )
                    .await?;
                self.attach_audit(&mut envelope, entry.id).await?;
                self.transition(&mut envelope, EnvelopeStatus::Denied)
                    .await?;
                Ok(ExecuteReport {
                    outcome: ExecuteOutcome::Denied,
                    envelope_id: envelope.id.clone(),
                    trace_id: envelope.trace_id.clone(),
                    approval_id: Some(approval_id.to_string()),
                    binding_hash: None,
                    denied_explanation: Some(format!(
                        "rejected by {}",
                        response.responded_by
                    )),
                    execution_result: None,
                })
            }
            ApprovalStatus::Patched => {
                self.apply_patch(envelope, updated, response).await
            }
            other => Err(CoreError::Fatal(format!(
                "approval transition produced unexpected status {:?}",
                other
            ))),
        }
    }

    /// Patch flow: amend the parameters, re-run evaluation, and either
    /// execute, deny, or raise a fresh approval with a new binding hash.
    async fn apply_patch(
        &self,
        mut envelope: ActionEnvelope,
        patched_request: ApprovalRequest,
        response: ApprovalResponse,
    ) -> Result<ExecuteReport, CoreError> {
        let patch_value = response
            .patch_value
            .required(CoreError::Validation("patch requires a patchValue".into()))?;

        let entry = self
            .record_audit(
                &envelope,
                events::APPROVAL_PATCHED,
                ActorType::User,
                &response.responded_by,
                format!("parameters patched by {}", response.responded_by),
                json!({ "approvalId": patched_request.id, "patchValue": patch_value }),
                Some(patched_request.risk_category),
            )
            .await?;
        self.attach_audit(&mut envelope, entry.id).await?;

        // Amend the frozen parameters; the envelope stays pending.
        envelope.parameters = patch_value;
        self.bump(&mut envelope).await?;

        let now = self.clock.now_ms();
        let cmd = ExecuteCommand {
            actor_id: envelope.principal_id.clone(),
            organization_id: envelope.organization_id.clone(),
            action_type: envelope.action_type.clone(),
            parameters: envelope.parameters.clone(),
            side_effect: true,
            entity_refs: Vec::new(),
            message: None,
            trace_id: Some(envelope.trace_id.clone()),
            idempotency_key: String::new(),
            parent_envelope_id: envelope.parent_envelope_id.clone(),
        };
        let evaluated = self.evaluate_action(&cmd, &envelope.trace_id.clone(), now).await?;
        envelope.decisions.push(evaluated.trace.clone());
        self.bump(&mut envelope).await?;

        match evaluated.trace.final_decision {
            FinalDecision::Deny => {
                self.transition(&mut envelope, EnvelopeStatus::Denied).await?;
                let entry = self
                    .record_audit(
                        &envelope,
                        events::ACTION_DENIED,
                        ActorType::System,
                        "policy-engine",
                        evaluated.trace.explanation.clone(),
                        json!({ "explanation": evaluated.trace.explanation }),
                        self.trace_category(&evaluated.trace),
                    )
                    .await?;
                self.attach_audit(&mut envelope, entry.id).await?;
                Ok(ExecuteReport {
                    outcome: ExecuteOutcome::Denied,
                    envelope_id: envelope.id.clone(),
                    trace_id: envelope.trace_id.clone(),
                    approval_id: None,
                    binding_hash: None,
                    denied_explanation: Some(evaluated.trace.explanation.clone()),
                    execution_result: None,
                })
            }
            _ if !evaluated.trace.approval_required.blocks_execution() => {
                let result = self.run_execution(&mut envelope, &evaluated).await?;
                Ok(ExecuteReport {
                    outcome: ExecuteOutcome::Executed,
                    envelope_id: envelope.id.clone(),
                    trace_id: envelope.trace_id.clone(),
                    approval_id: None,
                    binding_hash: None,
                    denied_explanation: None,
                    execution_result: Some(result),
                })
            }
            _ => {
                // Issue the fresh pending request; the envelope is already
                // pending_approval, so raise_approval's transition is a
                // no-op bump.
                let request = self.raise_approval_for_patched(&mut envelope, &evaluated).await?;
                Ok(ExecuteReport {
                    outcome: ExecuteOutcome::PendingApproval,
                    envelope_id: envelope.id.clone(),
                    trace_id: envelope.trace_id.clone(),
                    approval_id: Some(request.id),
                    binding_hash: Some(request.binding_hash),
                    denied_explanation: None,
                    execution_result: None,
                })
            }
        }
    }

    // ------------------------------------------------------------------
    // executeApproved / undo / simulate / expiry
    // ------------------------------------------------------------------

    /// Executes an envelope that has already been approved.
    pub async fn execute_approved(&self, envelope_id: &str) -> Result<ExecuteReport, CoreError> {
        let envelope = self
            .stores
            .envelopes
            .get(envelope_id)
            .await?
            .required(CoreError::not_found("envelope", envelope_id.to_string()))?;
        if envelope.status != EnvelopeStatus::Approved {
            return Err(CoreError::Validation(format!(
                "envelope '{}' is {} and cannot be executed",
                envelope_id, envelope.status
            )));
        }
        self.execute_approved_envelope(envelope).await
    }

    async fn execute_approved_envelope(
        &self,
        mut envelope: ActionEnvelope,
    ) -> Result<ExecuteReport, CoreError> {
        // Rebuild the pipeline state for the (possibly patched) parameters.
        let now = self.clock.now_ms();
        let cmd = ExecuteCommand {
            actor_id: envelope.principal_id.clone(),
            organization_id: envelope.organization_id.clone(),
            action_type: envelope.action_type.clone(),
            parameters: envelope.parameters.clone(),
            side_effect: true,
            entity_refs: Vec::new(),
            message: None,
            trace_id: Some(envelope.trace_id.clone()),
            idempotency_key: String::new(),
            parent_envelope_id: envelope.parent_envelope_id.clone(),
        };
        let evaluated = self.evaluate_action(&cmd, &envelope.trace_id.clone(), now).await?;
        let result = self.run_execution(&mut envelope, &evaluated).await?;
        Ok(ExecuteReport {
            outcome: ExecuteOutcome::Executed,
            envelope_id: envelope.id.clone(),
            trace_id: envelope.trace_id.clone(),
            approval_id: None,
            binding_hash: None,
            denied_explanation: None,
            execution_result: Some(result),
        })
    }

    /// Synthesizes the reverse action from an executed envelope's undo
    /// recipe and feeds it back through `execute`.
    pub async fn request_undo(&self, envelope_id: &str) -> Result<ExecuteReport, CoreError> {
        let mut original = self
            .stores
            .envelopes
            .get(envelope_id)
            .await?
            .required(CoreError::not_found("envelope", envelope_id.to_string()))?;
        if original.status != EnvelopeStatus::Executed {
            return Err(CoreError::Validation(format!(
                "envelope '{}' is {} and cannot be undone",
                envelope_id, original.status
            )));
        }
        let recipe = original
            .execution_results
            .iter()
            .rev()
            .find_map(|r| r.undo_recipe.clone())
            .required(CoreError::Validation(format!(
                "envelope '{}' has no undo recipe",
                envelope_id
            )))?;
        let now = self.clock.now_ms();
        if now >= recipe.undo_expires_at {
            return Err(CoreError::Validation(format!(
                "undo window for '{}' has expired",
                envelope_id
            )));
        }

        let entry = self
            .record_audit(
                &original,
                events::UNDO_REQUESTED,
                ActorType::User,
                "operator",
                format!("undo requested via {}", recipe.action_type),
                json!({ "reverseActionType": recipe.action_type }),
                None,
            )
            .await?;
        self.attach_audit(&mut original, entry.id).await?;

        let report = self
            .execute(ExecuteCommand {
                actor_id: original.principal_id.clone(),
                organization_id: original.organization_id.clone(),
                action_type: recipe.action_type.clone(),
                parameters: recipe.parameters.clone(),
                side_effect: true,
                entity_refs: Vec::new(),
                message: None,
                trace_id: Some(original.trace_id.clone()),
                idempotency_key: format!("undo::{}::{}", original.id, recipe.action_type),
                parent_envelope_id: Some(original.id.clone()),
            })
            .await?;

        if report.outcome == ExecuteOutcome::Executed {
            // Reload: execution bumped the original through audit attach.
            let mut original = self
                .stores
                .envelopes
                .get(envelope_id)
                .await?
                .required(CoreError::not_found("envelope", envelope_id.to_string()))?;
            self.transition(&mut original, EnvelopeStatus::Undone)
                .await?;
            self.record_competence(&original, CompetenceOutcome::Rollback, now)
                .await?;
            let entry = self
                .record_audit(
                    &original,
                    events::ACTION_UNDONE,
                    ActorType::User,
                    "operator",
                    format!("undone by envelope {}", report.envelope_id),
                    json!({ "undoEnvelopeId": report.envelope_id }),
                    None,
                )
                .await?;
            self.attach_audit(&mut original, entry.id).await?;
        }
        Ok(report)
    }

    /// Re-sends the notification for a still-pending approval. Reminders
    /// do not reset the escalation clock.
    pub async fn remind_approval(&self, approval_id: &str) -> Result<(), CoreError> {
        let request = self
            .stores
            .approvals
            .get(approval_id)
            .await?
            .required(CoreError::not_found("approval", approval_id.to_string()))?;
        if request.status != ApprovalStatus::Pending {
            return Err(CoreError::Validation(format!(
                "approval '{}' is {:?}; nothing to remind",
                approval_id, request.status
            )));
        }
        self.notifier
            .notify_all(&ApprovalNotification::for_request(&request, true))
            .await;
        Ok(())
    }

    /// Runs the evaluation pipeline without persisting anything: no
    /// envelope, no approvals, no audit entries, no execution.
    pub async fn simulate(&self, cmd: ExecuteCommand) -> Result<DecisionTrace, CoreError> {
        let trace_id = cmd
            .trace_id
            .clone()
            .unwrap_or_else(|| id::new_id(id::TRACE));
        let now = self.clock.now_ms();
        let evaluated = self.evaluate_action(&cmd, &trace_id, now).await?;
        Ok(evaluated.trace)
    }

    /// Sweeps expired approvals and applies each request's
    /// `expired_behavior`. Returns the envelope ids touched.
    pub async fn expire_approvals(&self) -> Result<Vec<String>, CoreError> {
        let now = self.clock.now_ms();
        let expired = self.approval_machine.expire_due(now).await?;
        let mut touched = Vec::with_capacity(expired.len());
        for request in expired {
            let Some(mut envelope) = self.stores.envelopes.get(&request.envelope_id).await? else {
                continue;
            };
            let entry = self
                .record_audit(
                    &envelope,
                    events::APPROVAL_EXPIRED,
                    ActorType::System,
                    "approval-sweeper",
                    format!("approval {} expired", request.id),
                    json!({ "approvalId": request.id, "behavior": request.expired_behavior }),
                    Some(request.risk_category),
                )
                .await?;
            self.attach_audit(&mut envelope, entry.id).await?;

            match request.expired_behavior {
                ExpiredBehavior::Deny => {
                    self.transition(&mut envelope, EnvelopeStatus::Denied)
                        .await?;
                }
                ExpiredBehavior::Allow => {
                    self.transition(&mut envelope, EnvelopeStatus::Approved)
                        .await?;
                    // Best-effort: an execution failure leaves the envelope
                    // failed and audited; the sweep continues.
                    if let Err(err) = self.execute_approved_envelope(envelope.clone()).await {
                        tracing::warn!(
                            envelope = %envelope.id,
                            %err,
                            "expired-allow execution failed"
                        );
                    }
                }
            }
            touched.push(request.envelope_id);
        }
        Ok(touched)
    }

    // ------------------------------------------------------------------
    // helpers
    // ------------------------------------------------------------------

    /// A fresh approval raised after a patch. Unlike the first raise, the
    /// envelope is already pending.
    async fn raise_approval_for_patched(
        &self,
        envelope: &mut ActionEnvelope,
        evaluated: &EvaluatedAction,
    ) -> Result<ApprovalRequest, CoreError> {
        let now = self.clock.now_ms();
        let category = self.trace_category(&evaluated.trace).unwrap_or_default();
        let binding_hash = canonical::binding_hash(&BindingTuple {
            action_type: &envelope.action_type,
            parameters: &envelope.parameters,
            principal_id: &envelope.principal_id,
            organization_id: envelope.organization_id.as_deref(),
            risk_category: category,
        })?;
        let request = ApprovalRequest {
            id: id::new_id(id::APPROVAL),
            envelope_id: envelope.id.clone(),
            summary: format!(
                "{} by {} (patched): {}",
                envelope.action_type, envelope.principal_id, evaluated.trace.explanation
            ),
            risk_category: category,
            binding_hash,
            evidence_bundle: json!({
                "explanation": evaluated.trace.explanation,
                "riskScore": evaluated.trace.computed_risk_score,
                "parameters": envelope.parameters,
            }),
            approvers: self.config.approvers.clone(),
            fallback_approver: self.config.fallback_approver.clone(),
            escalation_delay_ms: Some(self.config.escalation_delay_ms),
            created_at: now,
            expires_at: now + self.config.approval_ttl_ms,
            expired_behavior: self.config.expired_behavior,
            status: ApprovalStatus::Pending,
            responded_by: None,
            responded_at: None,
            patch_value: None,
            version: 1,
        };
        self.stores.approvals.insert(&request).await?;
        envelope.approval_request_ids.push(request.id.clone());
        self.bump(envelope).await?;

        let entry = self
            .record_audit(
                envelope,
                events::APPROVAL_REQUESTED,
                ActorType::System,
                "policy-engine",
                format!("approval requested: {}", request.summary),
                json!({ "approvalId": request.id, "bindingHash": request.binding_hash }),
                Some(category),
            )
            .await?;
        self.attach_audit(envelope, entry.id).await?;

        self.notifier
            .notify_all(&ApprovalNotification::for_request(&request, false))
            .await;
        Ok(request)
    }

    /// Minimal structural validation of a patch against the action's
    /// declared parameter schema: the patch must be an object, and when the
    /// schema lists required keys, each must be present.
    fn validate_patch(
        &self,
        envelope: &ActionEnvelope,
        patch: Option<&Value>,
    ) -> Result<(), CoreError> {
        let patch = patch.required(CoreError::Validation(
            "patch response requires a patchValue".into(),
        ))?;
        if !patch.is_object() {
            return Err(CoreError::Validation(
                "patchValue must be a JSON object".into(),
            ));
        }
        let Some(registered) = self.registry.get(&envelope.cartridge_id) else {
            return Ok(());
        };
        let Some(descriptor) = registered.manifest.action(&envelope.action_type) else {
            return Ok(());
        };
        if let Some(required) = descriptor
            .parameters_schema
            .get("required")
            .and_then(Value::as_array)
        {
            for key in required.iter().filter_map(Value::as_str) {
                if patch.get(key).is_none() {
                    return Err(CoreError::Validation(format!(
                        "patchValue is missing required parameter '{}'",
                        key
                    )));
                }
            }
        }
        Ok(())
    }

    /// Persists a status transition with a version bump, enforcing the
    /// monotonic transition table.
    async fn transition(
        &self,
        envelope: &mut ActionEnvelope,
        next: EnvelopeStatus,
    ) -> Result<(), CoreError> {
        if !envelope.status.can_transition_to(next) {
            return Err(CoreError::Fatal(format!(
                "illegal envelope transition {} -> {}",
                envelope.status, next
            )));
        }
        envelope.status = next;
        self.bump(envelope).await
    }

    /// Persists the envelope with a monotonic version bump.
    async fn bump(&self, envelope: &mut ActionEnvelope) -> Result<(), CoreError> {
        let expected = envelope.version;
        envelope.version += 1;
        envelope.updated_at = self.clock.now_ms();
        self.stores.envelopes.update(envelope, expected).await?;
        Ok(())
    }

    async fn attach_audit(
        &self,
        envelope: &mut ActionEnvelope,
        entry_id: String,
    ) -> Result<(), CoreError> {
        envelope.audit_entry_ids.push(entry_id);
        self.bump(envelope).await
    }

    #[allow(clippy::too_many_arguments)]
    async fn record_audit(
        &self,
        envelope: &ActionEnvelope,
        event_type: &str,
        actor_type: ActorType,
        actor_id: &str,
        summary: String,
        snapshot: Value,
        risk_category: Option<RiskCategory>,
    ) -> Result<switchboard_types::domain::AuditEntry, CoreError> {
        self.ledger
            .record(AuditEvent {
                event_type: event_type.to_string(),
                actor_type,
                actor_id: actor_id.to_string(),
                entity_type: "envelope".into(),
                entity_id: envelope.id.clone(),
                risk_category,
                visibility_level: VisibilityLevel::Internal,
                summary,
                snapshot,
                evidence: Vec::new(),
                envelope_id: Some(envelope.id.clone()),
                organization_id: envelope.organization_id.clone(),
                trace_id: Some(envelope.trace_id.clone()),
            })
            .await
    }

    async fn record_competence(
        &self,
        envelope: &ActionEnvelope,
        outcome: CompetenceOutcome,
        now: TimestampMs,
    ) -> Result<(), CoreError> {
        let mut record = self
            .stores
            .competence
            .get(&envelope.principal_id, &envelope.action_type)
            .await?
            .unwrap_or_else(|| {
                CompetenceRecord::new(&envelope.principal_id, &envelope.action_type, now)
            });
        record.record(outcome, now);
        self.stores.competence.save(&record).await?;
        Ok(())
    }

    fn trace_category(&self, trace: &DecisionTrace) -> Option<RiskCategory> {
        trace.computed_risk_score.as_ref().map(|s| s.category)
    }

    fn trace_category_of(&self, envelope: &ActionEnvelope) -> Option<RiskCategory> {
        envelope
            .decisions
            .last()
            .and_then(|t| t.computed_risk_score.as_ref())
            .map(|s| s.category)
    }
}

/// Folds the org governance profile into the operator-set posture, taking
/// the stricter of the two.
fn effective_posture(
    system: SystemRiskPosture,
    profile: Option<GovernanceProfile>,
) -> SystemRiskPosture {
    let from_profile = match profile {
        Some(GovernanceProfile::Strict) => SystemRiskPosture::Elevated,
        Some(GovernanceProfile::Locked) => SystemRiskPosture::Critical,
        _ => SystemRiskPosture::Normal,
    };
    use SystemRiskPosture::*;
    match (system, from_profile) {
        (Critical, _) | (_, Critical) => Critical,
        (Elevated, _) | (_, Elevated) => Elevated,
        _ => Normal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn posture_folding_takes_the_stricter() {
        assert_eq!(
            effective_posture(SystemRiskPosture::Normal, None),
            SystemRiskPosture::Normal
        );
        assert_eq!(
            effective_posture(SystemRiskPosture::Normal, Some(GovernanceProfile::Strict)),
            SystemRiskPosture::Elevated
        );
        assert_eq!(
            effective_posture(SystemRiskPosture::Critical, Some(GovernanceProfile::Observe)),
            SystemRiskPosture::Critical
        );
        assert_eq!(
            effective_posture(SystemRiskPosture::Elevated, Some(GovernanceProfile::Locked)),
            SystemRiskPosture::Critical
        );
    }
}

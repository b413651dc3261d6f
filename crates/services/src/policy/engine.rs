// Path: crates/services/src/policy/engine.rs

//! The ordered multi-check policy evaluator.
//!
//! Checks are appended in a fixed order; any deny is terminal and no later
//! step runs. The engine is pure: every store read, cartridge call, and
//! spend sum happens before evaluation and arrives through [`EngineInput`].

use serde_json::{json, Value};
use switchboard_api::spend::SpendSnapshot;
use switchboard_types::config::SystemRiskPosture;
use switchboard_types::domain::{
    ActionProposal, ApprovalRequirement, CheckCode, CheckEffect, CompetenceRecord,
    CompositeRiskContext, DecisionCheck, DecisionTrace, FinalDecision, GuardrailConfig, Policy,
    PolicyEffect, RateLimitScope, ResolvedIdentity, RiskCategory, RiskInput,
};
use switchboard_types::id;
use switchboard_types::time::TimestampMs;

use super::risk::{adjust_composite, score, RiskScorerConfig};
use super::rules::evaluate_rule;
use crate::guardrail::GuardrailView;

/// Everything one evaluation needs, gathered by the orchestrator.
pub struct EngineInput<'a> {
    /// The proposal under evaluation.
    pub proposal: &'a ActionProposal,
    /// The cartridge owning the action type.
    pub cartridge_id: &'a str,
    /// Organization scope, when present.
    pub organization_id: Option<&'a str>,
    /// The composed governance identity.
    pub identity: &'a ResolvedIdentity,
    /// Active policies, already scope-filtered by the store.
    pub policies: &'a [Policy],
    /// The cartridge's declared guardrails.
    pub guardrails: &'a GuardrailConfig,
    /// Live guardrail counters.
    pub guardrail_view: &'a dyn GuardrailView,
    /// Cumulative spend captured before evaluation.
    pub spend: SpendSnapshot,
    /// The principal's competence record for this action type, when any.
    pub competence: Option<&'a CompetenceRecord>,
    /// The cartridge's risk assessment.
    pub risk_input: &'a RiskInput,
    /// Rolling behavior context for the composite adjustment.
    pub composite: &'a CompositeRiskContext,
    /// The envelope this action reverses or was delegated from, when any.
    pub parent_envelope_id: Option<&'a str>,
    /// The system-wide risk posture (already folded with the governance
    /// profile by the caller).
    pub posture: SystemRiskPosture,
    /// The flattened evaluation context for rule matching.
    pub eval_context: &'a Value,
    /// The evaluation instant.
    pub now: TimestampMs,
}

/// Internal accumulator for one evaluation pass.
struct Evaluation {
    checks: Vec<DecisionCheck>,
    policy_decision: Option<FinalDecision>,
    approval_override: Option<ApprovalRequirement>,
    category_floor: Option<RiskCategory>,
    trusted: bool,
}

impl Evaluation {
    fn push(
        &mut self,
        code: CheckCode,
        data: Value,
        human_detail: impl Into<String>,
        matched: bool,
        effect: CheckEffect,
    ) {
        self.checks.push(DecisionCheck {
            code,
            data,
            human_detail: human_detail.into(),
            matched,
            effect,
        });
    }
}

/// The ordered evaluator.
#[derive(Debug, Clone, Default)]
pub struct PolicyEngine {
    scorer: RiskScorerConfig,
}

impl PolicyEngine {
    /// Creates an engine with the given scorer weights.
    pub fn new(scorer: RiskScorerConfig) -> Self {
        Self { scorer }
    }

    /// Runs the full ordered pipeline and renders a decision trace.
    pub fn evaluate(&self, input: EngineInput<'_>) -> DecisionTrace {
        let mut eval = Evaluation {
            checks: Vec::new(),
            policy_decision: None,
            approval_override: None,
            category_floor: None,
            trusted: false,
        };

        // 1. Forbidden behaviors.
        let action_type = input.proposal.action_type.as_str();
        if input
            .identity
            .effective_forbidden_behaviors
            .contains(action_type)
        {
            eval.push(
                CheckCode::ForbiddenBehavior,
                json!({ "actionType": action_type }),
                format!("action type '{}' is forbidden for this principal", action_type),
                true,
                CheckEffect::Deny,
            );
            return self.finish_denied(&eval, &input, "forbidden behavior");
        }
        eval.push(
            CheckCode::ForbiddenBehavior,
            json!({ "actionType": action_type }),
            "action type is not forbidden",
            false,
            CheckEffect::Allow,
        );

        // 2. Trust behaviors. The decision is deferred to the final step.
        eval.trusted = input
            .identity
            .effective_trust_behaviors
            .contains(action_type);
        eval.push(
            CheckCode::TrustBehavior,
            json!({ "actionType": action_type, "trusted": eval.trusted }),
            if eval.trusted {
                "action type is trusted; fast path noted"
            } else {
                "action type is not trusted"
            },
            eval.trusted,
            CheckEffect::Allow,
        );

        // 3. Competence trust, informational only.
        match input.competence {
            Some(record) => {
                let effective = record.effective_score(input.now);
                eval.push(
                    CheckCode::CompetenceTrust,
                    json!({
                        "score": effective,
                        "successCount": record.success_count,
                        "failureCount": record.failure_count,
                        "consecutiveSuccesses": record.consecutive_successes,
                    }),
                    format!("competence score {:.2} for this action type", effective),
                    true,
                    CheckEffect::Skip,
                );
            }
            None => eval.push(
                CheckCode::CompetenceTrust,
                Value::Null,
                "no competence history for this action type",
                false,
                CheckEffect::Skip,
            ),
        }

        // Delegation annotation: actions spawned from another envelope
        // (undo, delegated agents) carry their origin into the trace.
        if let Some(parent) = input.parent_envelope_id {
            eval.push(
                CheckCode::DelegationChain,
                json!({ "parentEnvelopeId": parent }),
                format!("action derives from envelope '{}'", parent),
                true,
                CheckEffect::Skip,
            );
        }

        // 4. Rate limits.
        for rule in &input.guardrails.rate_limits {
            let count = input.guardrail_view.count_in_window(
                &input.identity.principal_id,
                input.cartridge_id,
                &rule.scope,
                rule.window_ms,
                input.now,
            );
            if matches!(&rule.scope, RateLimitScope::ActionType { action_type: scoped }
                if scoped.as_str() != action_type)
            {
                continue;
            }
            // Executing now would make the in-window count `count + 1`;
            // landing exactly on the limit is allowed.
            if count >= rule.max_count {
                eval.push(
                    CheckCode::RateLimit,
                    json!({
                        "scope": rule.scope,
                        "count": count,
                        "max": rule.max_count,
                        "windowMs": rule.window_ms,
                    }),
                    format!(
                        "rate limit exceeded: {} of {} actions in window",
                        count, rule.max_count
                    ),
                    true,
                    CheckEffect::Deny,
                );
                return self.finish_denied(&eval, &input, "rate limit exceeded");
            }
            eval.push(
                CheckCode::RateLimit,
                json!({
                    "scope": rule.scope,
                    "count": count,
                    "max": rule.max_count,
                    "windowMs": rule.window_ms,
                }),
                format!("{} of {} actions in window", count, rule.max_count),
                false,
                CheckEffect::Allow,
            );
        }

        // 5. Cooldowns on the target entity.
        let entity_id = entity_id_of(&input.proposal.parameters);
        for rule in &input.guardrails.cooldowns {
            if rule
                .action_type
                .as_deref()
                .is_some_and(|scoped| scoped != action_type)
            {
                continue;
            }
            let Some(entity) = entity_id else { break };
            if let Some(last) = input.guardrail_view.last_touched(entity) {
                let elapsed = input.now - last;
                // A touch at exactly the cooldown gap is allowed.
                if elapsed < rule.cooldown_ms {
                    eval.push(
                        CheckCode::Cooldown,
                        json!({
                            "entityId": entity,
                            "elapsedMs": elapsed,
                            "cooldownMs": rule.cooldown_ms,
                        }),
                        format!(
                            "entity '{}' touched {} ms ago, inside the {} ms cooldown",
                            entity, elapsed, rule.cooldown_ms
                        ),
                        true,
                        CheckEffect::Deny,
                    );
                    return self.finish_denied(&eval, &input, "cooldown in effect");
                }
            }
            eval.push(
                CheckCode::Cooldown,
                json!({ "entityId": entity, "cooldownMs": rule.cooldown_ms }),
                "target entity is outside its cooldown",
                false,
                CheckEffect::Allow,
            );
        }

        // 6. Protected entities.
        if let Some(entity) = entity_id {
            if input.guardrails.protected_entities.contains(entity) {
                eval.push(
                    CheckCode::ProtectedEntity,
                    json!({ "entityId": entity }),
                    format!("entity '{}' is protected", entity),
                    true,
                    CheckEffect::Deny,
                );
                return self.finish_denied(&eval, &input, "protected entity");
            }
        }

        // 7. Spend limits.
        if let Some(amount) = spend_amount_of(&input.proposal.parameters) {
            if let Some(denied) = self.check_spend(&mut eval, &input, amount) {
                return denied;
            }
        }

        // 8. Stored policies, priority ascending.
        if let Some(denied) = self.check_policies(&mut eval, &input) {
            return denied;
        }

        // 9. Risk scoring and composite adjustment.
        let base_score = score(input.risk_input, &self.scorer);
        eval.push(
            CheckCode::RiskScoring,
            json!({ "rawScore": base_score.raw_score, "category": base_score.category }),
            format!(
                "risk score {:.1} ({})",
                base_score.raw_score, base_score.category
            ),
            true,
            CheckEffect::Allow,
        );
        let adjusted = adjust_composite(&base_score, input.composite);
        let composite_raised = adjusted.raw_score > base_score.raw_score;
        eval.push(
            CheckCode::CompositeRisk,
            json!({ "rawScore": adjusted.raw_score, "category": adjusted.category }),
            if composite_raised {
                format!(
                    "composite adjustment raised score to {:.1} ({})",
                    adjusted.raw_score, adjusted.category
                )
            } else {
                "no composite adjustment".to_string()
            },
            composite_raised,
            if composite_raised {
                CheckEffect::Modify
            } else {
                CheckEffect::Skip
            },
        );

        // Policy overrides can only raise the category.
        let mut final_score = adjusted;
        if let Some(floor) = eval.category_floor {
            if floor > final_score.category {
                final_score.category = floor;
            }
        }

        // 10. Approval requirement resolution, then system posture.
        // Policy overrides raise the identity's own tolerance, never lower
        // it.
        let tolerance = input.identity.tolerance_for(final_score.category);
        let mut requirement = match eval.approval_override {
            Some(overridden) => overridden.max(tolerance),
            None => tolerance,
        };

        let before_posture = requirement;
        requirement = match input.posture {
            SystemRiskPosture::Normal => requirement,
            SystemRiskPosture::Elevated => {
                if requirement <= ApprovalRequirement::Standard {
                    ApprovalRequirement::Elevated
                } else {
                    requirement
                }
            }
            SystemRiskPosture::Critical => ApprovalRequirement::Mandatory,
        };
        let posture_raised = requirement != before_posture;
        eval.push(
            CheckCode::SystemPosture,
            json!({ "posture": input.posture, "requirement": requirement }),
            if posture_raised {
                format!("system posture {:?} raised approval requirement", input.posture)
            } else {
                "system posture left approval requirement unchanged".to_string()
            },
            posture_raised,
            if posture_raised {
                CheckEffect::Modify
            } else {
                CheckEffect::Skip
            },
        );

        // 11. Final decision. Trust fast-paths everything except a mandatory
        // requirement.
        let (final_decision, approval_required, explanation) = if eval.trusted
            && requirement != ApprovalRequirement::Mandatory
        {
            (
                FinalDecision::Allow,
                ApprovalRequirement::None,
                format!("trusted behavior '{}' allowed without approval", action_type),
            )
        } else {
            let decision = eval.policy_decision.unwrap_or(FinalDecision::Allow);
            let explanation = match (decision, requirement) {
                (FinalDecision::Modify, _) => "allowed in modified form".to_string(),
                (_, ApprovalRequirement::None) => {
                    format!("risk {} within tolerance; allowed", final_score.category)
                }
                _ => format!(
                    "risk {} requires {:?} approval",
                    final_score.category, requirement
                ),
            };
            (decision, requirement, explanation)
        };

        DecisionTrace {
            id: id::new_id(id::DECISION),
            checks: eval.checks,
            computed_risk_score: Some(final_score),
            final_decision,
            approval_required,
            explanation,
            created_at: input.now,
        }
    }

    /// Step 7: per-action ceiling first, then each cumulative window in
    /// order. The first exceeded window denies; landing exactly on a
    /// ceiling is allowed.
    fn check_spend(
        &self,
        eval: &mut Evaluation,
        input: &EngineInput<'_>,
        amount: f64,
    ) -> Option<DecisionTrace> {
        let limits = &input.identity.effective_spend_limits;

        if let Some(per_action) = limits.per_action {
            if amount > per_action {
                eval.push(
                    CheckCode::SpendLimit,
                    json!({ "window": "perAction", "amount": amount, "limit": per_action }),
                    format!(
                        "amount {:.2} exceeds per-action limit {:.2}",
                        amount, per_action
                    ),
                    true,
                    CheckEffect::Deny,
                );
                return Some(self.finish_denied(eval, input, "per-action spend limit"));
            }
        }

        let windows = [
            ("daily", limits.daily, input.spend.daily),
            ("weekly", limits.weekly, input.spend.weekly),
            ("monthly", limits.monthly, input.spend.monthly),
        ];
        for (name, limit, spent) in windows {
            let Some(limit) = limit else { continue };
            if spent + amount > limit {
                eval.push(
                    CheckCode::SpendLimit,
                    json!({ "window": name, "amount": amount, "spent": spent, "limit": limit }),
                    format!(
                        "amount {:.2} plus {:.2} already spent exceeds {} limit {:.2}",
                        amount, spent, name, limit
                    ),
                    true,
                    CheckEffect::Deny,
                );
                return Some(self.finish_denied(
                    eval,
                    input,
                    &format!("{} spend limit", name),
                ));
            }
        }

        eval.push(
            CheckCode::SpendLimit,
            json!({ "amount": amount }),
            format!("amount {:.2} within every spend ceiling", amount),
            false,
            CheckEffect::Allow,
        );
        None
    }

    /// Step 8: stored policies in priority order.
    fn check_policies(
        &self,
        eval: &mut Evaluation,
        input: &EngineInput<'_>,
    ) -> Option<DecisionTrace> {
        let mut in_scope: Vec<&Policy> = input
            .policies
            .iter()
            .filter(|p| {
                p.active && p.applies_to(Some(input.cartridge_id), input.organization_id)
            })
            .collect();
        in_scope.sort_by_key(|p| p.priority);

        let mut any_matched = false;
        for policy in in_scope {
            let evaluation = evaluate_rule(&policy.rule, input.eval_context);
            if !evaluation.matched {
                continue;
            }
            any_matched = true;

            if let Some(floor) = policy.risk_category_override {
                eval.category_floor = Some(match eval.category_floor {
                    Some(current) => current.max(floor),
                    None => floor,
                });
            }

            match policy.effect {
                PolicyEffect::Deny => {
                    eval.push(
                        CheckCode::PolicyRule,
                        json!({ "policyId": policy.id, "effect": "deny" }),
                        format!("policy '{}' denied the action", policy.label()),
                        true,
                        CheckEffect::Deny,
                    );
                    return Some(self.finish_denied(
                        eval,
                        input,
                        &format!("denied by policy '{}'", policy.label()),
                    ));
                }
                PolicyEffect::Allow => {
                    eval.policy_decision = Some(FinalDecision::Allow);
                    eval.push(
                        CheckCode::PolicyRule,
                        json!({ "policyId": policy.id, "effect": "allow" }),
                        format!("policy '{}' recorded an allow", policy.label()),
                        true,
                        CheckEffect::Allow,
                    );
                }
                PolicyEffect::Modify => {
                    eval.policy_decision = Some(FinalDecision::Modify);
                    self.apply_modify_params(eval, policy);
                    eval.push(
                        CheckCode::PolicyRule,
                        json!({ "policyId": policy.id, "effect": "modify" }),
                        format!("policy '{}' modified the evaluation", policy.label()),
                        true,
                        CheckEffect::Modify,
                    );
                }
                PolicyEffect::RequireApproval => {
                    let raised = policy
                        .approval_requirement
                        .unwrap_or(ApprovalRequirement::Standard);
                    eval.approval_override = Some(match eval.approval_override {
                        Some(current) => current.max(raised),
                        None => raised,
                    });
                    eval.push(
                        CheckCode::PolicyRule,
                        json!({ "policyId": policy.id, "effect": "require_approval", "requirement": raised }),
                        format!(
                            "policy '{}' requires {:?} approval",
                            policy.label(),
                            raised
                        ),
                        true,
                        CheckEffect::Modify,
                    );
                }
            }
        }

        if !any_matched {
            eval.push(
                CheckCode::PolicyRule,
                Value::Null,
                "no stored policy matched",
                false,
                CheckEffect::Skip,
            );
        }
        None
    }

    /// Applies the recognized keys of a `modify` policy's `effect_params`.
    /// Unknown keys are a logged no-op.
    fn apply_modify_params(&self, eval: &mut Evaluation, policy: &Policy) {
        let Some(params) = &policy.effect_params else {
            return;
        };
        for (key, value) in params {
            match key.as_str() {
                "riskCategoryOverride" => {
                    if let Ok(category) =
                        serde_json::from_value::<RiskCategory>(value.clone())
                    {
                        eval.category_floor = Some(match eval.category_floor {
                            Some(current) => current.max(category),
                            None => category,
                        });
                    }
                }
                "approvalRequirement" => {
                    if let Ok(req) =
                        serde_json::from_value::<ApprovalRequirement>(value.clone())
                    {
                        eval.approval_override = Some(match eval.approval_override {
                            Some(current) => current.max(req),
                            None => req,
                        });
                    }
                }
                other => {
                    tracing::warn!(
                        policy_id = %policy.id,
                        param = other,
                        "unknown modify effect param; ignoring"
                    );
                }
            }
        }
    }

    fn finish_denied(
        &self,
        eval: &Evaluation,
        input: &EngineInput<'_>,
        reason: &str,
    ) -> DecisionTrace {
        DecisionTrace {
            id: id::new_id(id::DECISION),
            checks: eval.checks.clone(),
            computed_risk_score: None,
            final_decision: FinalDecision::Deny,
            approval_required: ApprovalRequirement::None,
            explanation: format!("denied: {}", reason),
            created_at: input.now,
        }
    }
}

/// The target entity named by the parameters, when any.
pub(crate) fn entity_id_of(parameters: &Value) -> Option<&str> {
    parameters.get("entityId").and_then(Value::as_str)
}

/// The governed spend amount: `amount`, else the absolute value of
/// `budgetChange`. Strings that parse as numbers are coerced.
pub(crate) fn spend_amount_of(parameters: &Value) -> Option<f64> {
    let coerce = |v: &Value| -> Option<f64> {
        match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    };
    if let Some(v) = parameters.get("amount") {
        return coerce(v);
    }
    parameters.get("budgetChange").and_then(|v| coerce(v)).map(f64::abs)
}

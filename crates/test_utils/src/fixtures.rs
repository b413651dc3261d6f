// Path: crates/test_utils/src/fixtures.rs

//! Shared fixtures: principals, identity specs, policies, and risk inputs.

use serde_json::json;
use switchboard_types::domain::{
    ApprovalRequirement, Exposure, IdentitySpec, Policy, PolicyEffect, Principal, PrincipalType,
    Reversibility, RiskCategory, RiskInput, RuleCondition, RuleNode, RuleOperator, Sensitivity,
};

/// An agent principal.
pub fn principal(id: &str) -> Principal {
    Principal {
        id: id.into(),
        principal_type: PrincipalType::Agent,
        name: format!("agent {}", id),
        organization_id: None,
        roles: vec!["operator".into()],
    }
}

/// An identity spec with the given tolerance for every category.
pub fn identity_spec(principal_id: &str, tolerances: &[(RiskCategory, ApprovalRequirement)]) -> IdentitySpec {
    let mut spec = IdentitySpec::empty(principal_id);
    for (category, requirement) in tolerances {
        spec.risk_tolerance.insert(*category, *requirement);
    }
    spec
}

/// A risk input pinned to a base category with the given dollars at risk.
pub fn low_risk(base: RiskCategory, dollars_at_risk: f64) -> RiskInput {
    RiskInput {
        base_risk: base,
        exposure: Exposure {
            dollars_at_risk,
            blast_radius: 0,
        },
        reversibility: Reversibility::Full,
        sensitivity: Sensitivity::default(),
    }
}

/// A priority-zero active policy denying one action type.
pub fn policy_denying(id: &str, action_type: &str) -> Policy {
    Policy {
        id: id.into(),
        name: format!("deny {}", action_type),
        priority: 0,
        active: true,
        cartridge_id: None,
        organization_id: None,
        rule: RuleNode {
            composition: Default::default(),
            conditions: vec![RuleCondition {
                field: "action.actionType".into(),
                operator: RuleOperator::Eq,
                value: json!(action_type),
            }],
            children: vec![],
        },
        effect: PolicyEffect::Deny,
        approval_requirement: None,
        risk_category_override: None,
        effect_params: None,
    }
}

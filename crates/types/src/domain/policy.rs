// Path: crates/types/src/domain/policy.rs

//! Declarative policies: recursive rule trees evaluated over a flattened
//! evaluation context.

use super::risk::{ApprovalRequirement, RiskCategory};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Boolean composition of a rule node's conditions and children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RuleComposition {
    /// Every condition and child must match. Short-circuits on first miss.
    #[default]
    AND,
    /// Any condition or child may match. Short-circuits on first hit.
    OR,
    /// Negates the conjunction of the node's conditions and children.
    NOT,
}

/// Comparison operators available to rule conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOperator {
    /// Equality after numeric coercion.
    Eq,
    /// Inequality after numeric coercion.
    Neq,
    /// Strictly greater than.
    Gt,
    /// Greater than or equal.
    Gte,
    /// Strictly less than.
    Lt,
    /// Less than or equal.
    Lte,
    /// The context value is a member of the condition's array.
    In,
    /// The context value is not a member of the condition's array.
    NotIn,
    /// String or array containment.
    Contains,
    /// Negated containment.
    NotContains,
    /// Regular-expression match on the string form of the value.
    Matches,
    /// The dotted path resolves to a defined value.
    Exists,
    /// The dotted path does not resolve.
    NotExists,
}

/// One leaf comparison inside a rule node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleCondition {
    /// Dotted JSON path into the evaluation context, e.g. `action.actionType`.
    pub field: String,
    /// The comparison to apply.
    pub operator: RuleOperator,
    /// The right-hand side. Ignored for `exists`/`not_exists`.
    #[serde(default)]
    pub value: Value,
}

/// A node in the recursive rule tree.
///
/// A node with neither conditions nor children evaluates to true.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleNode {
    /// How this node combines its conditions and children.
    #[serde(default)]
    pub composition: RuleComposition,
    /// Leaf comparisons evaluated at this node.
    #[serde(default)]
    pub conditions: Vec<RuleCondition>,
    /// Nested rule nodes.
    #[serde(default)]
    pub children: Vec<RuleNode>,
}

/// The effect a matching policy applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyEffect {
    /// Record an allow decision.
    Allow,
    /// Deny terminally.
    Deny,
    /// Adjust the evaluation via `effect_params`.
    Modify,
    /// Raise the approval requirement.
    RequireApproval,
}

/// A stored governance policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    /// Stable identifier.
    pub id: String,
    /// Human-facing name, used in decision explanations.
    #[serde(default)]
    pub name: String,
    /// Evaluation order; lower priority is evaluated first.
    pub priority: i32,
    /// Inactive policies are skipped entirely.
    pub active: bool,
    /// When set, the policy applies only to this cartridge. `None` applies
    /// to all cartridges.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cartridge_id: Option<String>,
    /// When set, the policy applies only inside this organization.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    /// The rule tree that must match for the effect to apply.
    pub rule: RuleNode,
    /// What happens when the rule matches.
    pub effect: PolicyEffect,
    /// Approval requirement raised by `require_approval` effects.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_requirement: Option<ApprovalRequirement>,
    /// Risk category floor raised by matching policies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_category_override: Option<RiskCategory>,
    /// Free-form parameters for `modify` effects. Unknown keys are ignored
    /// and logged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effect_params: Option<serde_json::Map<String, Value>>,
}

impl Policy {
    /// Whether this policy is in scope for the given cartridge and org.
    pub fn applies_to(&self, cartridge_id: Option<&str>, organization_id: Option<&str>) -> bool {
        if let Some(scope) = &self.cartridge_id {
            if cartridge_id != Some(scope.as_str()) {
                return false;
            }
        }
        if let Some(scope) = &self.organization_id {
            if organization_id != Some(scope.as_str()) {
                return false;
            }
        }
        true
    }

    /// The label used in explanations: the name when present, else the id.
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rule_tree_round_trips_through_json() {
        let raw = json!({
            "composition": "AND",
            "conditions": [
                {"field": "action.actionType", "operator": "eq", "value": "ads.targeting.modify"}
            ],
            "children": [
                {"composition": "NOT", "conditions": [
                    {"field": "parameters.dryRun", "operator": "exists"}
                ]}
            ]
        });
        let node: RuleNode = serde_json::from_value(raw).unwrap();
        assert_eq!(node.composition, RuleComposition::AND);
        assert_eq!(node.conditions.len(), 1);
        assert_eq!(node.children[0].composition, RuleComposition::NOT);
    }

    #[test]
    fn scope_filtering() {
        let mut p = Policy {
            id: "pol_1".into(),
            name: String::new(),
            priority: 0,
            active: true,
            cartridge_id: Some("ads".into()),
            organization_id: None,
            rule: RuleNode::default(),
            effect: PolicyEffect::Deny,
            approval_requirement: None,
            risk_category_override: None,
            effect_params: None,
        };
        assert!(p.applies_to(Some("ads"), None));
        assert!(!p.applies_to(Some("payments"), None));
        assert!(!p.applies_to(None, None));
        p.cartridge_id = None;
        assert!(p.applies_to(Some("payments"), Some("org_1")));
    }
}

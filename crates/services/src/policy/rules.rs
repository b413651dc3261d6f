// Path: crates/services/src/policy/rules.rs

//! Boolean rule-tree evaluation over a flattened evaluation context.
//!
//! Conditions address the context with dotted JSON paths. A missing path
//! yields undefined, which only `exists`/`not_exists` treat specially.
//! Numeric comparisons coerce strings that parse as numbers, matching how
//! action parameters arrive off the wire. Malformed pieces (bad regex,
//! depth overrun) never throw; they evaluate as non-matching and are
//! logged.

use regex::Regex;
use serde_json::Value;
use switchboard_types::domain::{RuleComposition, RuleCondition, RuleNode, RuleOperator};
use switchboard_types::MAX_RULE_DEPTH;

/// The outcome of one leaf condition.
#[derive(Debug, Clone)]
pub struct ConditionResult {
    /// The dotted path examined.
    pub field: String,
    /// The operator applied.
    pub operator: RuleOperator,
    /// The value found at the path, when defined.
    pub actual: Option<Value>,
    /// Whether the condition held.
    pub matched: bool,
}

/// The outcome of evaluating one rule tree.
#[derive(Debug, Clone, Default)]
pub struct RuleEvaluation {
    /// Whether the tree matched.
    pub matched: bool,
    /// Every leaf condition evaluated, in order.
    pub condition_results: Vec<ConditionResult>,
}

/// Looks up a dotted path in the context. `None` is "undefined".
fn lookup<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = context;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Coerces a value to f64 when it is a number or a string that parses as
/// one.
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Loose equality: numeric when both sides coerce, structural otherwise.
fn loose_eq(a: &Value, b: &Value) -> bool {
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return x == y;
    }
    a == b
}

fn compare_numeric(actual: &Value, expected: &Value, op: RuleOperator) -> bool {
    let (Some(a), Some(e)) = (as_number(actual), as_number(expected)) else {
        return false;
    };
    match op {
        RuleOperator::Gt => a > e,
        RuleOperator::Gte => a >= e,
        RuleOperator::Lt => a < e,
        RuleOperator::Lte => a <= e,
        _ => false,
    }
}

fn contains(actual: &Value, expected: &Value) -> bool {
    match actual {
        Value::String(s) => expected.as_str().map(|e| s.contains(e)).unwrap_or(false),
        Value::Array(items) => items.iter().any(|i| loose_eq(i, expected)),
        _ => false,
    }
}

fn evaluate_condition(condition: &RuleCondition, context: &Value) -> ConditionResult {
    let actual = lookup(context, &condition.field);
    let matched = match condition.operator {
        RuleOperator::Exists => actual.is_some(),
        RuleOperator::NotExists => actual.is_none(),
        RuleOperator::Eq => actual.map(|a| loose_eq(a, &condition.value)).unwrap_or(false),
        RuleOperator::Neq => actual.map(|a| !loose_eq(a, &condition.value)).unwrap_or(false),
        RuleOperator::Gt | RuleOperator::Gte | RuleOperator::Lt | RuleOperator::Lte => actual
            .map(|a| compare_numeric(a, &condition.value, condition.operator))
            .unwrap_or(false),
        RuleOperator::In => actual
            .map(|a| {
                condition
                    .value
                    .as_array()
                    .map(|set| set.iter().any(|v| loose_eq(a, v)))
                    .unwrap_or(false)
            })
            .unwrap_or(false),
        RuleOperator::NotIn => actual
            .map(|a| {
                condition
                    .value
                    .as_array()
                    .map(|set| !set.iter().any(|v| loose_eq(a, v)))
                    .unwrap_or(false)
            })
            .unwrap_or(false),
        RuleOperator::Contains => actual
            .map(|a| contains(a, &condition.value))
            .unwrap_or(false),
        RuleOperator::NotContains => actual
            .map(|a| !contains(a, &condition.value))
            .unwrap_or(false),
        RuleOperator::Matches => match (actual, condition.value.as_str()) {
            (Some(a), Some(pattern)) => match Regex::new(pattern) {
                Ok(re) => value_as_string(a).map(|s| re.is_match(&s)).unwrap_or(false),
                Err(err) => {
                    tracing::warn!(pattern, %err, "invalid regex in rule condition");
                    false
                }
            },
            _ => false,
        },
    };
    ConditionResult {
        field: condition.field.clone(),
        operator: condition.operator,
        actual: actual.cloned(),
        matched,
    }
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn evaluate_node(
    node: &RuleNode,
    context: &Value,
    depth: usize,
    results: &mut Vec<ConditionResult>,
) -> bool {
    if depth > MAX_RULE_DEPTH {
        tracing::warn!(depth, "rule tree exceeds maximum depth; treating as non-matching");
        return false;
    }
    // A node with neither conditions nor children evaluates to true.
    if node.conditions.is_empty() && node.children.is_empty() {
        return true;
    }

    match node.composition {
        RuleComposition::AND => {
            for condition in &node.conditions {
                let r = evaluate_condition(condition, context);
                let matched = r.matched;
                results.push(r);
                if !matched {
                    return false;
                }
            }
            for child in &node.children {
                if !evaluate_node(child, context, depth + 1, results) {
                    return false;
                }
            }
            true
        }
        RuleComposition::OR => {
            for condition in &node.conditions {
                let r = evaluate_condition(condition, context);
                let matched = r.matched;
                results.push(r);
                if matched {
                    return true;
                }
            }
            for child in &node.children {
                if evaluate_node(child, context, depth + 1, results) {
                    return true;
                }
            }
            false
        }
        RuleComposition::NOT => {
            // Negates the conjunction of the node's conditions and children.
            let mut all = true;
            for condition in &node.conditions {
                let r = evaluate_condition(condition, context);
                if !r.matched {
                    all = false;
                }
                results.push(r);
            }
            if all {
                for child in &node.children {
                    if !evaluate_node(child, context, depth + 1, results) {
                        all = false;
                        break;
                    }
                }
            }
            !all
        }
    }
}

/// Evaluates a rule tree against a context.
pub fn evaluate_rule(rule: &RuleNode, context: &Value) -> RuleEvaluation {
    let mut results = Vec::new();
    let matched = evaluate_node(rule, context, 0, &mut results);
    RuleEvaluation {
        matched,
        condition_results: results,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use switchboard_types::domain::RuleComposition;

    fn ctx() -> Value {
        json!({
            "action": {"actionType": "ads.campaign.pause"},
            "parameters": {"amount": "150.5", "tags": ["beta", "ramp"], "entityId": "camp_1"},
            "principal": {"id": "agent_1", "roles": ["operator"]},
            "time": {"hour": 14}
        })
    }

    fn cond(field: &str, operator: RuleOperator, value: Value) -> RuleCondition {
        RuleCondition {
            field: field.into(),
            operator,
            value,
        }
    }

    fn single(condition: RuleCondition) -> RuleNode {
        RuleNode {
            composition: RuleComposition::AND,
            conditions: vec![condition],
            children: vec![],
        }
    }

    #[test]
    fn eq_on_dotted_path() {
        let rule = single(cond(
            "action.actionType",
            RuleOperator::Eq,
            json!("ads.campaign.pause"),
        ));
        assert!(evaluate_rule(&rule, &ctx()).matched);
    }

    #[test]
    fn numeric_coercion_compares_strings() {
        // parameters.amount is the string "150.5".
        let rule = single(cond("parameters.amount", RuleOperator::Gt, json!(100)));
        assert!(evaluate_rule(&rule, &ctx()).matched);
        let rule = single(cond("parameters.amount", RuleOperator::Lte, json!(150.5)));
        assert!(evaluate_rule(&rule, &ctx()).matched);
        let rule = single(cond("parameters.amount", RuleOperator::Lt, json!(150.5)));
        assert!(!evaluate_rule(&rule, &ctx()).matched);
    }

    #[test]
    fn exists_and_not_exists_test_definedness() {
        assert!(evaluate_rule(
            &single(cond("parameters.entityId", RuleOperator::Exists, Value::Null)),
            &ctx()
        )
        .matched);
        assert!(evaluate_rule(
            &single(cond("parameters.missing", RuleOperator::NotExists, Value::Null)),
            &ctx()
        )
        .matched);
        // Missing path fails every other operator.
        assert!(!evaluate_rule(
            &single(cond("parameters.missing", RuleOperator::Eq, json!(1))),
            &ctx()
        )
        .matched);
    }

    #[test]
    fn membership_and_containment() {
        assert!(evaluate_rule(
            &single(cond(
                "action.actionType",
                RuleOperator::In,
                json!(["ads.campaign.pause", "ads.campaign.resume"])
            )),
            &ctx()
        )
        .matched);
        assert!(evaluate_rule(
            &single(cond("parameters.tags", RuleOperator::Contains, json!("beta"))),
            &ctx()
        )
        .matched);
        assert!(evaluate_rule(
            &single(cond(
                "action.actionType",
                RuleOperator::Contains,
                json!("campaign")
            )),
            &ctx()
        )
        .matched);
        assert!(evaluate_rule(
            &single(cond(
                "parameters.tags",
                RuleOperator::NotContains,
                json!("prod")
            )),
            &ctx()
        )
        .matched);
    }

    #[test]
    fn regex_matches_and_bad_regex_is_non_matching() {
        assert!(evaluate_rule(
            &single(cond(
                "action.actionType",
                RuleOperator::Matches,
                json!(r"^ads\.campaign\.")
            )),
            &ctx()
        )
        .matched);
        assert!(!evaluate_rule(
            &single(cond("action.actionType", RuleOperator::Matches, json!("[unclosed"))),
            &ctx()
        )
        .matched);
    }

    #[test]
    fn and_or_not_composition() {
        let and = RuleNode {
            composition: RuleComposition::AND,
            conditions: vec![
                cond("action.actionType", RuleOperator::Eq, json!("ads.campaign.pause")),
                cond("parameters.amount", RuleOperator::Gt, json!(1_000)),
            ],
            children: vec![],
        };
        assert!(!evaluate_rule(&and, &ctx()).matched);

        let or = RuleNode {
            composition: RuleComposition::OR,
            conditions: vec![
                cond("parameters.amount", RuleOperator::Gt, json!(1_000)),
                cond("principal.roles", RuleOperator::Contains, json!("operator")),
            ],
            children: vec![],
        };
        assert!(evaluate_rule(&or, &ctx()).matched);

        let not = RuleNode {
            composition: RuleComposition::NOT,
            conditions: vec![cond(
                "action.actionType",
                RuleOperator::Eq,
                json!("ads.campaign.pause"),
            )],
            children: vec![],
        };
        assert!(!evaluate_rule(&not, &ctx()).matched);
    }

    #[test]
    fn empty_node_is_true() {
        assert!(evaluate_rule(&RuleNode::default(), &ctx()).matched);
    }

    #[test]
    fn nested_children() {
        // action is a pause AND (amount > 1000 OR hour >= 9).
        let rule = RuleNode {
            composition: RuleComposition::AND,
            conditions: vec![cond(
                "action.actionType",
                RuleOperator::Eq,
                json!("ads.campaign.pause"),
            )],
            children: vec![RuleNode {
                composition: RuleComposition::OR,
                conditions: vec![
                    cond("parameters.amount", RuleOperator::Gt, json!(1_000)),
                    cond("time.hour", RuleOperator::Gte, json!(9)),
                ],
                children: vec![],
            }],
        };
        assert!(evaluate_rule(&rule, &ctx()).matched);
    }

    #[test]
    fn runaway_depth_is_non_matching() {
        // Build a chain deeper than the cap; the deepest node would match,
        // but the cap cuts it off.
        let mut node = RuleNode::default();
        node.conditions
            .push(cond("time.hour", RuleOperator::Gte, json!(0)));
        for _ in 0..(MAX_RULE_DEPTH + 2) {
            node = RuleNode {
                composition: RuleComposition::AND,
                conditions: vec![],
                children: vec![node],
            };
        }
        assert!(!evaluate_rule(&node, &ctx()).matched);
    }
}

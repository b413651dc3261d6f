// Path: crates/types/src/canonical.rs

//! Canonical JSON (RFC 8785 subset) and reproducible hashing.
//!
//! This module is the determinism boundary of the system: anywhere a hash must
//! be reproducible across processes and restarts, the value is first rendered
//! through `serde_jcs` and then digested with SHA-256. By centralizing the
//! canonicalization here in the base `types` crate, every component uses the
//! exact same byte representation for the same logical value, so binding
//! hashes and audit chain hashes never diverge between writers and verifiers.
//!
//! Canonical form: object keys sorted lexicographically, no insignificant
//! whitespace, shortest-roundtrip number rendering, arrays in order. Fields
//! that are `None` are omitted by the serde `skip_serializing_if` attributes
//! on the domain types rather than rendered as `null`.

use crate::domain::RiskCategory;
use crate::error::CanonicalError;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Renders any serializable value into canonical JSON bytes.
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<Vec<u8>, CanonicalError> {
    serde_jcs::to_vec(value).map_err(|e| CanonicalError::Serialize(e.to_string()))
}

/// Renders any serializable value into a canonical JSON string.
pub fn to_canonical_string<T: Serialize>(value: &T) -> Result<String, CanonicalError> {
    serde_jcs::to_string(value).map_err(|e| CanonicalError::Serialize(e.to_string()))
}

/// Computes the hex-encoded SHA-256 digest of a value's canonical JSON form.
pub fn canonical_hash_hex<T: Serialize>(value: &T) -> Result<String, CanonicalError> {
    let bytes = to_canonical_json(value)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// The frozen tuple an approval is cryptographically bound to.
///
/// Any change to the action parameters after an approval request was issued
/// produces a different hash, which invalidates responses carrying the old
/// one.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingTuple<'a> {
    /// The action type under approval.
    pub action_type: &'a str,
    /// The frozen action parameters.
    pub parameters: &'a Value,
    /// The acting principal.
    pub principal_id: &'a str,
    /// The organization scope, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<&'a str>,
    /// The risk category computed at evaluation time.
    pub risk_category: RiskCategory,
}

/// Computes the binding hash over the frozen action tuple.
pub fn binding_hash(tuple: &BindingTuple<'_>) -> Result<String, CanonicalError> {
    canonical_hash_hex(tuple)
}

/// Computes the hash of an action's parameters alone.
///
/// Used to detect envelope parameter drift between approval issuance and the
/// moment a response is committed.
pub fn parameter_hash(parameters: &Value) -> Result<String, CanonicalError> {
    canonical_hash_hex(parameters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn canonical_form_sorts_keys_and_strips_whitespace() {
        let a: Value = serde_json::from_str(r#"{"b": 1, "a": [2, 1]}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{  "a": [2, 1], "b": 1}"#).unwrap();
        let ca = to_canonical_string(&a).unwrap();
        let cb = to_canonical_string(&b).unwrap();
        assert_eq!(ca, cb);
        assert_eq!(ca, r#"{"a":[2,1],"b":1}"#);
    }

    #[test]
    fn binding_hash_changes_with_parameters() {
        let p1 = json!({"campaignId": "camp_1"});
        let p2 = json!({"campaignId": "camp_2"});
        let t1 = BindingTuple {
            action_type: "ads.campaign.pause",
            parameters: &p1,
            principal_id: "agent_1",
            organization_id: None,
            risk_category: RiskCategory::Low,
        };
        let mut t2 = t1.clone();
        t2.parameters = &p2;
        assert_ne!(binding_hash(&t1).unwrap(), binding_hash(&t2).unwrap());
    }

    #[test]
    fn binding_hash_is_stable_across_key_order() {
        let p1: Value = serde_json::from_str(r#"{"x":1,"y":2}"#).unwrap();
        let p2: Value = serde_json::from_str(r#"{"y":2,"x":1}"#).unwrap();
        let t1 = BindingTuple {
            action_type: "payments.transfer",
            parameters: &p1,
            principal_id: "agent_1",
            organization_id: Some("org_1"),
            risk_category: RiskCategory::High,
        };
        let mut t2 = t1.clone();
        t2.parameters = &p2;
        assert_eq!(binding_hash(&t1).unwrap(), binding_hash(&t2).unwrap());
    }

    fn arb_json(depth: u32) -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "[a-z0-9 ]{0,12}".prop_map(Value::from),
        ];
        leaf.prop_recursive(depth, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::from),
                prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        // canonical(canonical(x)) == canonical(x)
        #[test]
        fn canonicalize_is_idempotent(v in arb_json(3)) {
            let once = to_canonical_string(&v).unwrap();
            let reparsed: Value = serde_json::from_str(&once).unwrap();
            let twice = to_canonical_string(&reparsed).unwrap();
            prop_assert_eq!(once, twice);
        }
    }
}

// Path: crates/services/src/policy/context.rs

//! Builds the flattened evaluation context rule conditions address.
//!
//! Sections: `action.*`, `parameters.*`, `risk.*` (the cartridge's raw
//! input; the computed score lands later in the trace), `principal.*`,
//! `enrichment.*`, `time.*`.

use serde_json::{json, Map, Value};
use switchboard_types::domain::{ActionProposal, Principal, RiskInput};
use switchboard_types::time::TimestampMs;

/// Incremental builder for the evaluation context.
#[derive(Debug, Default)]
pub struct EvalContextBuilder {
    root: Map<String, Value>,
}

impl EvalContextBuilder {
    /// Starts an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the `action.*` and `parameters.*` sections.
    pub fn action(mut self, proposal: &ActionProposal, side_effect: bool) -> Self {
        self.root.insert(
            "action".into(),
            json!({
                "actionType": proposal.action_type,
                "sideEffect": side_effect,
                "confidence": proposal.confidence,
            }),
        );
        self.root
            .insert("parameters".into(), proposal.parameters.clone());
        self
    }

    /// Adds the `principal.*` section.
    pub fn principal(mut self, principal: &Principal) -> Self {
        self.root.insert(
            "principal".into(),
            json!({
                "id": principal.id,
                "type": principal.principal_type,
                "organizationId": principal.organization_id,
                "roles": principal.roles,
            }),
        );
        self
    }

    /// Adds the `risk.*` section from the cartridge's raw input.
    pub fn risk(mut self, input: &RiskInput) -> Self {
        self.root.insert(
            "risk".into(),
            json!({
                "baseRisk": input.base_risk,
                "dollarsAtRisk": input.exposure.dollars_at_risk,
                "blastRadius": input.exposure.blast_radius,
                "reversibility": input.reversibility,
            }),
        );
        self
    }

    /// Adds the `enrichment.*` section from cartridge context enrichment.
    pub fn enrichment(mut self, enrichment: &Map<String, Value>) -> Self {
        self.root
            .insert("enrichment".into(), Value::Object(enrichment.clone()));
        self
    }

    /// Adds the `time.*` section.
    pub fn time(mut self, now: TimestampMs) -> Self {
        let ms_of_day = now.rem_euclid(switchboard_types::time::DAY_MS);
        let hour = ms_of_day / 3_600_000;
        // Day 0 of the epoch was a Thursday.
        let day_of_week = (now.div_euclid(switchboard_types::time::DAY_MS) + 4).rem_euclid(7);
        self.root.insert(
            "time".into(),
            json!({
                "epochMs": now,
                "hour": hour,
                "dayOfWeek": day_of_week,
            }),
        );
        self
    }

    /// Finishes the context.
    pub fn build(self) -> Value {
        Value::Object(self.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use switchboard_types::domain::PrincipalType;

    #[test]
    fn sections_land_under_expected_keys() {
        let proposal = ActionProposal {
            id: "prop_1".into(),
            action_type: "ads.campaign.pause".into(),
            parameters: json!({"campaignId": "camp_1"}),
            evidence: vec![],
            confidence: 0.9,
            originating_message_id: None,
        };
        let principal = Principal {
            id: "agent_1".into(),
            principal_type: PrincipalType::Agent,
            name: "Optimizer".into(),
            organization_id: Some("org_1".into()),
            roles: vec!["operator".into()],
        };
        let ctx = EvalContextBuilder::new()
            .action(&proposal, true)
            .principal(&principal)
            .time(1_700_000_000_000)
            .build();
        assert_eq!(ctx["action"]["actionType"], "ads.campaign.pause");
        assert_eq!(ctx["parameters"]["campaignId"], "camp_1");
        assert_eq!(ctx["principal"]["organizationId"], "org_1");
        assert!(ctx["time"]["hour"].as_i64().unwrap() < 24);
    }
}

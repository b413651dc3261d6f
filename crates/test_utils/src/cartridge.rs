// Path: crates/test_utils/src/cartridge.rs

//! A scriptable mock cartridge.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use switchboard_api::cartridge::{Cartridge, CartridgeContext};
use switchboard_types::domain::{
    ActionDescriptor, CartridgeManifest, EntityRef, EntityResolution, ExecuteResult,
    GuardrailConfig, RiskCategory, RiskInput, UndoRecipe,
};
use switchboard_types::error::CartridgeError;

/// Per-action script: what risk to report, how to execute, how often to
/// fail first.
#[derive(Debug, Clone)]
pub struct ScriptedAction {
    /// The risk input returned for this action type.
    pub risk: RiskInput,
    /// The result returned on a successful execution.
    pub result: ExecuteResult,
    /// How many leading attempts fail with a transient error.
    pub transient_failures: u32,
}

impl Default for ScriptedAction {
    fn default() -> Self {
        Self {
            risk: RiskInput::default(),
            result: ExecuteResult::ok("done"),
            transient_failures: 0,
        }
    }
}

/// A cartridge whose behavior is scripted per action type.
pub struct MockCartridge {
    manifest: CartridgeManifest,
    scripts: Mutex<HashMap<String, ScriptedAction>>,
    entity_scripts: Mutex<HashMap<String, EntityResolution>>,
    snapshots: Mutex<HashMap<String, Value>>,
    failures_seen: Mutex<HashMap<String, u32>>,
    executed: Mutex<Vec<(String, Value)>>,
}

impl MockCartridge {
    /// An ads-flavored cartridge declaring the usual campaign actions.
    pub fn ads(version: &str) -> Self {
        let actions = [
            ("ads.campaign.pause", "Pause campaign", true),
            ("ads.campaign.resume", "Resume campaign", true),
            ("ads.budget.adjust", "Adjust budget", true),
            ("ads.targeting.modify", "Modify targeting", false),
        ];
        Self {
            manifest: CartridgeManifest {
                id: "ads".into(),
                name: "Ads".into(),
                version: version.into(),
                description: "Mock ads platform".into(),
                actions: actions
                    .iter()
                    .map(|(action_type, name, reversible)| ActionDescriptor {
                        action_type: action_type.to_string(),
                        name: name.to_string(),
                        description: String::new(),
                        parameters_schema: json!({
                            "type": "object",
                            "required": ["campaignId"],
                        }),
                        base_risk_category: RiskCategory::Low,
                        reversible: *reversible,
                    })
                    .collect(),
                required_connections: vec!["ads_api".into()],
                default_policies: vec![],
            },
            scripts: Mutex::new(HashMap::new()),
            entity_scripts: Mutex::new(HashMap::new()),
            snapshots: Mutex::new(HashMap::new()),
            failures_seen: Mutex::new(HashMap::new()),
            executed: Mutex::new(Vec::new()),
        }
    }

    /// Scripts one action type.
    pub fn script(&self, action_type: &str, script: ScriptedAction) {
        self.scripts
            .lock()
            .unwrap()
            .insert(action_type.to_string(), script);
    }

    /// Scripts entity resolution for one reference.
    pub fn script_entity(&self, reference: &str, resolution: EntityResolution) {
        self.entity_scripts
            .lock()
            .unwrap()
            .insert(reference.to_string(), resolution);
    }

    /// Seeds the read-back snapshot for an entity.
    pub fn seed_snapshot(&self, entity_id: &str, state: Value) {
        self.snapshots
            .lock()
            .unwrap()
            .insert(entity_id.to_string(), state);
    }

    /// Every executed `(action_type, parameters)` in order.
    pub fn executed(&self) -> Vec<(String, Value)> {
        self.executed.lock().unwrap().clone()
    }

    /// A pause script that hands back an undo recipe pointing at resume.
    pub fn pause_with_undo(campaign_id: &str, undo_expires_at: i64) -> ScriptedAction {
        ScriptedAction {
            risk: RiskInput::default(),
            result: ExecuteResult {
                success: true,
                summary: format!("paused campaign {}", campaign_id),
                external_refs: vec![format!("ads:{}", campaign_id)],
                rollback_available: true,
                partial_failures: vec![],
                duration_ms: 0,
                undo_recipe: Some(UndoRecipe {
                    action_type: "ads.campaign.resume".into(),
                    parameters: json!({ "campaignId": campaign_id, "entityId": campaign_id }),
                    undo_expires_at,
                }),
            },
            transient_failures: 0,
        }
    }
}

#[async_trait]
impl Cartridge for MockCartridge {
    fn manifest(&self) -> CartridgeManifest {
        self.manifest.clone()
    }

    async fn get_risk_input(
        &self,
        action_type: &str,
        _parameters: &Value,
        _ctx: &CartridgeContext,
    ) -> Result<RiskInput, CartridgeError> {
        Ok(self
            .scripts
            .lock()
            .unwrap()
            .get(action_type)
            .map(|s| s.risk.clone())
            .unwrap_or_default())
    }

    async fn enrich_context(
        &self,
        _action_type: &str,
        parameters: &Value,
        _ctx: &CartridgeContext,
    ) -> Result<serde_json::Map<String, Value>, CartridgeError> {
        let mut enrichment = serde_json::Map::new();
        if let Some(campaign) = parameters.get("campaignId") {
            enrichment.insert("campaign".into(), json!({ "id": campaign, "status": "active" }));
        }
        Ok(enrichment)
    }

    async fn execute(
        &self,
        action_type: &str,
        parameters: &Value,
        _ctx: &CartridgeContext,
    ) -> Result<ExecuteResult, CartridgeError> {
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(action_type)
            .cloned()
            .unwrap_or_default();

        if script.transient_failures > 0 {
            let mut failures = self.failures_seen.lock().unwrap();
            let seen = failures.entry(action_type.to_string()).or_insert(0);
            if *seen < script.transient_failures {
                *seen += 1;
                return Err(CartridgeError::Transient("upstream flaked".into()));
            }
        }

        self.executed
            .lock()
            .unwrap()
            .push((action_type.to_string(), parameters.clone()));
        Ok(script.result)
    }

    fn guardrails(&self) -> GuardrailConfig {
        GuardrailConfig::default()
    }

    async fn resolve_entity(
        &self,
        reference: &EntityRef,
    ) -> Result<EntityResolution, CartridgeError> {
        if let Some(scripted) = self.entity_scripts.lock().unwrap().get(&reference.reference) {
            return Ok(scripted.clone());
        }
        Ok(EntityResolution::Resolved {
            entity_id: reference.reference.clone(),
            display_name: reference.reference.clone(),
            data: Value::Null,
        })
    }

    async fn capture_snapshot(&self, entity_id: &str) -> Result<Option<Value>, CartridgeError> {
        Ok(self.snapshots.lock().unwrap().get(entity_id).cloned())
    }
}

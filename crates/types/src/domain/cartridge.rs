// Path: crates/types/src/domain/cartridge.rs

//! Cartridge manifests, guardrail declarations, and health reports.
//!
//! A cartridge is a domain plugin teaching the core how to score risk and
//! execute actions for one external service. The manifest is its public
//! contract; guardrails are the operational limits the core enforces on its
//! behalf.

use super::policy::Policy;
use super::risk::RiskCategory;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// One action a cartridge declares in its manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDescriptor {
    /// Namespaced action type, e.g. `ads.campaign.pause`.
    pub action_type: String,
    /// Display name.
    pub name: String,
    /// What the action does.
    pub description: String,
    /// JSON schema for the action's parameters.
    pub parameters_schema: Value,
    /// The cartridge's base risk band for this action.
    pub base_risk_category: RiskCategory,
    /// Whether the action can be reversed after execution.
    pub reversible: bool,
}

/// A cartridge's public contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartridgeManifest {
    /// Stable cartridge id, also the action-type prefix for inference.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Semver version string, enforced by the registry.
    pub version: String,
    /// What the cartridge integrates with.
    pub description: String,
    /// Actions the cartridge declares.
    pub actions: Vec<ActionDescriptor>,
    /// Named external connections the cartridge requires.
    #[serde(default)]
    pub required_connections: Vec<String>,
    /// Policies the cartridge ships as defaults.
    #[serde(default)]
    pub default_policies: Vec<Policy>,
}

impl CartridgeManifest {
    /// Whether the manifest declares the given action type.
    pub fn declares(&self, action_type: &str) -> bool {
        self.actions.iter().any(|a| a.action_type == action_type)
    }

    /// The descriptor for an action type, when declared.
    pub fn action(&self, action_type: &str) -> Option<&ActionDescriptor> {
        self.actions.iter().find(|a| a.action_type == action_type)
    }
}

/// Scope of one rate limit rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum RateLimitScope {
    /// Counts every action through the cartridge.
    Global,
    /// Counts one action type only.
    ActionType {
        /// The action type counted.
        action_type: String,
    },
}

/// One declared rate limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitRule {
    /// What the rule counts.
    #[serde(flatten)]
    pub scope: RateLimitScope,
    /// Maximum actions inside the window. At the limit is allowed; one past
    /// it is denied.
    pub max_count: u32,
    /// The rolling window, in milliseconds.
    pub window_ms: i64,
}

/// One declared cooldown.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CooldownRule {
    /// The action type cooled down, or `None` for all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_type: Option<String>,
    /// Minimum gap between touches of the same entity. A touch at exactly
    /// the gap is allowed.
    pub cooldown_ms: i64,
}

/// Operational limits a cartridge declares for the core to enforce.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardrailConfig {
    /// Rate limits.
    #[serde(default)]
    pub rate_limits: Vec<RateLimitRule>,
    /// Cooldowns.
    #[serde(default)]
    pub cooldowns: Vec<CooldownRule>,
    /// Entity ids that may never be touched.
    #[serde(default)]
    pub protected_entities: BTreeSet<String>,
}

/// Cartridge health, surfaced through the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    /// Coarse health state.
    pub status: HealthState,
    /// Round-trip latency to the external system, when measured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    /// Capability strings the cartridge reports.
    #[serde(default)]
    pub capabilities: Vec<String>,
}

/// Coarse cartridge health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    /// Fully operational.
    Healthy,
    /// Operational with degraded latency or partial capability.
    Degraded,
    /// Not operational.
    Unhealthy,
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self {
            status: HealthState::Healthy,
            latency_ms: None,
            capabilities: Vec::new(),
        }
    }
}

// Path: crates/types/src/domain/risk.rs

//! Risk categories, cartridge risk inputs, and computed risk scores.

use serde::{Deserialize, Serialize};

/// The severity band of a proposed action.
///
/// Ordering matters: comparisons use the derived `Ord`, where `None` is the
/// lowest band and `Critical` the highest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskCategory {
    /// No meaningful risk.
    #[default]
    None,
    /// Routine, low-impact operations.
    Low,
    /// Operations with noticeable but recoverable impact.
    Medium,
    /// Operations with substantial or hard-to-recover impact.
    High,
    /// Operations that can cause irreversible or catastrophic impact.
    Critical,
}

impl RiskCategory {
    /// The score pedestal contributed by a cartridge's base risk assessment.
    pub fn pedestal(self) -> f64 {
        match self {
            Self::None => 0.0,
            Self::Low => 20.0,
            Self::Medium => 40.0,
            Self::High => 65.0,
            Self::Critical => 85.0,
        }
    }

    /// Derives the category for a clamped raw score.
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            Self::Critical
        } else if score >= 60.0 {
            Self::High
        } else if score >= 35.0 {
            Self::Medium
        } else if score >= 10.0 {
            Self::Low
        } else {
            Self::None
        }
    }
}

impl std::fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// What a human must do before the action may run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalRequirement {
    /// No approval needed; the action may execute immediately.
    #[default]
    None,
    /// A single approver from the standard pool.
    Standard,
    /// An approver from the elevated pool.
    Elevated,
    /// Approval is required regardless of other signals and cannot be
    /// fast-pathed by trust.
    Mandatory,
}

impl ApprovalRequirement {
    /// Whether this requirement blocks immediate execution.
    pub fn blocks_execution(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// How completely an action can be undone after execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reversibility {
    /// The action can be fully reversed.
    Full,
    /// The action can be partially reversed.
    Partial,
    /// The action cannot be reversed.
    None,
}

impl Reversibility {
    /// The score penalty for reduced reversibility.
    pub fn penalty(self) -> f64 {
        match self {
            Self::Full => 0.0,
            Self::Partial => 8.0,
            Self::None => 15.0,
        }
    }
}

/// Monetary and structural exposure of an action.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exposure {
    /// Dollars put at risk by the action. Never negative.
    pub dollars_at_risk: f64,
    /// How many downstream entities the action can affect. Never negative.
    pub blast_radius: u32,
}

/// Sensitivity flags reported by the cartridge about the target entity.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sensitivity {
    /// The entity's metrics are currently volatile.
    pub entity_volatile: bool,
    /// The entity is in a learning or ramp-up phase.
    pub learning_phase: bool,
    /// The entity was modified recently by another actor.
    pub recently_modified: bool,
}

/// A cartridge's risk assessment of one proposed action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskInput {
    /// The cartridge's base risk band for this action type.
    pub base_risk: RiskCategory,
    /// Monetary and structural exposure.
    pub exposure: Exposure,
    /// How completely the action can be undone.
    pub reversibility: Reversibility,
    /// Sensitivity flags about the target.
    pub sensitivity: Sensitivity,
}

impl Default for RiskInput {
    fn default() -> Self {
        Self {
            base_risk: RiskCategory::Low,
            exposure: Exposure::default(),
            reversibility: Reversibility::Full,
            sensitivity: Sensitivity::default(),
        }
    }
}

/// One additive step in a risk computation, kept for auditability.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskFactor {
    /// Short machine name of the factor, e.g. `base_risk` or `blast_radius`.
    pub factor: String,
    /// The configured weight applied.
    pub weight: f64,
    /// The points this factor contributed to the raw score.
    pub contribution: f64,
    /// Human-readable detail.
    pub detail: String,
}

/// The computed risk score for one action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskScore {
    /// The clamped raw score in [0, 100].
    pub raw_score: f64,
    /// The derived category.
    pub category: RiskCategory,
    /// Every additive step that produced the score, in order.
    pub factors: Vec<RiskFactor>,
}

/// Rolling context about the principal's recent behavior, used by the
/// composite-risk adjustment to catch bursts and spread.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeRiskContext {
    /// Actions executed by the principal inside the window.
    pub recent_action_count: u32,
    /// The window the counts were taken over, in milliseconds.
    pub window_ms: i64,
    /// Total dollars at risk across the window.
    pub cumulative_exposure: f64,
    /// Distinct entities touched inside the window.
    pub distinct_target_entities: u32,
    /// Distinct cartridges invoked inside the window.
    pub distinct_cartridges: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_thresholds() {
        assert_eq!(RiskCategory::from_score(0.0), RiskCategory::None);
        assert_eq!(RiskCategory::from_score(9.9), RiskCategory::None);
        assert_eq!(RiskCategory::from_score(10.0), RiskCategory::Low);
        assert_eq!(RiskCategory::from_score(35.0), RiskCategory::Medium);
        assert_eq!(RiskCategory::from_score(60.0), RiskCategory::High);
        assert_eq!(RiskCategory::from_score(80.0), RiskCategory::Critical);
        assert_eq!(RiskCategory::from_score(100.0), RiskCategory::Critical);
    }

    #[test]
    fn categories_are_ordered() {
        assert!(RiskCategory::Critical > RiskCategory::High);
        assert!(RiskCategory::Low > RiskCategory::None);
        assert!(ApprovalRequirement::Mandatory > ApprovalRequirement::Elevated);
    }
}

// Path: crates/types/src/domain/identity.rs

//! Principals, governance identity specs, and role overlays.
//!
//! A principal's effective governance posture is never read off a single
//! record: the base [`IdentitySpec`] is composed with every active
//! [`RoleOverlay`] into a [`ResolvedIdentity`] at evaluation time. The merge
//! itself lives in `switchboard-services`; the types here only carry data.

use super::risk::{ApprovalRequirement, RiskCategory};
use crate::time::TimestampMs;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Who is acting: a human operator or an autonomous agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalType {
    /// A human user.
    User,
    /// An autonomous agent.
    Agent,
}

/// An acting identity, created by the external identity layer and immutable
/// from the core's perspective.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    /// Stable identifier.
    pub id: String,
    /// Whether this is a user or an agent.
    #[serde(rename = "type")]
    pub principal_type: PrincipalType,
    /// Display name.
    pub name: String,
    /// Organization scope, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    /// Role names granted by the identity layer.
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Spend ceilings, each optional. `None` means "no limit".
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendLimits {
    /// Ceiling over a rolling day.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily: Option<f64>,
    /// Ceiling over a rolling week.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weekly: Option<f64>,
    /// Ceiling over a rolling month.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly: Option<f64>,
    /// Ceiling for any single action.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_action: Option<f64>,
}

fn min_opt(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.min(y)),
        (Some(x), None) => Some(x),
        (None, Some(y)) => Some(y),
        (None, None) => None,
    }
}

fn max_opt(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    // None is "no limit", which dominates any finite ceiling when relaxing.
    match (a, b) {
        (Some(x), Some(y)) => Some(x.max(y)),
        _ => None,
    }
}

impl SpendLimits {
    /// Tightens limits: min of each pair, with `None` treated as no opinion.
    pub fn tighten(&self, other: &SpendLimits) -> SpendLimits {
        SpendLimits {
            daily: min_opt(self.daily, other.daily),
            weekly: min_opt(self.weekly, other.weekly),
            monthly: min_opt(self.monthly, other.monthly),
            per_action: min_opt(self.per_action, other.per_action),
        }
    }

    /// Relaxes limits: max of each pair, with `None` preserving no-limit.
    pub fn relax(&self, other: &SpendLimits) -> SpendLimits {
        SpendLimits {
            daily: max_opt(self.daily, other.daily),
            weekly: max_opt(self.weekly, other.weekly),
            monthly: max_opt(self.monthly, other.monthly),
            per_action: max_opt(self.per_action, other.per_action),
        }
    }
}

/// The org-level governance dial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GovernanceProfile {
    /// Log everything, gate nothing.
    Observe,
    /// Default gating posture.
    Guarded,
    /// Elevated gating posture.
    Strict,
    /// Everything requires mandatory approval.
    Locked,
}

/// Per-principal governance knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentitySpec {
    /// The principal this spec governs.
    pub principal_id: String,
    /// Approval requirement per risk category.
    #[serde(default)]
    pub risk_tolerance: BTreeMap<RiskCategory, ApprovalRequirement>,
    /// Spend ceilings applying across every cartridge.
    #[serde(default)]
    pub global_spend_limits: SpendLimits,
    /// Spend ceilings per cartridge id.
    #[serde(default)]
    pub spend_limits: BTreeMap<String, SpendLimits>,
    /// Action types this principal may never perform.
    #[serde(default)]
    pub forbidden_behaviors: BTreeSet<String>,
    /// Action types this principal performs without approval when nothing
    /// else denies.
    #[serde(default)]
    pub trust_behaviors: BTreeSet<String>,
    /// Optional org-level governance dial.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub governance_profile: Option<GovernanceProfile>,
}

impl IdentitySpec {
    /// A spec with no tolerances, limits, or behavior lists.
    pub fn empty(principal_id: impl Into<String>) -> Self {
        Self {
            principal_id: principal_id.into(),
            risk_tolerance: BTreeMap::new(),
            global_spend_limits: SpendLimits::default(),
            spend_limits: BTreeMap::new(),
            forbidden_behaviors: BTreeSet::new(),
            trust_behaviors: BTreeSet::new(),
            governance_profile: None,
        }
    }

    /// The approval requirement for a category, defaulting upward: an
    /// unconfigured category falls back to `Standard` for medium and above,
    /// `None` below.
    pub fn tolerance_for(&self, category: RiskCategory) -> ApprovalRequirement {
        if let Some(req) = self.risk_tolerance.get(&category) {
            return *req;
        }
        if category >= RiskCategory::Medium {
            ApprovalRequirement::Standard
        } else {
            ApprovalRequirement::None
        }
    }
}

/// Whether an overlay narrows or widens the base spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayMode {
    /// Intersect trust, union forbidden, tighten limits.
    Restrict,
    /// Union trust, subtract forbidden, relax limits.
    Extend,
}

/// A recurring local-time window an overlay is active in.
///
/// The window is compared in the overlay's stated timezone, carried as a
/// fixed offset from UTC in minutes. A window may wrap midnight
/// (`start_hour > end_hour`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeWindow {
    /// Inclusive start hour, 0-23, in the overlay's timezone.
    pub start_hour: u8,
    /// Exclusive end hour, 0-24, in the overlay's timezone.
    pub end_hour: u8,
    /// Offset of the overlay's timezone from UTC, in minutes.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl TimeWindow {
    /// Whether `now` falls inside the window.
    pub fn contains(&self, now: TimestampMs) -> bool {
        let local_ms = now + i64::from(self.utc_offset_minutes) * 60_000;
        let ms_of_day = local_ms.rem_euclid(crate::time::DAY_MS);
        let hour = (ms_of_day / 3_600_000) as u8;
        if self.start_hour <= self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            // Wraps midnight.
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

/// Conditions gating whether an overlay applies. All stated conditions must
/// hold conjunctively.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayConditions {
    /// Active only inside this local-time window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_window: Option<TimeWindow>,
    /// Active only for these cartridges, matched as a literal set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cartridge_ids: Option<BTreeSet<String>>,
    /// Active only for these action types, matched as a literal set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_types: Option<BTreeSet<String>>,
}

/// The sets and limits an overlay contributes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayOverrides {
    /// Trust set contributed by this overlay.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trust_behaviors: Option<BTreeSet<String>>,
    /// Forbidden set contributed by this overlay.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forbidden_behaviors: Option<BTreeSet<String>>,
    /// Global spend limits contributed by this overlay.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_spend_limits: Option<SpendLimits>,
    /// Per-cartridge spend limits contributed by this overlay.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spend_limits: Option<BTreeMap<String, SpendLimits>>,
}

/// A conditional modifier over a principal's identity spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleOverlay {
    /// Stable identifier.
    pub id: String,
    /// The principal this overlay modifies.
    pub principal_id: String,
    /// Whether the overlay narrows or widens.
    pub mode: OverlayMode,
    /// Application order; lower priority is applied first.
    pub priority: u32,
    /// Inactive overlays are skipped entirely.
    pub active: bool,
    /// Conditions gating the overlay.
    #[serde(default)]
    pub conditions: OverlayConditions,
    /// The sets and limits contributed.
    #[serde(default)]
    pub overrides: OverlayOverrides,
}

/// The composed result of identity resolution for one evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedIdentity {
    /// The principal resolved.
    pub principal_id: String,
    /// Effective approval requirement per risk category.
    pub effective_risk_tolerance: BTreeMap<RiskCategory, ApprovalRequirement>,
    /// Effective spend ceilings, with the cartridge-specific limits for the
    /// evaluation's cartridge already folded in.
    pub effective_spend_limits: SpendLimits,
    /// Effective forbidden action types.
    pub effective_forbidden_behaviors: BTreeSet<String>,
    /// Effective trusted action types.
    pub effective_trust_behaviors: BTreeSet<String>,
    /// Overlays that matched and were applied, in application order.
    pub matched_overlay_ids: Vec<String>,
    /// The governance dial carried over from the spec.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub governance_profile: Option<GovernanceProfile>,
}

impl ResolvedIdentity {
    /// The approval requirement for a category after overlay composition,
    /// with the same upward default as [`IdentitySpec::tolerance_for`].
    pub fn tolerance_for(&self, category: RiskCategory) -> ApprovalRequirement {
        if let Some(req) = self.effective_risk_tolerance.get(&category) {
            return *req;
        }
        if category >= RiskCategory::Medium {
            ApprovalRequirement::Standard
        } else {
            ApprovalRequirement::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tighten_takes_minimum_and_none_has_no_opinion() {
        let a = SpendLimits {
            daily: Some(100.0),
            weekly: None,
            monthly: Some(1000.0),
            per_action: Some(50.0),
        };
        let b = SpendLimits {
            daily: Some(80.0),
            weekly: Some(500.0),
            monthly: None,
            per_action: Some(60.0),
        };
        let t = a.tighten(&b);
        assert_eq!(t.daily, Some(80.0));
        assert_eq!(t.weekly, Some(500.0));
        assert_eq!(t.monthly, Some(1000.0));
        assert_eq!(t.per_action, Some(50.0));
    }

    #[test]
    fn relax_takes_maximum_and_none_wins() {
        let a = SpendLimits {
            daily: Some(100.0),
            ..Default::default()
        };
        let b = SpendLimits {
            daily: Some(80.0),
            weekly: Some(500.0),
            ..Default::default()
        };
        let r = a.relax(&b);
        assert_eq!(r.daily, Some(100.0));
        // `a.weekly` is None (no limit), which dominates.
        assert_eq!(r.weekly, None);
    }

    #[test]
    fn time_window_respects_offset_and_wrap() {
        // 1970-01-01 23:30 UTC.
        let late_utc = 23 * 3_600_000 + 30 * 60_000;
        let w = TimeWindow {
            start_hour: 22,
            end_hour: 6,
            utc_offset_minutes: 0,
        };
        assert!(w.contains(late_utc));
        assert!(w.contains(3 * 3_600_000));
        assert!(!w.contains(12 * 3_600_000));

        // Same instant is 01:30 local at +120 minutes, inside a 0-6 window.
        let w2 = TimeWindow {
            start_hour: 0,
            end_hour: 6,
            utc_offset_minutes: 120,
        };
        assert!(w2.contains(late_utc));
    }

    #[test]
    fn unconfigured_tolerance_defaults_upward() {
        let spec = IdentitySpec::empty("agent_1");
        assert_eq!(
            spec.tolerance_for(RiskCategory::Low),
            ApprovalRequirement::None
        );
        assert_eq!(
            spec.tolerance_for(RiskCategory::High),
            ApprovalRequirement::Standard
        );
    }
}

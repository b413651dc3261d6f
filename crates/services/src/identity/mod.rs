// Path: crates/services/src/identity/mod.rs

//! Identity resolution.
//!
//! Composes a principal's base `IdentitySpec` with every active, matching
//! `RoleOverlay` into a `ResolvedIdentity`. The resolver is pure: the
//! orchestrator loads the spec and overlays from the identity store and the
//! merge itself never performs I/O.

use switchboard_types::domain::{
    IdentitySpec, OverlayMode, ResolvedIdentity, RoleOverlay, SpendLimits,
};
use switchboard_types::time::TimestampMs;

/// The evaluation context an overlay's conditions are matched against.
#[derive(Debug, Clone, Copy)]
pub struct ResolutionContext<'a> {
    /// The action type under evaluation.
    pub action_type: &'a str,
    /// The cartridge owning the action type.
    pub cartridge_id: &'a str,
    /// The evaluation instant.
    pub now: TimestampMs,
}

/// Whether every stated condition on an overlay holds. Conditions are
/// conjunctive; an overlay with no conditions always matches.
fn conditions_hold(overlay: &RoleOverlay, ctx: &ResolutionContext<'_>) -> bool {
    let c = &overlay.conditions;
    if let Some(window) = &c.time_window {
        if !window.contains(ctx.now) {
            return false;
        }
    }
    if let Some(cartridges) = &c.cartridge_ids {
        if !cartridges.contains(ctx.cartridge_id) {
            return false;
        }
    }
    if let Some(actions) = &c.action_types {
        if !actions.contains(ctx.action_type) {
            return false;
        }
    }
    true
}

/// Folds the cartridge-specific spend limits for the evaluation's cartridge
/// into the global limits. Cartridge limits tighten: the effective ceiling
/// is the stricter of the two.
fn select_spend_limits(
    global: &SpendLimits,
    per_cartridge: Option<&SpendLimits>,
) -> SpendLimits {
    match per_cartridge {
        Some(limits) => global.tighten(limits),
        None => *global,
    }
}

/// Resolves the effective governance identity for one evaluation.
///
/// Overlays are filtered to active ones whose conditions hold, sorted by
/// priority ascending (lower applied first), and folded in order:
///
/// * `restrict` intersects trust lists, unions forbidden lists, and
///   tightens spend limits (min, with `None` meaning no opinion).
/// * `extend` unions trust lists, subtracts from forbidden lists, and
///   relaxes spend limits (max, with `None` preserving no-limit).
pub fn resolve(
    spec: &IdentitySpec,
    overlays: &[RoleOverlay],
    ctx: &ResolutionContext<'_>,
) -> ResolvedIdentity {
    let mut applicable: Vec<&RoleOverlay> = overlays
        .iter()
        .filter(|o| o.active && conditions_hold(o, ctx))
        .collect();
    applicable.sort_by_key(|o| o.priority);

    let mut trust = spec.trust_behaviors.clone();
    let mut forbidden = spec.forbidden_behaviors.clone();
    let mut global_limits = spec.global_spend_limits;
    let mut cartridge_limits = spec.spend_limits.get(ctx.cartridge_id).copied();
    let mut tolerance = spec.risk_tolerance.clone();
    let mut matched = Vec::with_capacity(applicable.len());

    for overlay in applicable {
        let ov = &overlay.overrides;
        match overlay.mode {
            OverlayMode::Restrict => {
                if let Some(overlay_trust) = &ov.trust_behaviors {
                    trust = trust.intersection(overlay_trust).cloned().collect();
                }
                if let Some(overlay_forbidden) = &ov.forbidden_behaviors {
                    forbidden = forbidden.union(overlay_forbidden).cloned().collect();
                }
                if let Some(limits) = &ov.global_spend_limits {
                    global_limits = global_limits.tighten(limits);
                }
                if let Some(per_cartridge) = &ov.spend_limits {
                    if let Some(limits) = per_cartridge.get(ctx.cartridge_id) {
                        cartridge_limits = Some(match cartridge_limits {
                            Some(current) => current.tighten(limits),
                            None => *limits,
                        });
                    }
                }
            }
            OverlayMode::Extend => {
                if let Some(overlay_trust) = &ov.trust_behaviors {
                    trust = trust.union(overlay_trust).cloned().collect();
                }
                if let Some(overlay_forbidden) = &ov.forbidden_behaviors {
                    forbidden = forbidden
                        .difference(overlay_forbidden)
                        .cloned()
                        .collect();
                }
                if let Some(limits) = &ov.global_spend_limits {
                    global_limits = global_limits.relax(limits);
                }
                if let Some(per_cartridge) = &ov.spend_limits {
                    if let Some(limits) = per_cartridge.get(ctx.cartridge_id) {
                        cartridge_limits = Some(match cartridge_limits {
                            Some(current) => current.relax(limits),
                            None => *limits,
                        });
                    }
                }
            }
        }
        matched.push(overlay.id.clone());
    }

    // Overlays do not touch the tolerance map today; it is carried through
    // so the engine reads one composed view.
    ResolvedIdentity {
        principal_id: spec.principal_id.clone(),
        effective_risk_tolerance: std::mem::take(&mut tolerance),
        effective_spend_limits: select_spend_limits(&global_limits, cartridge_limits.as_ref()),
        effective_forbidden_behaviors: forbidden,
        effective_trust_behaviors: trust,
        matched_overlay_ids: matched,
        governance_profile: spec.governance_profile,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};
    use switchboard_types::domain::{
        OverlayConditions, OverlayOverrides, TimeWindow,
    };

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn base_spec() -> IdentitySpec {
        let mut spec = IdentitySpec::empty("agent_1");
        spec.trust_behaviors = set(&["ads.campaign.pause", "ads.campaign.resume"]);
        spec.forbidden_behaviors = set(&["payments.transfer"]);
        spec.global_spend_limits = SpendLimits {
            daily: Some(1000.0),
            per_action: Some(100.0),
            ..Default::default()
        };
        spec
    }

    fn ctx(now: TimestampMs) -> ResolutionContext<'static> {
        ResolutionContext {
            action_type: "ads.campaign.pause",
            cartridge_id: "ads",
            now,
        }
    }

    fn overlay(id: &str, mode: OverlayMode, priority: u32) -> RoleOverlay {
        RoleOverlay {
            id: id.into(),
            principal_id: "agent_1".into(),
            mode,
            priority,
            active: true,
            conditions: OverlayConditions::default(),
            overrides: OverlayOverrides::default(),
        }
    }

    #[test]
    fn no_overlays_passes_spec_through() {
        let spec = base_spec();
        let resolved = resolve(&spec, &[], &ctx(0));
        assert_eq!(resolved.effective_trust_behaviors, spec.trust_behaviors);
        assert_eq!(
            resolved.effective_forbidden_behaviors,
            spec.forbidden_behaviors
        );
        assert_eq!(resolved.effective_spend_limits.daily, Some(1000.0));
        assert!(resolved.matched_overlay_ids.is_empty());
    }

    #[test]
    fn restrict_intersects_trust_and_unions_forbidden() {
        let spec = base_spec();
        let mut o = overlay("ovl_1", OverlayMode::Restrict, 0);
        o.overrides.trust_behaviors = Some(set(&["ads.campaign.pause"]));
        o.overrides.forbidden_behaviors = Some(set(&["ads.targeting.modify"]));
        let resolved = resolve(&spec, &[o], &ctx(0));
        assert_eq!(
            resolved.effective_trust_behaviors,
            set(&["ads.campaign.pause"])
        );
        assert_eq!(
            resolved.effective_forbidden_behaviors,
            set(&["payments.transfer", "ads.targeting.modify"])
        );
    }

    #[test]
    fn extend_unions_trust_and_subtracts_forbidden() {
        let spec = base_spec();
        let mut o = overlay("ovl_1", OverlayMode::Extend, 0);
        o.overrides.trust_behaviors = Some(set(&["ads.budget.adjust"]));
        o.overrides.forbidden_behaviors = Some(set(&["payments.transfer"]));
        let resolved = resolve(&spec, &[o], &ctx(0));
        assert!(resolved
            .effective_trust_behaviors
            .contains("ads.budget.adjust"));
        assert!(resolved.effective_forbidden_behaviors.is_empty());
    }

    #[test]
    fn priority_orders_application() {
        // A restrict at priority 0 cuts trust to one action; an extend at
        // priority 1 adds another back. Applied in priority order the final
        // set has both.
        let spec = base_spec();
        let mut restrict = overlay("ovl_restrict", OverlayMode::Restrict, 0);
        restrict.overrides.trust_behaviors = Some(set(&["ads.campaign.pause"]));
        let mut extend = overlay("ovl_extend", OverlayMode::Extend, 1);
        extend.overrides.trust_behaviors = Some(set(&["ads.campaign.resume"]));
        let resolved = resolve(&spec, &[extend.clone(), restrict.clone()], &ctx(0));
        assert_eq!(
            resolved.matched_overlay_ids,
            vec!["ovl_restrict".to_string(), "ovl_extend".to_string()]
        );
        assert_eq!(
            resolved.effective_trust_behaviors,
            set(&["ads.campaign.pause", "ads.campaign.resume"])
        );
    }

    #[test]
    fn inactive_and_unmatched_overlays_are_skipped() {
        let spec = base_spec();
        let mut inactive = overlay("ovl_inactive", OverlayMode::Restrict, 0);
        inactive.active = false;
        inactive.overrides.trust_behaviors = Some(BTreeSet::new());

        let mut wrong_cartridge = overlay("ovl_scoped", OverlayMode::Restrict, 1);
        wrong_cartridge.conditions.cartridge_ids = Some(set(&["payments"]));
        wrong_cartridge.overrides.trust_behaviors = Some(BTreeSet::new());

        let mut off_hours = overlay("ovl_nightly", OverlayMode::Restrict, 2);
        off_hours.conditions.time_window = Some(TimeWindow {
            start_hour: 22,
            end_hour: 6,
            utc_offset_minutes: 0,
        });
        off_hours.overrides.trust_behaviors = Some(BTreeSet::new());

        // Noon UTC: the nightly window does not match.
        let noon = 12 * 3_600_000;
        let resolved = resolve(&spec, &[inactive, wrong_cartridge, off_hours], &ctx(noon));
        assert!(resolved.matched_overlay_ids.is_empty());
        assert_eq!(resolved.effective_trust_behaviors, spec.trust_behaviors);
    }

    #[test]
    fn spend_limits_tighten_and_relax() {
        let spec = base_spec();
        let mut tighten = overlay("ovl_tight", OverlayMode::Restrict, 0);
        tighten.overrides.global_spend_limits = Some(SpendLimits {
            daily: Some(500.0),
            weekly: Some(2000.0),
            ..Default::default()
        });
        let resolved = resolve(&spec, &[tighten], &ctx(0));
        assert_eq!(resolved.effective_spend_limits.daily, Some(500.0));
        assert_eq!(resolved.effective_spend_limits.weekly, Some(2000.0));
        assert_eq!(resolved.effective_spend_limits.per_action, Some(100.0));

        let mut relax = overlay("ovl_relax", OverlayMode::Extend, 0);
        relax.overrides.global_spend_limits = Some(SpendLimits {
            daily: Some(5000.0),
            ..Default::default()
        });
        let resolved = resolve(&base_spec(), &[relax], &ctx(0));
        assert_eq!(resolved.effective_spend_limits.daily, Some(5000.0));
        // The overlay's None relaxes per_action to no-limit.
        assert_eq!(resolved.effective_spend_limits.per_action, None);
    }

    #[test]
    fn cartridge_specific_limits_fold_into_globals() {
        let mut spec = base_spec();
        let mut per_cartridge = BTreeMap::new();
        per_cartridge.insert(
            "ads".to_string(),
            SpendLimits {
                per_action: Some(25.0),
                ..Default::default()
            },
        );
        spec.spend_limits = per_cartridge;
        let resolved = resolve(&spec, &[], &ctx(0));
        // The ads ceiling is the stricter of global 100 and cartridge 25.
        assert_eq!(resolved.effective_spend_limits.per_action, Some(25.0));
        assert_eq!(resolved.effective_spend_limits.daily, Some(1000.0));
    }
}

// Path: crates/services/src/policy/risk.rs

//! Weighted risk scoring and the composite-risk adjustment.
//!
//! Every additive step appears as a factor entry so a reviewer can replay
//! the arithmetic from the decision trace alone.

use switchboard_types::domain::{
    CompositeRiskContext, RiskCategory, RiskFactor, RiskInput, RiskScore,
};

/// Tunable weights for the scorer. The defaults are the shipped behavior;
/// deployments override via configuration.
#[derive(Debug, Clone)]
pub struct RiskScorerConfig {
    /// Points per decade of dollars at risk.
    pub dollar_weight: f64,
    /// Cap on the dollar exposure contribution.
    pub dollar_cap: f64,
    /// Points per unit of blast radius.
    pub blast_radius_weight: f64,
    /// Cap on the blast radius contribution.
    pub blast_radius_cap: f64,
    /// Points per set sensitivity flag.
    pub sensitivity_step: f64,
}

impl Default for RiskScorerConfig {
    fn default() -> Self {
        Self {
            dollar_weight: 5.0,
            dollar_cap: 20.0,
            blast_radius_weight: 1.5,
            blast_radius_cap: 15.0,
            sensitivity_step: 5.0,
        }
    }
}

/// Computes the weighted risk score for one action.
pub fn score(input: &RiskInput, config: &RiskScorerConfig) -> RiskScore {
    let mut factors = Vec::new();
    let mut raw = 0.0;

    let pedestal = input.base_risk.pedestal();
    raw += pedestal;
    factors.push(RiskFactor {
        factor: "base_risk".into(),
        weight: 1.0,
        contribution: pedestal,
        detail: format!("cartridge base risk {}", input.base_risk),
    });

    let dollars = input.exposure.dollars_at_risk.max(0.0);
    let dollar_points = (config.dollar_weight * (1.0 + dollars).log10()).min(config.dollar_cap);
    raw += dollar_points;
    factors.push(RiskFactor {
        factor: "dollars_at_risk".into(),
        weight: config.dollar_weight,
        contribution: dollar_points,
        detail: format!("${:.2} at risk, log-scaled", dollars),
    });

    let blast_points =
        (config.blast_radius_weight * f64::from(input.exposure.blast_radius)).min(config.blast_radius_cap);
    raw += blast_points;
    factors.push(RiskFactor {
        factor: "blast_radius".into(),
        weight: config.blast_radius_weight,
        contribution: blast_points,
        detail: format!("{} downstream entities", input.exposure.blast_radius),
    });

    let reversibility_points = input.reversibility.penalty();
    raw += reversibility_points;
    factors.push(RiskFactor {
        factor: "reversibility".into(),
        weight: 1.0,
        contribution: reversibility_points,
        detail: format!("reversibility penalty {:?}", input.reversibility),
    });

    for (flag, name) in [
        (input.sensitivity.entity_volatile, "entity_volatile"),
        (input.sensitivity.learning_phase, "learning_phase"),
        (input.sensitivity.recently_modified, "recently_modified"),
    ] {
        if flag {
            raw += config.sensitivity_step;
            factors.push(RiskFactor {
                factor: name.into(),
                weight: 1.0,
                contribution: config.sensitivity_step,
                detail: format!("sensitivity flag {} set", name),
            });
        }
    }

    let raw = raw.clamp(0.0, 100.0);
    RiskScore {
        raw_score: raw,
        category: RiskCategory::from_score(raw),
        factors,
    }
}

// Composite adjustment thresholds. Below these the behavior is considered
// routine and contributes nothing.
const BURST_FREE_ACTIONS: u32 = 10;
const BURST_STEP: f64 = 0.5;
const BURST_CAP: f64 = 10.0;
const EXPOSURE_WEIGHT: f64 = 2.0;
const EXPOSURE_CAP: f64 = 10.0;
const ENTITY_SPREAD_FREE: u32 = 5;
const ENTITY_SPREAD_STEP: f64 = 0.5;
const ENTITY_SPREAD_CAP: f64 = 5.0;
const CARTRIDGE_SPREAD_FREE: u32 = 2;
const CARTRIDGE_SPREAD_STEP: f64 = 2.5;
const CARTRIDGE_SPREAD_CAP: f64 = 7.5;

/// Applies the composite-risk adjustment for an agent in a burst,
/// escalating blast radius, or spreading across many cartridges.
///
/// The adjustment can raise the score and category but never lower them.
pub fn adjust_composite(base: &RiskScore, composite: &CompositeRiskContext) -> RiskScore {
    let mut factors = base.factors.clone();
    let mut raw = base.raw_score;

    if composite.recent_action_count > BURST_FREE_ACTIONS {
        let extra = f64::from(composite.recent_action_count - BURST_FREE_ACTIONS);
        let points = (extra * BURST_STEP).min(BURST_CAP);
        raw += points;
        factors.push(RiskFactor {
            factor: "composite_burst".into(),
            weight: BURST_STEP,
            contribution: points,
            detail: format!(
                "{} actions in {} ms window",
                composite.recent_action_count, composite.window_ms
            ),
        });
    }

    if composite.cumulative_exposure > 0.0 {
        let points =
            (EXPOSURE_WEIGHT * (1.0 + composite.cumulative_exposure).log10()).min(EXPOSURE_CAP);
        raw += points;
        factors.push(RiskFactor {
            factor: "composite_exposure".into(),
            weight: EXPOSURE_WEIGHT,
            contribution: points,
            detail: format!(
                "${:.2} cumulative exposure in window",
                composite.cumulative_exposure
            ),
        });
    }

    if composite.distinct_target_entities > ENTITY_SPREAD_FREE {
        let extra = f64::from(composite.distinct_target_entities - ENTITY_SPREAD_FREE);
        let points = (extra * ENTITY_SPREAD_STEP).min(ENTITY_SPREAD_CAP);
        raw += points;
        factors.push(RiskFactor {
            factor: "composite_entity_spread".into(),
            weight: ENTITY_SPREAD_STEP,
            contribution: points,
            detail: format!(
                "{} distinct entities touched in window",
                composite.distinct_target_entities
            ),
        });
    }

    if composite.distinct_cartridges > CARTRIDGE_SPREAD_FREE {
        let extra = f64::from(composite.distinct_cartridges - CARTRIDGE_SPREAD_FREE);
        let points = (extra * CARTRIDGE_SPREAD_STEP).min(CARTRIDGE_SPREAD_CAP);
        raw += points;
        factors.push(RiskFactor {
            factor: "composite_cartridge_spread".into(),
            weight: CARTRIDGE_SPREAD_STEP,
            contribution: points,
            detail: format!(
                "{} distinct cartridges in window",
                composite.distinct_cartridges
            ),
        });
    }

    let raw = raw.clamp(0.0, 100.0);
    // Never lower the category, even at the clamp boundary.
    let category = RiskCategory::from_score(raw).max(base.category);
    RiskScore {
        raw_score: raw.max(base.raw_score),
        category,
        factors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_types::domain::{Exposure, Reversibility, Sensitivity};

    fn input(base: RiskCategory) -> RiskInput {
        RiskInput {
            base_risk: base,
            exposure: Exposure::default(),
            reversibility: Reversibility::Full,
            sensitivity: Sensitivity::default(),
        }
    }

    #[test]
    fn pedestal_alone_maps_to_expected_categories() {
        let cfg = RiskScorerConfig::default();
        assert_eq!(score(&input(RiskCategory::None), &cfg).category, RiskCategory::None);
        assert_eq!(score(&input(RiskCategory::Low), &cfg).category, RiskCategory::Low);
        assert_eq!(score(&input(RiskCategory::Medium), &cfg).category, RiskCategory::Medium);
        assert_eq!(score(&input(RiskCategory::High), &cfg).category, RiskCategory::High);
        assert_eq!(score(&input(RiskCategory::Critical), &cfg).category, RiskCategory::Critical);
    }

    #[test]
    fn every_additive_step_is_a_factor() {
        let cfg = RiskScorerConfig::default();
        let mut i = input(RiskCategory::Medium);
        i.exposure.dollars_at_risk = 999.0;
        i.exposure.blast_radius = 4;
        i.reversibility = Reversibility::Partial;
        i.sensitivity.entity_volatile = true;
        let s = score(&i, &cfg);
        // base + dollars + blast + reversibility + one sensitivity flag.
        assert_eq!(s.factors.len(), 5);
        let total: f64 = s.factors.iter().map(|f| f.contribution).sum();
        assert!((total - s.raw_score).abs() < 1e-9);
    }

    #[test]
    fn dollar_contribution_is_capped() {
        let cfg = RiskScorerConfig::default();
        let mut i = input(RiskCategory::None);
        i.exposure.dollars_at_risk = 1e12;
        let s = score(&i, &cfg);
        let dollar = s.factors.iter().find(|f| f.factor == "dollars_at_risk").unwrap();
        assert!((dollar.contribution - cfg.dollar_cap).abs() < 1e-9);
    }

    #[test]
    fn score_is_clamped_to_100() {
        let cfg = RiskScorerConfig::default();
        let mut i = input(RiskCategory::Critical);
        i.exposure.dollars_at_risk = 1e12;
        i.exposure.blast_radius = 100;
        i.reversibility = Reversibility::None;
        i.sensitivity = Sensitivity {
            entity_volatile: true,
            learning_phase: true,
            recently_modified: true,
        };
        let s = score(&i, &cfg);
        assert!(s.raw_score <= 100.0);
        assert_eq!(s.category, RiskCategory::Critical);
    }

    #[test]
    fn composite_raises_but_never_lowers() {
        let cfg = RiskScorerConfig::default();
        let base = score(&input(RiskCategory::Medium), &cfg);

        let calm = CompositeRiskContext::default();
        let adjusted = adjust_composite(&base, &calm);
        assert_eq!(adjusted.raw_score, base.raw_score);
        assert_eq!(adjusted.category, base.category);

        let bursty = CompositeRiskContext {
            recent_action_count: 40,
            window_ms: 60_000,
            cumulative_exposure: 50_000.0,
            distinct_target_entities: 12,
            distinct_cartridges: 4,
        };
        let adjusted = adjust_composite(&base, &bursty);
        assert!(adjusted.raw_score > base.raw_score);
        assert!(adjusted.category >= base.category);
        assert!(adjusted.factors.len() > base.factors.len());
    }
}

// Path: crates/services/src/lifecycle/composite.rs

//! Rolling per-principal behavior tracking for the composite-risk
//! adjustment.

use dashmap::DashMap;
use std::collections::{BTreeSet, VecDeque};
use switchboard_types::domain::CompositeRiskContext;
use switchboard_types::time::TimestampMs;

#[derive(Debug, Clone)]
struct CompositeEvent {
    at: TimestampMs,
    cartridge_id: String,
    entity_id: Option<String>,
    exposure: f64,
}

/// Maximum events retained per principal.
const MAX_EVENTS: usize = 1024;

/// Tracks recent executions per principal and derives the composite-risk
/// context the scorer consumes.
#[derive(Default)]
pub struct CompositeTracker {
    events: DashMap<String, VecDeque<CompositeEvent>>,
}

impl CompositeTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one executed action.
    pub fn record(
        &self,
        principal_id: &str,
        cartridge_id: &str,
        entity_id: Option<&str>,
        exposure: f64,
        now: TimestampMs,
    ) {
        let mut events = self.events.entry(principal_id.to_string()).or_default();
        events.push_back(CompositeEvent {
            at: now,
            cartridge_id: cartridge_id.to_string(),
            entity_id: entity_id.map(String::from),
            exposure,
        });
        while events.len() > MAX_EVENTS {
            events.pop_front();
        }
    }

    /// Derives the composite context over the given window.
    pub fn context(
        &self,
        principal_id: &str,
        window_ms: i64,
        now: TimestampMs,
    ) -> CompositeRiskContext {
        let Some(events) = self.events.get(principal_id) else {
            return CompositeRiskContext {
                window_ms,
                ..Default::default()
            };
        };
        let cutoff = now - window_ms;
        let mut count = 0u32;
        let mut exposure = 0.0;
        let mut entities = BTreeSet::new();
        let mut cartridges = BTreeSet::new();
        for event in events.iter().filter(|e| e.at > cutoff) {
            count += 1;
            exposure += event.exposure;
            if let Some(entity) = &event.entity_id {
                entities.insert(entity.clone());
            }
            cartridges.insert(event.cartridge_id.clone());
        }
        CompositeRiskContext {
            recent_action_count: count,
            window_ms,
            cumulative_exposure: exposure,
            distinct_target_entities: entities.len() as u32,
            distinct_cartridges: cartridges.len() as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_counts_window_only() {
        let tracker = CompositeTracker::new();
        tracker.record("agent_1", "ads", Some("camp_1"), 100.0, 1_000);
        tracker.record("agent_1", "ads", Some("camp_2"), 50.0, 2_000);
        tracker.record("agent_1", "payments", None, 25.0, 3_000);
        // Old event outside the window.
        tracker.record("agent_1", "ads", Some("camp_3"), 10.0, 3_100);

        let ctx = tracker.context("agent_1", 2_000, 3_500);
        assert_eq!(ctx.recent_action_count, 3);
        assert!((ctx.cumulative_exposure - 85.0).abs() < 1e-9);
        assert_eq!(ctx.distinct_target_entities, 2);
        assert_eq!(ctx.distinct_cartridges, 2);
    }
}

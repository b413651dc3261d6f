// Path: crates/services/src/guardrail/mod.rs

//! In-process guardrail state: action counters, cooldown timestamps, and
//! the spend ledger.
//!
//! Counters are striped per key through DashMap so concurrent lifecycles
//! never contend on a global lock. Multi-instance deployments replace this
//! module with a shared backend implementing the same traits.

use dashmap::DashMap;
use std::collections::VecDeque;
use switchboard_api::spend::{SpendLookup, SpendWindow};
use switchboard_types::domain::RateLimitScope;
use switchboard_types::error::CoreError;
use switchboard_types::time::TimestampMs;

use async_trait::async_trait;

/// Read access to guardrail counters, consumed by the policy engine.
/// Implementations must be cheap and non-suspending.
pub trait GuardrailView: Send + Sync {
    /// How many actions the principal has performed inside the window for
    /// the given scope.
    fn count_in_window(
        &self,
        principal_id: &str,
        cartridge_id: &str,
        scope: &RateLimitScope,
        window_ms: i64,
        now: TimestampMs,
    ) -> u32;

    /// When the entity was last touched, if ever.
    fn last_touched(&self, entity_id: &str) -> Option<TimestampMs>;
}

fn scope_key(principal_id: &str, cartridge_id: &str, scope: &RateLimitScope) -> String {
    match scope {
        RateLimitScope::Global => format!("{}::{}", principal_id, cartridge_id),
        RateLimitScope::ActionType { action_type } => {
            format!("{}::{}::{}", principal_id, cartridge_id, action_type)
        }
    }
}

/// Maximum timestamps retained per counter key.
const MAX_EVENTS_PER_KEY: usize = 4096;

/// Process-wide guardrail counters.
#[derive(Default)]
pub struct GuardrailState {
    action_times: DashMap<String, VecDeque<TimestampMs>>,
    last_entity_touch: DashMap<String, TimestampMs>,
}

impl GuardrailState {
    /// Creates empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an executed action for rate-limit and cooldown accounting.
    pub fn record_action(
        &self,
        principal_id: &str,
        cartridge_id: &str,
        action_type: &str,
        entity_id: Option<&str>,
        now: TimestampMs,
    ) {
        let keys = [
            scope_key(principal_id, cartridge_id, &RateLimitScope::Global),
            scope_key(
                principal_id,
                cartridge_id,
                &RateLimitScope::ActionType {
                    action_type: action_type.to_string(),
                },
            ),
        ];
        for key in keys {
            let mut times = self.action_times.entry(key).or_default();
            times.push_back(now);
            while times.len() > MAX_EVENTS_PER_KEY {
                times.pop_front();
            }
        }
        if let Some(entity) = entity_id {
            self.last_entity_touch.insert(entity.to_string(), now);
        }
    }

    /// Drops timestamps that have aged out of every plausible window.
    /// Called opportunistically; correctness does not depend on it.
    pub fn compact(&self, horizon_ms: i64, now: TimestampMs) {
        for mut entry in self.action_times.iter_mut() {
            while entry
                .front()
                .is_some_and(|t| now.saturating_sub(*t) > horizon_ms)
            {
                entry.pop_front();
            }
        }
    }
}

impl GuardrailView for GuardrailState {
    fn count_in_window(
        &self,
        principal_id: &str,
        cartridge_id: &str,
        scope: &RateLimitScope,
        window_ms: i64,
        now: TimestampMs,
    ) -> u32 {
        let key = scope_key(principal_id, cartridge_id, scope);
        let Some(times) = self.action_times.get(&key) else {
            return 0;
        };
        let cutoff = now - window_ms;
        times.iter().filter(|t| **t > cutoff).count() as u32
    }

    fn last_touched(&self, entity_id: &str) -> Option<TimestampMs> {
        self.last_entity_touch.get(entity_id).map(|t| *t)
    }
}

#[derive(Debug, Clone, Copy)]
struct SpendEvent {
    at: TimestampMs,
    amount: f64,
}

/// In-process spend ledger implementing [`SpendLookup`].
#[derive(Default)]
pub struct InMemorySpendLedger {
    // Keyed by principal; each event carries its cartridge.
    events: DashMap<String, Vec<(String, SpendEvent)>>,
}

impl InMemorySpendLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SpendLookup for InMemorySpendLedger {
    async fn cumulative_spend(
        &self,
        principal_id: &str,
        cartridge_id: Option<&str>,
        window: SpendWindow,
        now: TimestampMs,
    ) -> Result<f64, CoreError> {
        let Some(events) = self.events.get(principal_id) else {
            return Ok(0.0);
        };
        let cutoff = now - window.length_ms();
        Ok(events
            .iter()
            .filter(|(cart, e)| {
                e.at > cutoff && cartridge_id.map(|c| c == cart.as_str()).unwrap_or(true)
            })
            .map(|(_, e)| e.amount)
            .sum())
    }

    async fn record_spend(
        &self,
        principal_id: &str,
        cartridge_id: &str,
        amount: f64,
        now: TimestampMs,
    ) -> Result<(), CoreError> {
        self.events
            .entry(principal_id.to_string())
            .or_default()
            .push((
                cartridge_id.to_string(),
                SpendEvent { at: now, amount },
            ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_counting_is_per_scope() {
        let state = GuardrailState::new();
        for i in 0..5 {
            state.record_action("agent_1", "ads", "ads.campaign.pause", None, i * 100);
        }
        state.record_action("agent_1", "ads", "ads.campaign.resume", None, 450);

        let global = state.count_in_window(
            "agent_1",
            "ads",
            &RateLimitScope::Global,
            10_000,
            500,
        );
        assert_eq!(global, 6);

        let pause_only = state.count_in_window(
            "agent_1",
            "ads",
            &RateLimitScope::ActionType {
                action_type: "ads.campaign.pause".into(),
            },
            10_000,
            500,
        );
        assert_eq!(pause_only, 5);

        // A short window excludes the earliest events. The cutoff itself is
        // outside the window: events at 400 and 450 remain.
        let recent = state.count_in_window(
            "agent_1",
            "ads",
            &RateLimitScope::Global,
            200,
            500,
        );
        assert_eq!(recent, 2);
    }

    #[test]
    fn last_touched_tracks_entities() {
        let state = GuardrailState::new();
        assert_eq!(state.last_touched("camp_1"), None);
        state.record_action("agent_1", "ads", "ads.campaign.pause", Some("camp_1"), 42);
        assert_eq!(state.last_touched("camp_1"), Some(42));
    }

    #[tokio::test]
    async fn spend_ledger_sums_by_window_and_cartridge() {
        let ledger = InMemorySpendLedger::new();
        let day = switchboard_types::time::DAY_MS;
        let now = 10 * day;
        ledger
            .record_spend("agent_1", "ads", 100.0, now - day / 2)
            .await
            .unwrap();
        ledger
            .record_spend("agent_1", "ads", 50.0, now - 3 * day)
            .await
            .unwrap();
        ledger
            .record_spend("agent_1", "payments", 25.0, now - day / 4)
            .await
            .unwrap();

        let daily_all = ledger
            .cumulative_spend("agent_1", None, SpendWindow::Daily, now)
            .await
            .unwrap();
        assert!((daily_all - 125.0).abs() < 1e-9);

        let daily_ads = ledger
            .cumulative_spend("agent_1", Some("ads"), SpendWindow::Daily, now)
            .await
            .unwrap();
        assert!((daily_ads - 100.0).abs() < 1e-9);

        let weekly_ads = ledger
            .cumulative_spend("agent_1", Some("ads"), SpendWindow::Weekly, now)
            .await
            .unwrap();
        assert!((weekly_ads - 150.0).abs() < 1e-9);
    }
}

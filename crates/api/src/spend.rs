// Path: crates/api/src/spend.rs

//! Cumulative spend window lookups.
//!
//! The policy engine itself never suspends; the orchestrator queries the
//! spend lookup before evaluation and hands the engine a snapshot.

use async_trait::async_trait;
use switchboard_types::error::CoreError;
use switchboard_types::time::TimestampMs;

/// A rolling spend window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpendWindow {
    /// The last 24 hours.
    Daily,
    /// The last 7 days.
    Weekly,
    /// The last 30 days.
    Monthly,
}

impl SpendWindow {
    /// The window length in milliseconds.
    pub fn length_ms(self) -> i64 {
        match self {
            Self::Daily => switchboard_types::time::DAY_MS,
            Self::Weekly => switchboard_types::time::WEEK_MS,
            Self::Monthly => switchboard_types::time::MONTH_MS,
        }
    }
}

/// Cumulative spend already committed inside each window, captured before
/// policy evaluation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpendSnapshot {
    /// Spend inside the daily window.
    pub daily: f64,
    /// Spend inside the weekly window.
    pub weekly: f64,
    /// Spend inside the monthly window.
    pub monthly: f64,
}

/// Source of cumulative spend sums.
#[async_trait]
pub trait SpendLookup: Send + Sync {
    /// Total spend by a principal inside a window, optionally scoped to one
    /// cartridge.
    async fn cumulative_spend(
        &self,
        principal_id: &str,
        cartridge_id: Option<&str>,
        window: SpendWindow,
        now: TimestampMs,
    ) -> Result<f64, CoreError>;

    /// Records an executed spend so later windows see it.
    async fn record_spend(
        &self,
        principal_id: &str,
        cartridge_id: &str,
        amount: f64,
        now: TimestampMs,
    ) -> Result<(), CoreError>;

    /// Captures all three windows at once.
    async fn snapshot(
        &self,
        principal_id: &str,
        cartridge_id: Option<&str>,
        now: TimestampMs,
    ) -> Result<SpendSnapshot, CoreError> {
        Ok(SpendSnapshot {
            daily: self
                .cumulative_spend(principal_id, cartridge_id, SpendWindow::Daily, now)
                .await?,
            weekly: self
                .cumulative_spend(principal_id, cartridge_id, SpendWindow::Weekly, now)
                .await?,
            monthly: self
                .cumulative_spend(principal_id, cartridge_id, SpendWindow::Monthly, now)
                .await?,
        })
    }
}

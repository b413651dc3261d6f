// Path: crates/services/src/notify/backoff.rs

//! Exponential backoff with jitter for retrying transient failures.

use rand::Rng;

/// Exponential backoff: `base * factor^(attempt-1)`, capped, with up to
/// `jitter` fraction of random spread.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// First delay, in milliseconds.
    pub base_ms: u64,
    /// Multiplier per attempt.
    pub factor: f64,
    /// Ceiling for any single delay.
    pub max_ms: u64,
    /// Random spread as a fraction of the computed delay, in [0, 1].
    pub jitter: f64,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            base_ms: 200,
            factor: 2.0,
            max_ms: 10_000,
            jitter: 0.2,
        }
    }
}

impl ExponentialBackoff {
    /// The delay before the given attempt, counted from 1.
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1) as i32;
        let raw = (self.base_ms as f64) * self.factor.powi(exponent);
        let capped = raw.min(self.max_ms as f64);
        if self.jitter <= 0.0 {
            return capped as u64;
        }
        let spread = capped * self.jitter;
        let jittered = capped - spread / 2.0 + rand::thread_rng().gen::<f64>() * spread;
        jittered.max(0.0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_and_caps() {
        let backoff = ExponentialBackoff {
            base_ms: 100,
            factor: 2.0,
            max_ms: 1_000,
            jitter: 0.0,
        };
        assert_eq!(backoff.delay_ms(1), 100);
        assert_eq!(backoff.delay_ms(2), 200);
        assert_eq!(backoff.delay_ms(3), 400);
        assert_eq!(backoff.delay_ms(10), 1_000);
    }

    #[test]
    fn jitter_stays_near_the_nominal_delay() {
        let backoff = ExponentialBackoff {
            base_ms: 1_000,
            factor: 1.0,
            max_ms: 1_000,
            jitter: 0.2,
        };
        for _ in 0..100 {
            let d = backoff.delay_ms(1);
            assert!((900..=1_100).contains(&d), "delay {} outside jitter band", d);
        }
    }
}

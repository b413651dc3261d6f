// Path: crates/services/src/notify/bucket.rs

//! A token bucket for throttling outbound calls.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// A token bucket: `capacity` burst, `refill_per_sec` sustained rate.
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Creates a full bucket.
    pub fn new(capacity: f64, refill_per_sec: f64) -> Self {
        Self {
            capacity,
            refill_per_sec,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Takes one token without waiting. Returns false when empty.
    pub async fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().await;
        self.refill(&mut state);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Takes one token, waiting up to `deadline` for a refill. Returns
    /// false when the deadline passes first.
    pub async fn acquire(&self, deadline: Duration) -> bool {
        let give_up = Instant::now() + deadline;
        loop {
            {
                let mut state = self.state.lock().await;
                self.refill(&mut state);
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return true;
                }
            }
            let now = Instant::now();
            if now >= give_up {
                return false;
            }
            // Sleep until roughly one token has dripped in, capped by the
            // deadline.
            let wait_secs = (1.0 / self.refill_per_sec).min((give_up - now).as_secs_f64());
            tokio::time::sleep(Duration::from_secs_f64(wait_secs.max(0.001))).await;
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        state.last_refill = now;
    }
}

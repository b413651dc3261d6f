// Path: crates/services/src/notify/mod.rs

//! Notification fan-out and the shared retry primitives.
//!
//! The composite notifier is best-effort: per-notifier failures are
//! aggregated and logged, never propagated, so a dead chat channel cannot
//! block an approval from being raised.

mod backoff;
mod bucket;

pub use backoff::ExponentialBackoff;
pub use bucket::TokenBucket;

use std::sync::Arc;
use std::time::Duration;
use switchboard_api::notify::{ApprovalNotification, ApprovalNotifier};

/// Default per-notifier delivery deadline.
const NOTIFY_DEADLINE: Duration = Duration::from_secs(10);

/// Fans one notification out to every configured notifier.
pub struct CompositeNotifier {
    notifiers: Vec<Arc<dyn ApprovalNotifier>>,
    bucket: TokenBucket,
}

impl CompositeNotifier {
    /// Creates a composite over the given notifiers. The token bucket
    /// throttles total outbound sends.
    pub fn new(notifiers: Vec<Arc<dyn ApprovalNotifier>>, bucket: TokenBucket) -> Self {
        Self { notifiers, bucket }
    }

    /// A composite with no notifiers, for tests and headless deployments.
    pub fn disabled() -> Self {
        Self {
            notifiers: Vec::new(),
            bucket: TokenBucket::new(30.0, 30.0),
        }
    }

    /// Delivers to every notifier, returning how many succeeded. Failures
    /// and timeouts are logged per notifier.
    pub async fn notify_all(&self, notification: &ApprovalNotification) -> usize {
        let mut delivered = 0;
        for notifier in &self.notifiers {
            if !self.bucket.acquire(NOTIFY_DEADLINE).await {
                tracing::warn!(
                    notifier = notifier.name(),
                    approval = %notification.approval_id,
                    "notification dropped: outbound rate limiter saturated"
                );
                continue;
            }
            match tokio::time::timeout(NOTIFY_DEADLINE, notifier.notify(notification)).await {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(err)) => {
                    tracing::warn!(
                        notifier = notifier.name(),
                        approval = %notification.approval_id,
                        %err,
                        "notification failed"
                    );
                }
                Err(_) => {
                    tracing::warn!(
                        notifier = notifier.name(),
                        approval = %notification.approval_id,
                        "notification timed out"
                    );
                }
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use switchboard_api::notify::NotifyError;
    use switchboard_types::domain::RiskCategory;

    struct CountingNotifier {
        name: &'static str,
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl ApprovalNotifier for CountingNotifier {
        fn name(&self) -> &str {
            self.name
        }

        async fn notify(&self, _n: &ApprovalNotification) -> Result<(), NotifyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(NotifyError {
                    notifier: self.name.into(),
                    message: "channel down".into(),
                })
            } else {
                Ok(())
            }
        }
    }

    fn notification() -> ApprovalNotification {
        ApprovalNotification {
            approval_id: "apr_1".into(),
            envelope_id: "env_1".into(),
            summary: "pause campaign".into(),
            risk_category: RiskCategory::High,
            binding_hash: "hash".into(),
            approvers: vec!["reviewer_1".into()],
            is_reminder: false,
        }
    }

    #[tokio::test]
    async fn failures_do_not_stop_the_fan_out() {
        let ok = Arc::new(CountingNotifier {
            name: "telegram",
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let broken = Arc::new(CountingNotifier {
            name: "slack",
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let composite = CompositeNotifier::new(
            vec![broken.clone(), ok.clone()],
            TokenBucket::new(30.0, 30.0),
        );
        let delivered = composite.notify_all(&notification()).await;
        assert_eq!(delivered, 1);
        assert_eq!(ok.calls.load(Ordering::SeqCst), 1);
        assert_eq!(broken.calls.load(Ordering::SeqCst), 1);
    }
}

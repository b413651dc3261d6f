// Path: crates/test_utils/src/harness.rs

//! One-call wiring of an orchestrator over memory stores, in the style of
//! a test cluster builder.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use switchboard_api::notify::{ApprovalNotification, ApprovalNotifier, NotifyError};
use switchboard_api::store::{IdentityStore, PolicyStore};
use switchboard_services::audit::{AuditLedger, Redactor};
use switchboard_services::guard::{
    ExecutionGuard, IdempotencyInterceptor, RedactionInterceptor, RetryInterceptor,
    VerificationInterceptor,
};
use switchboard_services::guardrail::{GuardrailState, InMemorySpendLedger};
use switchboard_services::lifecycle::{Orchestrator, OrchestratorConfig, Stores};
use switchboard_services::notify::{CompositeNotifier, ExponentialBackoff, TokenBucket};
use switchboard_services::registry::CartridgeRegistry;
use switchboard_storage::{
    MemoryApprovalStore, MemoryAuditStore, MemoryCompetenceStore, MemoryEnvelopeStore,
    MemoryIdentityStore, MemoryPolicyStore,
};
use switchboard_types::domain::{IdentitySpec, Policy, Principal};

use crate::{MockCartridge, ManualClock};

/// A notifier that records every notification it is handed.
#[derive(Default)]
pub struct RecordingNotifier {
    notifications: Mutex<Vec<ApprovalNotification>>,
}

impl RecordingNotifier {
    /// Every notification seen, in order.
    pub fn seen(&self) -> Vec<ApprovalNotification> {
        self.notifications.lock().unwrap().clone()
    }
}

#[async_trait]
impl ApprovalNotifier for RecordingNotifier {
    fn name(&self) -> &str {
        "recording"
    }

    async fn notify(&self, notification: &ApprovalNotification) -> Result<(), NotifyError> {
        self.notifications.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// Everything a lifecycle test needs, wired over memory stores.
pub struct Harness {
    /// The orchestrator under test.
    pub orchestrator: Orchestrator,
    /// The mock cartridge registered as `ads`.
    pub cartridge: Arc<MockCartridge>,
    /// The registry the orchestrator routes through.
    pub registry: Arc<CartridgeRegistry>,
    /// Envelope store handle for assertions.
    pub envelopes: Arc<MemoryEnvelopeStore>,
    /// Approval store handle for assertions.
    pub approvals: Arc<MemoryApprovalStore>,
    /// Audit store handle for chain verification.
    pub audit: Arc<MemoryAuditStore>,
    /// Identity store handle for seeding specs and overlays.
    pub identities: Arc<MemoryIdentityStore>,
    /// Policy store handle for seeding policies.
    pub policies: Arc<MemoryPolicyStore>,
    /// The notifier recording approval fan-out.
    pub notifier: Arc<RecordingNotifier>,
    /// The manual clock driving every component.
    pub clock: Arc<ManualClock>,
}

impl Harness {
    /// Builds a harness with the given config, registering the mock `ads`
    /// cartridge with the full built-in interceptor chain.
    pub async fn new(config: OrchestratorConfig) -> Self {
        let clock = Arc::new(ManualClock::at(1_700_000_000_000));
        let cartridge = Arc::new(MockCartridge::ads("1.0.0"));
        let registry = Arc::new(CartridgeRegistry::new());
        registry
            .register(cartridge.clone(), vec![])
            .expect("mock cartridge registers");

        let envelopes = Arc::new(MemoryEnvelopeStore::new());
        let approvals = Arc::new(MemoryApprovalStore::new());
        let audit = Arc::new(MemoryAuditStore::new());
        let identities = Arc::new(MemoryIdentityStore::new());
        let policies = Arc::new(MemoryPolicyStore::new());
        let competence = Arc::new(MemoryCompetenceStore::new());

        let ledger = Arc::new(AuditLedger::new(
            audit.clone(),
            Redactor::default(),
            clock.clone(),
        ));
        let notifier = Arc::new(RecordingNotifier::default());
        let composite = Arc::new(CompositeNotifier::new(
            vec![notifier.clone()],
            TokenBucket::new(30.0, 30.0),
        ));

        let guard = ExecutionGuard::new(
            vec![
                Arc::new(IdempotencyInterceptor::new(
                    config.idempotency_ttl_ms,
                    clock.clone(),
                )),
                Arc::new(RetryInterceptor::new(
                    3,
                    ExponentialBackoff {
                        base_ms: 1,
                        factor: 2.0,
                        max_ms: 5,
                        jitter: 0.0,
                    },
                )),
                Arc::new(VerificationInterceptor::default()),
                Arc::new(RedactionInterceptor::default()),
            ],
            config.call_deadline,
        );

        let orchestrator = Orchestrator::new(
            registry.clone(),
            Stores {
                envelopes: envelopes.clone(),
                policies: policies.clone(),
                identities: identities.clone(),
                approvals: approvals.clone(),
                competence: competence.clone(),
            },
            ledger,
            Arc::new(GuardrailState::new()),
            Arc::new(InMemorySpendLedger::new()),
            composite,
            guard,
            clock.clone(),
            config,
        );

        Self {
            orchestrator,
            cartridge,
            registry,
            envelopes,
            approvals,
            audit,
            identities,
            policies,
            notifier,
            clock,
        }
    }

    /// Seeds a principal and its identity spec.
    pub async fn seed_identity(&self, principal: &Principal, spec: &IdentitySpec) {
        self.identities
            .save_principal(principal)
            .await
            .expect("principal saves");
        self.identities.save_spec(spec).await.expect("spec saves");
    }

    /// Seeds a policy.
    pub async fn seed_policy(&self, policy: &Policy) {
        self.policies.save(policy).await.expect("policy saves");
    }
}

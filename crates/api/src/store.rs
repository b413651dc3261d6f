// Path: crates/api/src/store.rs

//! Polymorphic persistence contracts, one interface per entity.
//!
//! Backends are swappable: the workspace ships DashMap-backed memory stores;
//! SQL and Redis bindings implement the same traits out of tree. Every
//! method may perform I/O and therefore may suspend.

use async_trait::async_trait;
use switchboard_types::domain::{
    ActionEnvelope, ApprovalRequest, AuditEntry, CompetenceRecord, IdentitySpec, Policy,
    Principal, RoleOverlay,
};
use switchboard_types::error::StoreError;
use switchboard_types::time::TimestampMs;

/// Persistence for action envelopes.
#[async_trait]
pub trait EnvelopeStore: Send + Sync {
    /// Inserts a new envelope. Fails on id collision.
    async fn insert(&self, envelope: &ActionEnvelope) -> Result<(), StoreError>;

    /// Fetches an envelope by id.
    async fn get(&self, id: &str) -> Result<Option<ActionEnvelope>, StoreError>;

    /// Replaces an envelope, guarded by optimistic concurrency: the write
    /// succeeds only when the stored version equals `expected_version`, and
    /// the new envelope's version must be strictly greater.
    async fn update(
        &self,
        envelope: &ActionEnvelope,
        expected_version: u64,
    ) -> Result<(), StoreError>;

    /// Lists envelopes for a principal, newest first.
    async fn list_for_principal(
        &self,
        principal_id: &str,
        limit: usize,
    ) -> Result<Vec<ActionEnvelope>, StoreError>;
}

/// Persistence for policies.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Inserts or replaces a policy.
    async fn save(&self, policy: &Policy) -> Result<(), StoreError>;

    /// Fetches a policy by id.
    async fn get(&self, id: &str) -> Result<Option<Policy>, StoreError>;

    /// Lists active policies in scope for a cartridge and organization,
    /// sorted by priority ascending.
    async fn list_active(
        &self,
        cartridge_id: Option<&str>,
        organization_id: Option<&str>,
    ) -> Result<Vec<Policy>, StoreError>;
}

/// Persistence for principals, identity specs, and overlays.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Inserts or replaces a principal.
    async fn save_principal(&self, principal: &Principal) -> Result<(), StoreError>;

    /// Fetches a principal by id.
    async fn get_principal(&self, id: &str) -> Result<Option<Principal>, StoreError>;

    /// Inserts or replaces an identity spec.
    async fn save_spec(&self, spec: &IdentitySpec) -> Result<(), StoreError>;

    /// Fetches the identity spec for a principal.
    async fn get_spec(&self, principal_id: &str) -> Result<Option<IdentitySpec>, StoreError>;

    /// Inserts or replaces an overlay.
    async fn save_overlay(&self, overlay: &RoleOverlay) -> Result<(), StoreError>;

    /// Lists every overlay attached to a principal.
    async fn list_overlays(&self, principal_id: &str) -> Result<Vec<RoleOverlay>, StoreError>;
}

/// Persistence for approval requests.
#[async_trait]
pub trait ApprovalStore: Send + Sync {
    /// Inserts a new request. Fails on id collision.
    async fn insert(&self, request: &ApprovalRequest) -> Result<(), StoreError>;

    /// Fetches a request by id.
    async fn get(&self, id: &str) -> Result<Option<ApprovalRequest>, StoreError>;

    /// Lists pending requests, optionally scoped to an organization.
    async fn list_pending(
        &self,
        organization_id: Option<&str>,
    ) -> Result<Vec<ApprovalRequest>, StoreError>;

    /// Replaces a request, guarded by optimistic concurrency on `version`.
    /// Responders racing each other see `StoreError::VersionConflict`.
    async fn update_state(
        &self,
        request: &ApprovalRequest,
        expected_version: u64,
    ) -> Result<(), StoreError>;

    /// Lists pending requests whose expiry has passed.
    async fn list_expired(&self, now: TimestampMs) -> Result<Vec<ApprovalRequest>, StoreError>;
}

/// Persistence for competence records.
#[async_trait]
pub trait CompetenceStore: Send + Sync {
    /// Fetches the record for a principal and action type.
    async fn get(
        &self,
        principal_id: &str,
        action_type: &str,
    ) -> Result<Option<CompetenceRecord>, StoreError>;

    /// Inserts or replaces a record.
    async fn save(&self, record: &CompetenceRecord) -> Result<(), StoreError>;
}

/// Filter for audit queries.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    /// Restrict to one envelope.
    pub envelope_id: Option<String>,
    /// Restrict to one event type.
    pub event_type: Option<String>,
    /// Restrict to one organization.
    pub organization_id: Option<String>,
    /// Entries at or after this timestamp.
    pub since: Option<TimestampMs>,
    /// Maximum entries returned; zero means no cap.
    pub limit: usize,
}

/// Builder callback used by [`AuditStore::append_atomic`]: given the current
/// tip of the chain, produce the finished entry to append.
pub type AuditBuildFn<'a> =
    Box<dyn FnOnce(Option<&AuditEntry>) -> Result<AuditEntry, StoreError> + Send + 'a>;

/// Persistence for the hash-chained audit log.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Appends a fully built entry. Callers must have set
    /// `previous_entry_hash` from the current tip; prefer
    /// [`append_atomic`](Self::append_atomic) when available.
    async fn append(&self, entry: &AuditEntry) -> Result<(), StoreError>;

    /// Atomically reads the tip and appends the entry produced by `build`,
    /// preventing races on `previous_entry_hash` across concurrent writers.
    ///
    /// Backends without an atomic primitive return `Backend`; the ledger
    /// then falls back to its in-process serialization.
    async fn append_atomic<'a>(&self, build: AuditBuildFn<'a>) -> Result<AuditEntry, StoreError>;

    /// Whether this backend implements `append_atomic` natively.
    fn supports_atomic_append(&self) -> bool;

    /// The latest entry, the tip of the chain.
    async fn get_latest(&self) -> Result<Option<AuditEntry>, StoreError>;

    /// Entries matching a filter, in chain order.
    async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>, StoreError>;
}

// Path: crates/storage/src/memory.rs

//! DashMap-backed memory stores.
//!
//! Reads clone; writes replace whole records. Versioned writes (envelopes,
//! approvals) use the map entry as the linearization point so optimistic
//! concurrency holds without a global lock. The audit store serializes
//! appends through a tip mutex, which is what makes `append_atomic` safe
//! for concurrent writers.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use switchboard_api::store::{
    ApprovalStore, AuditBuildFn, AuditFilter, AuditStore, CompetenceStore, EnvelopeStore,
    IdentityStore, PolicyStore,
};
use switchboard_types::domain::{
    ActionEnvelope, ApprovalRequest, ApprovalStatus, AuditEntry, CompetenceRecord, IdentitySpec,
    Policy, Principal, RoleOverlay,
};
use switchboard_types::error::StoreError;
use switchboard_types::time::TimestampMs;
use tokio::sync::Mutex;

/// Memory-backed [`EnvelopeStore`].
#[derive(Default)]
pub struct MemoryEnvelopeStore {
    envelopes: DashMap<String, ActionEnvelope>,
}

impl MemoryEnvelopeStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EnvelopeStore for MemoryEnvelopeStore {
    async fn insert(&self, envelope: &ActionEnvelope) -> Result<(), StoreError> {
        use dashmap::mapref::entry::Entry;
        match self.envelopes.entry(envelope.id.clone()) {
            Entry::Occupied(_) => Err(StoreError::Backend(format!(
                "envelope '{}' already exists",
                envelope.id
            ))),
            Entry::Vacant(v) => {
                v.insert(envelope.clone());
                Ok(())
            }
        }
    }

    async fn get(&self, id: &str) -> Result<Option<ActionEnvelope>, StoreError> {
        Ok(self.envelopes.get(id).map(|e| e.clone()))
    }

    async fn update(
        &self,
        envelope: &ActionEnvelope,
        expected_version: u64,
    ) -> Result<(), StoreError> {
        let mut current = self
            .envelopes
            .get_mut(&envelope.id)
            .ok_or(StoreError::NotFound)?;
        if current.version != expected_version {
            return Err(StoreError::VersionConflict {
                expected: expected_version,
                found: current.version,
            });
        }
        if envelope.version <= expected_version {
            return Err(StoreError::Backend(
                "envelope version must increase on update".into(),
            ));
        }
        *current = envelope.clone();
        Ok(())
    }

    async fn list_for_principal(
        &self,
        principal_id: &str,
        limit: usize,
    ) -> Result<Vec<ActionEnvelope>, StoreError> {
        let mut out: Vec<ActionEnvelope> = self
            .envelopes
            .iter()
            .filter(|e| e.principal_id == principal_id)
            .map(|e| e.clone())
            .collect();
        out.sort_by_key(|e| std::cmp::Reverse(e.created_at));
        if limit > 0 {
            out.truncate(limit);
        }
        Ok(out)
    }
}

/// Memory-backed [`PolicyStore`].
#[derive(Default)]
pub struct MemoryPolicyStore {
    policies: DashMap<String, Policy>,
}

impl MemoryPolicyStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PolicyStore for MemoryPolicyStore {
    async fn save(&self, policy: &Policy) -> Result<(), StoreError> {
        self.policies.insert(policy.id.clone(), policy.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Policy>, StoreError> {
        Ok(self.policies.get(id).map(|p| p.clone()))
    }

    async fn list_active(
        &self,
        cartridge_id: Option<&str>,
        organization_id: Option<&str>,
    ) -> Result<Vec<Policy>, StoreError> {
        let mut out: Vec<Policy> = self
            .policies
            .iter()
            .filter(|p| p.active && p.applies_to(cartridge_id, organization_id))
            .map(|p| p.clone())
            .collect();
        out.sort_by_key(|p| p.priority);
        Ok(out)
    }
}

/// Memory-backed [`IdentityStore`].
#[derive(Default)]
pub struct MemoryIdentityStore {
    principals: DashMap<String, Principal>,
    specs: DashMap<String, IdentitySpec>,
    overlays: DashMap<String, RoleOverlay>,
}

impl MemoryIdentityStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn save_principal(&self, principal: &Principal) -> Result<(), StoreError> {
        self.principals
            .insert(principal.id.clone(), principal.clone());
        Ok(())
    }

    async fn get_principal(&self, id: &str) -> Result<Option<Principal>, StoreError> {
        Ok(self.principals.get(id).map(|p| p.clone()))
    }

    async fn save_spec(&self, spec: &IdentitySpec) -> Result<(), StoreError> {
        self.specs.insert(spec.principal_id.clone(), spec.clone());
        Ok(())
    }

    async fn get_spec(&self, principal_id: &str) -> Result<Option<IdentitySpec>, StoreError> {
        Ok(self.specs.get(principal_id).map(|s| s.clone()))
    }

    async fn save_overlay(&self, overlay: &RoleOverlay) -> Result<(), StoreError> {
        self.overlays.insert(overlay.id.clone(), overlay.clone());
        Ok(())
    }

    async fn list_overlays(&self, principal_id: &str) -> Result<Vec<RoleOverlay>, StoreError> {
        Ok(self
            .overlays
            .iter()
            .filter(|o| o.principal_id == principal_id)
            .map(|o| o.clone())
            .collect())
    }
}

/// Memory-backed [`ApprovalStore`].
#[derive(Default)]
pub struct MemoryApprovalStore {
    requests: DashMap<String, ApprovalRequest>,
}

impl MemoryApprovalStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ApprovalStore for MemoryApprovalStore {
    async fn insert(&self, request: &ApprovalRequest) -> Result<(), StoreError> {
        use dashmap::mapref::entry::Entry;
        match self.requests.entry(request.id.clone()) {
            Entry::Occupied(_) => Err(StoreError::Backend(format!(
                "approval '{}' already exists",
                request.id
            ))),
            Entry::Vacant(v) => {
                v.insert(request.clone());
                Ok(())
            }
        }
    }

    async fn get(&self, id: &str) -> Result<Option<ApprovalRequest>, StoreError> {
        Ok(self.requests.get(id).map(|r| r.clone()))
    }

    async fn list_pending(
        &self,
        organization_id: Option<&str>,
    ) -> Result<Vec<ApprovalRequest>, StoreError> {
        // Org scoping is by envelope; memory store keeps it simple and
        // filters on the summary-level data it has.
        let _ = organization_id;
        let mut out: Vec<ApprovalRequest> = self
            .requests
            .iter()
            .filter(|r| r.status == ApprovalStatus::Pending)
            .map(|r| r.clone())
            .collect();
        out.sort_by_key(|r| r.created_at);
        Ok(out)
    }

    async fn update_state(
        &self,
        request: &ApprovalRequest,
        expected_version: u64,
    ) -> Result<(), StoreError> {
        let mut current = self
            .requests
            .get_mut(&request.id)
            .ok_or(StoreError::NotFound)?;
        if current.version != expected_version {
            return Err(StoreError::VersionConflict {
                expected: expected_version,
                found: current.version,
            });
        }
        *current = request.clone();
        Ok(())
    }

    async fn list_expired(&self, now: TimestampMs) -> Result<Vec<ApprovalRequest>, StoreError> {
        Ok(self
            .requests
            .iter()
            .filter(|r| r.status == ApprovalStatus::Pending && now >= r.expires_at)
            .map(|r| r.clone())
            .collect())
    }
}

/// Memory-backed [`CompetenceStore`].
#[derive(Default)]
pub struct MemoryCompetenceStore {
    records: DashMap<(String, String), CompetenceRecord>,
}

impl MemoryCompetenceStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CompetenceStore for MemoryCompetenceStore {
    async fn get(
        &self,
        principal_id: &str,
        action_type: &str,
    ) -> Result<Option<CompetenceRecord>, StoreError> {
        Ok(self
            .records
            .get(&(principal_id.to_string(), action_type.to_string()))
            .map(|r| r.clone()))
    }

    async fn save(&self, record: &CompetenceRecord) -> Result<(), StoreError> {
        self.records.insert(
            (record.principal_id.clone(), record.action_type.clone()),
            record.clone(),
        );
        Ok(())
    }
}

/// Memory-backed [`AuditStore`] with a single global chain.
///
/// The chain and its tip live behind one async mutex, so appends are
/// globally serialized and `append_atomic` cannot race on
/// `previous_entry_hash`.
pub struct MemoryAuditStore {
    chain: Arc<Mutex<Vec<AuditEntry>>>,
}

impl Default for MemoryAuditStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAuditStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            chain: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The full chain in append order. Intended for verification sweeps.
    pub async fn all_entries(&self) -> Vec<AuditEntry> {
        self.chain.lock().await.clone()
    }
}

fn matches_filter(entry: &AuditEntry, filter: &AuditFilter) -> bool {
    if let Some(env) = &filter.envelope_id {
        if entry.envelope_id.as_deref() != Some(env.as_str()) {
            return false;
        }
    }
    if let Some(et) = &filter.event_type {
        if &entry.event_type != et {
            return false;
        }
    }
    if let Some(org) = &filter.organization_id {
        if entry.organization_id.as_deref() != Some(org.as_str()) {
            return false;
        }
    }
    if let Some(since) = filter.since {
        if entry.timestamp < since {
            return false;
        }
    }
    true
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn append(&self, entry: &AuditEntry) -> Result<(), StoreError> {
        let mut chain = self.chain.lock().await;
        let tip_hash = chain.last().map(|e| e.entry_hash.clone());
        if entry.previous_entry_hash != tip_hash {
            return Err(StoreError::Backend(
                "append raced: previous_entry_hash does not match the chain tip".into(),
            ));
        }
        chain.push(entry.clone());
        Ok(())
    }

    async fn append_atomic<'a>(&self, build: AuditBuildFn<'a>) -> Result<AuditEntry, StoreError> {
        let mut chain = self.chain.lock().await;
        let entry = build(chain.last())?;
        chain.push(entry.clone());
        Ok(entry)
    }

    fn supports_atomic_append(&self) -> bool {
        true
    }

    async fn get_latest(&self) -> Result<Option<AuditEntry>, StoreError> {
        Ok(self.chain.lock().await.last().cloned())
    }

    async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>, StoreError> {
        let chain = self.chain.lock().await;
        let mut out: Vec<AuditEntry> = chain
            .iter()
            .filter(|e| matches_filter(e, filter))
            .cloned()
            .collect();
        if filter.limit > 0 {
            out.truncate(filter.limit);
        }
        Ok(out)
    }
}

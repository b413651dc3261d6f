// Path: crates/services/src/audit/mod.rs

//! The hash-chained audit ledger.
//!
//! Appends are globally serialized: the chain is a single total order.
//! Stores that implement `append_atomic` natively are the designated
//! primitive; for the rest the ledger serializes appends through an
//! in-process mutex. Redaction runs before hashing, and the redacted paths
//! are part of the hashed entry, so a verifier can prove a snapshot was
//! scrubbed rather than altered.

mod redact;

pub use redact::Redactor;

use std::sync::Arc;
use switchboard_api::store::{AuditFilter, AuditStore};
use switchboard_types::domain::{
    ActorType, AuditEntry, EvidencePointer, RiskCategory, VisibilityLevel, AUDIT_SCHEMA_VERSION,
    CHAIN_HASH_VERSION,
};
use switchboard_types::error::{CoreError, StoreError};
use switchboard_types::time::Clock;
use switchboard_types::id;
use serde_json::Value;
use tokio::sync::Mutex;

/// The event-level fields callers supply; the ledger adds identity, chain
/// linkage, and redaction metadata.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    /// Event name, e.g. `action.executed`.
    pub event_type: String,
    /// The kind of actor.
    pub actor_type: ActorType,
    /// The acting principal or `system`.
    pub actor_id: String,
    /// The kind of entity the event is about.
    pub entity_type: String,
    /// The id of the entity the event is about.
    pub entity_id: String,
    /// Risk category in effect, when known.
    pub risk_category: Option<RiskCategory>,
    /// Outward visibility.
    pub visibility_level: VisibilityLevel,
    /// Human-readable summary.
    pub summary: String,
    /// Unredacted event payload. The ledger redacts before hashing.
    pub snapshot: Value,
    /// Inline evidence payloads, hashed into pointers.
    pub evidence: Vec<Value>,
    /// The envelope this event belongs to, when any.
    pub envelope_id: Option<String>,
    /// Organization scope.
    pub organization_id: Option<String>,
    /// Correlation id.
    pub trace_id: Option<String>,
}

/// The outcome of a chain verification sweep.
#[derive(Debug, Clone)]
pub struct ChainVerification {
    /// Whether every link held.
    pub valid: bool,
    /// Index of the first broken link, when invalid.
    pub first_break: Option<usize>,
    /// Entries checked.
    pub checked: usize,
    /// Indices whose recomputed hash mismatched, for deep checks.
    pub hash_mismatches: Vec<usize>,
}

/// Append-only, hash-chained audit log over a pluggable store.
pub struct AuditLedger {
    store: Arc<dyn AuditStore>,
    redactor: Redactor,
    clock: Arc<dyn Clock>,
    // Serializes appends when the store has no native atomic primitive.
    tip_guard: Mutex<()>,
}

impl AuditLedger {
    /// Creates a ledger over the given store.
    pub fn new(store: Arc<dyn AuditStore>, redactor: Redactor, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            redactor,
            clock,
            tip_guard: Mutex::new(()),
        }
    }

    /// Records one event, returning the finished entry.
    pub async fn record(&self, event: AuditEvent) -> Result<AuditEntry, CoreError> {
        let now = self.clock.now_ms();
        let (snapshot, redacted_fields) = self.redactor.redact(event.snapshot.clone());

        let mut evidence_pointers = Vec::with_capacity(event.evidence.len());
        for payload in &event.evidence {
            evidence_pointers.push(EvidencePointer::inline(payload)?);
        }

        let template = AuditEntry {
            id: id::new_id(id::AUDIT),
            event_type: event.event_type,
            timestamp: now,
            actor_type: event.actor_type,
            actor_id: event.actor_id,
            entity_type: event.entity_type,
            entity_id: event.entity_id,
            risk_category: event.risk_category,
            visibility_level: event.visibility_level,
            summary: event.summary,
            snapshot,
            evidence_pointers,
            redaction_applied: !redacted_fields.is_empty(),
            redacted_fields,
            chain_hash_version: CHAIN_HASH_VERSION,
            schema_version: AUDIT_SCHEMA_VERSION,
            entry_hash: String::new(),
            previous_entry_hash: None,
            envelope_id: event.envelope_id,
            organization_id: event.organization_id,
            trace_id: event.trace_id,
        };

        let entry = if self.store.supports_atomic_append() {
            self.store
                .append_atomic(Box::new(move |tip| {
                    let mut entry = template;
                    entry.previous_entry_hash = tip.map(|t| t.entry_hash.clone());
                    entry.entry_hash = entry
                        .compute_hash()
                        .map_err(|e| StoreError::Encode(e.to_string()))?;
                    Ok(entry)
                }))
                .await?
        } else {
            // No native primitive: serialize tip-read plus append in
            // process.
            let _guard = self.tip_guard.lock().await;
            let tip = self.store.get_latest().await?;
            let mut entry = template;
            entry.previous_entry_hash = tip.map(|t| t.entry_hash);
            entry.entry_hash = entry.compute_hash()?;
            self.store.append(&entry).await?;
            entry
        };

        tracing::debug!(
            entry = %entry.id,
            event_type = %entry.event_type,
            "audit entry appended"
        );
        Ok(entry)
    }

    /// Queries entries through the store.
    pub async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>, CoreError> {
        Ok(self.store.query(filter).await?)
    }

    /// Verifies linkage across consecutive pairs.
    pub fn verify_chain(entries: &[AuditEntry]) -> ChainVerification {
        for (i, pair) in entries.windows(2).enumerate() {
            if pair[1].previous_entry_hash.as_deref() != Some(pair[0].entry_hash.as_str()) {
                return ChainVerification {
                    valid: false,
                    first_break: Some(i + 1),
                    checked: entries.len(),
                    hash_mismatches: Vec::new(),
                };
            }
        }
        ChainVerification {
            valid: true,
            first_break: None,
            checked: entries.len(),
            hash_mismatches: Vec::new(),
        }
    }

    /// Verifies linkage and recomputes every entry hash.
    pub fn verify_deep(entries: &[AuditEntry]) -> ChainVerification {
        let mut result = Self::verify_chain(entries);
        for (i, entry) in entries.iter().enumerate() {
            match entry.compute_hash() {
                Ok(hash) if hash == entry.entry_hash => {}
                _ => {
                    result.valid = false;
                    result.hash_mismatches.push(i);
                }
            }
        }
        result
    }

    /// Runs the full verification against everything the store returns.
    pub async fn verify_store(&self) -> Result<ChainVerification, CoreError> {
        let entries = self.store.query(&AuditFilter::default()).await?;
        Ok(Self::verify_deep(&entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use switchboard_storage::MemoryAuditStore;
    use switchboard_types::time::SystemClock;

    fn event(summary: &str, snapshot: Value) -> AuditEvent {
        AuditEvent {
            event_type: "action.executed".into(),
            actor_type: ActorType::Agent,
            actor_id: "agent_1".into(),
            entity_type: "envelope".into(),
            entity_id: "env_1".into(),
            risk_category: Some(RiskCategory::Low),
            visibility_level: VisibilityLevel::Internal,
            summary: summary.into(),
            snapshot,
            evidence: vec![],
            envelope_id: Some("env_1".into()),
            organization_id: None,
            trace_id: None,
        }
    }

    fn ledger() -> AuditLedger {
        AuditLedger::new(
            Arc::new(MemoryAuditStore::new()),
            Redactor::default(),
            Arc::new(SystemClock),
        )
    }

    #[tokio::test]
    async fn chain_links_and_verifies() {
        let ledger = ledger();
        for i in 0..5 {
            ledger
                .record(event(&format!("step {}", i), json!({ "i": i })))
                .await
                .unwrap();
        }
        let verification = ledger.verify_store().await.unwrap();
        assert!(verification.valid);
        assert_eq!(verification.checked, 5);
        assert!(verification.hash_mismatches.is_empty());
    }

    #[tokio::test]
    async fn tampering_breaks_the_chain() {
        let ledger = ledger();
        let mut entries = Vec::new();
        for i in 0..3 {
            entries.push(
                ledger
                    .record(event(&format!("step {}", i), json!({ "i": i })))
                    .await
                    .unwrap(),
            );
        }
        // Tamper with the middle entry's summary after the fact.
        entries[1].summary = "rewritten".into();
        let deep = AuditLedger::verify_deep(&entries);
        assert!(!deep.valid);
        assert_eq!(deep.hash_mismatches, vec![1]);

        // Break the linkage instead.
        entries[1].summary = "step 1".into();
        entries[2].previous_entry_hash = Some("bogus".into());
        let chain = AuditLedger::verify_chain(&entries);
        assert!(!chain.valid);
        assert_eq!(chain.first_break, Some(2));
    }

    #[tokio::test]
    async fn snapshots_are_redacted_before_hashing() {
        let ledger = AuditLedger::new(
            Arc::new(MemoryAuditStore::new()),
            Redactor::default(),
            Arc::new(SystemClock),
        );
        let entry = ledger
            .record(event(
                "with secret",
                json!({"apiKey": "sk-123", "campaignId": "camp_1"}),
            ))
            .await
            .unwrap();
        assert!(entry.redaction_applied);
        assert_eq!(entry.snapshot["apiKey"], "[REDACTED]");
        assert_eq!(entry.snapshot["campaignId"], "camp_1");
        assert_eq!(entry.redacted_fields, vec!["apiKey".to_string()]);
        // The stored hash covers the redacted form.
        assert_eq!(entry.compute_hash().unwrap(), entry.entry_hash);
    }

    #[tokio::test]
    async fn inline_evidence_becomes_pointers() {
        let ledger = ledger();
        let mut e = event("with evidence", json!({}));
        e.evidence = vec![json!({"metric": "ctr", "drop": 0.4})];
        let entry = ledger.record(e).await.unwrap();
        assert_eq!(entry.evidence_pointers.len(), 1);
        assert_eq!(entry.evidence_pointers[0].pointer_type, "inline");
    }
}

// Path: crates/services/tests/lifecycle_e2e.rs

//! End-to-end lifecycle scenarios over the full orchestrator wiring:
//! memory stores, mock cartridge, interceptor chain, recording notifier.

use serde_json::json;
use switchboard_api::store::{ApprovalStore, EnvelopeStore};
use switchboard_services::approval::ApprovalResponse;
use switchboard_services::audit::AuditLedger;
use switchboard_services::lifecycle::{ExecuteCommand, OrchestratorConfig};
use switchboard_test_utils::{
    identity_spec, low_risk, policy_denying, principal, Harness, MockCartridge, ScriptedAction,
};
use switchboard_types::domain::{
    ApprovalAction, ApprovalRequirement, ApprovalStatus, EnvelopeStatus, ExecuteResult,
    RiskCategory,
};
use switchboard_types::error::{CoreError, ErrorCode};
use switchboard_types::gateway::ExecuteOutcome;

fn config_with_reviewer() -> OrchestratorConfig {
    OrchestratorConfig {
        approvers: vec!["reviewer_1".into()],
        fallback_approver: Some("backup_1".into()),
        ..Default::default()
    }
}

fn pause_command(key: &str) -> ExecuteCommand {
    ExecuteCommand {
        actor_id: "agent_1".into(),
        organization_id: None,
        action_type: "ads.campaign.pause".into(),
        parameters: json!({ "campaignId": "camp_1", "entityId": "camp_1" }),
        side_effect: true,
        entity_refs: vec![],
        message: None,
        trace_id: None,
        idempotency_key: key.into(),
        parent_envelope_id: None,
    }
}

async fn seed_agent(harness: &Harness, tolerances: &[(RiskCategory, ApprovalRequirement)]) {
    harness
        .seed_identity(&principal("agent_1"), &identity_spec("agent_1", tolerances))
        .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn auto_allow_low_risk_executes_and_audits() {
    let harness = Harness::new(config_with_reviewer()).await;
    seed_agent(
        &harness,
        &[(RiskCategory::Low, ApprovalRequirement::None)],
    )
    .await;
    harness.cartridge.script(
        "ads.campaign.pause",
        ScriptedAction {
            risk: low_risk(RiskCategory::Low, 10.0),
            result: ExecuteResult::ok("paused campaign camp_1"),
            transient_failures: 0,
        },
    );

    let report = harness
        .orchestrator
        .execute(pause_command("key_1"))
        .await
        .unwrap();

    assert_eq!(report.outcome, ExecuteOutcome::Executed);
    assert!(report.execution_result.as_ref().unwrap().success);

    let envelope = harness
        .envelopes
        .get(&report.envelope_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(envelope.status, EnvelopeStatus::Executed);
    assert_eq!(envelope.execution_results.len(), 1);

    let entries = harness.audit.all_entries().await;
    let kinds: Vec<&str> = entries.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(kinds, vec!["action.proposed", "action.executed"]);
    let verification = AuditLedger::verify_deep(&entries);
    assert!(verification.valid);
}

#[tokio::test(flavor = "multi_thread")]
async fn high_risk_goes_pending_with_binding_hash_and_one_notification() {
    let harness = Harness::new(config_with_reviewer()).await;
    seed_agent(
        &harness,
        &[(RiskCategory::High, ApprovalRequirement::Elevated)],
    )
    .await;
    harness.cartridge.script(
        "ads.campaign.pause",
        ScriptedAction {
            risk: low_risk(RiskCategory::High, 10.0),
            ..Default::default()
        },
    );

    let report = harness
        .orchestrator
        .execute(pause_command("key_1"))
        .await
        .unwrap();

    assert_eq!(report.outcome, ExecuteOutcome::PendingApproval);
    let approval_id = report.approval_id.clone().unwrap();
    let binding_hash = report.binding_hash.clone().unwrap();
    assert_eq!(binding_hash.len(), 64);

    let envelope = harness
        .envelopes
        .get(&report.envelope_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(envelope.status, EnvelopeStatus::PendingApproval);

    let request = harness.approvals.get(&approval_id).await.unwrap().unwrap();
    assert_eq!(request.status, ApprovalStatus::Pending);
    assert_eq!(request.binding_hash, binding_hash);

    let seen = harness.notifier.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].approval_id, approval_id);
    // The cartridge was never invoked.
    assert!(harness.cartridge.executed().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn approve_with_correct_hash_executes() {
    let harness = Harness::new(config_with_reviewer()).await;
    seed_agent(
        &harness,
        &[(RiskCategory::High, ApprovalRequirement::Elevated)],
    )
    .await;
    harness.cartridge.script(
        "ads.campaign.pause",
        ScriptedAction {
            risk: low_risk(RiskCategory::High, 10.0),
            result: ExecuteResult::ok("paused campaign camp_1"),
            transient_failures: 0,
        },
    );

    let report = harness
        .orchestrator
        .execute(pause_command("key_1"))
        .await
        .unwrap();
    let approval_id = report.approval_id.unwrap();
    let binding_hash = report.binding_hash.unwrap();

    let outcome = harness
        .orchestrator
        .respond_to_approval(
            &approval_id,
            ApprovalResponse {
                action: ApprovalAction::Approve,
                responded_by: "reviewer_1".into(),
                binding_hash: Some(binding_hash),
                patch_value: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(outcome.outcome, ExecuteOutcome::Executed);
    assert!(outcome.execution_result.unwrap().success);

    let envelope = harness
        .envelopes
        .get(&report.envelope_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(envelope.status, EnvelopeStatus::Executed);

    let entries = harness.audit.all_entries().await;
    assert!(AuditLedger::verify_deep(&entries).valid);
    assert!(entries
        .iter()
        .any(|e| e.event_type == "approval.approved"));
}

#[tokio::test(flavor = "multi_thread")]
async fn stale_binding_hash_is_rejected() {
    let harness = Harness::new(config_with_reviewer()).await;
    seed_agent(
        &harness,
        &[(RiskCategory::High, ApprovalRequirement::Elevated)],
    )
    .await;
    harness.cartridge.script(
        "ads.campaign.pause",
        ScriptedAction {
            risk: low_risk(RiskCategory::High, 10.0),
            ..Default::default()
        },
    );

    let report = harness
        .orchestrator
        .execute(pause_command("key_1"))
        .await
        .unwrap();
    let approval_id = report.approval_id.unwrap();

    let err = harness
        .orchestrator
        .respond_to_approval(
            &approval_id,
            ApprovalResponse {
                action: ApprovalAction::Approve,
                responded_by: "reviewer_1".into(),
                binding_hash: Some("wrong".into()),
                patch_value: None,
            },
        )
        .await
        .unwrap_err();

    assert_eq!(err.code(), "BINDING_HASH_MISMATCH");
    assert_eq!(err.http_status(), 400);
    assert!(err.to_string().contains("stale"));

    // Nothing moved.
    let request = harness.approvals.get(&approval_id).await.unwrap().unwrap();
    assert_eq!(request.status, ApprovalStatus::Pending);
    assert!(harness.cartridge.executed().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn policy_deny_names_the_policy() {
    let harness = Harness::new(config_with_reviewer()).await;
    seed_agent(&harness, &[]).await;
    harness
        .seed_policy(&policy_denying("pol_block_targeting", "ads.targeting.modify"))
        .await;

    let mut cmd = pause_command("key_1");
    cmd.action_type = "ads.targeting.modify".into();
    let report = harness.orchestrator.execute(cmd).await.unwrap();

    assert_eq!(report.outcome, ExecuteOutcome::Denied);
    let explanation = report.denied_explanation.unwrap();
    assert!(explanation.contains("deny ads.targeting.modify"));

    let envelope = harness
        .envelopes
        .get(&report.envelope_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(envelope.status, EnvelopeStatus::Denied);

    let entries = harness.audit.all_entries().await;
    let kinds: Vec<&str> = entries.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(kinds, vec!["action.proposed", "action.denied"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn undo_round_trip_links_parent_and_keeps_chain_valid() {
    let harness = Harness::new(config_with_reviewer()).await;
    seed_agent(&harness, &[]).await;
    let now = 1_700_000_000_000i64;
    harness.cartridge.script(
        "ads.campaign.pause",
        MockCartridge::pause_with_undo("camp_1", now + 60 * 60 * 1000),
    );

    let original = harness
        .orchestrator
        .execute(pause_command("key_1"))
        .await
        .unwrap();
    assert_eq!(original.outcome, ExecuteOutcome::Executed);

    let undo = harness
        .orchestrator
        .request_undo(&original.envelope_id)
        .await
        .unwrap();
    assert_eq!(undo.outcome, ExecuteOutcome::Executed);
    assert_ne!(undo.envelope_id, original.envelope_id);

    let undo_envelope = harness
        .envelopes
        .get(&undo.envelope_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        undo_envelope.parent_envelope_id.as_deref(),
        Some(original.envelope_id.as_str())
    );
    assert_eq!(undo_envelope.status, EnvelopeStatus::Executed);
    assert_eq!(undo_envelope.action_type, "ads.campaign.resume");

    let original_envelope = harness
        .envelopes
        .get(&original.envelope_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(original_envelope.status, EnvelopeStatus::Undone);

    let entries = harness.audit.all_entries().await;
    assert!(AuditLedger::verify_deep(&entries).valid);
    let kinds: Vec<&str> = entries.iter().map(|e| e.event_type.as_str()).collect();
    assert!(kinds.contains(&"action.undo_requested"));
    assert!(kinds.contains(&"action.undone"));
}

#[tokio::test(flavor = "multi_thread")]
async fn undo_after_expiry_is_refused() {
    let harness = Harness::new(config_with_reviewer()).await;
    seed_agent(&harness, &[]).await;
    let now = 1_700_000_000_000i64;
    harness.cartridge.script(
        "ads.campaign.pause",
        MockCartridge::pause_with_undo("camp_1", now + 1_000),
    );

    let original = harness
        .orchestrator
        .execute(pause_command("key_1"))
        .await
        .unwrap();
    harness.clock.advance(2_000);

    let err = harness
        .orchestrator
        .request_undo(&original.envelope_id)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("expired"));
}

#[tokio::test(flavor = "multi_thread")]
async fn idempotency_key_replays_the_same_envelope() {
    let harness = Harness::new(config_with_reviewer()).await;
    seed_agent(&harness, &[]).await;

    let first = harness
        .orchestrator
        .execute(pause_command("same_key"))
        .await
        .unwrap();
    let second = harness
        .orchestrator
        .execute(pause_command("same_key"))
        .await
        .unwrap();

    assert_eq!(first.envelope_id, second.envelope_id);
    assert_eq!(first.outcome, second.outcome);
    // Only one execution reached the cartridge.
    assert_eq!(harness.cartridge.executed().len(), 1);

    // A different key is a fresh lifecycle.
    let third = harness
        .orchestrator
        .execute(pause_command("other_key"))
        .await
        .unwrap();
    assert_ne!(third.envelope_id, first.envelope_id);
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_idempotency_key_is_a_validation_error() {
    let harness = Harness::new(config_with_reviewer()).await;
    seed_agent(&harness, &[]).await;
    let err = harness
        .orchestrator
        .execute(pause_command("  "))
        .await
        .unwrap_err();
    assert_eq!(err.http_status(), 400);
}

#[tokio::test(flavor = "multi_thread")]
async fn transient_failures_are_retried_to_success() {
    let harness = Harness::new(config_with_reviewer()).await;
    seed_agent(&harness, &[]).await;
    harness.cartridge.script(
        "ads.campaign.pause",
        ScriptedAction {
            risk: low_risk(RiskCategory::Low, 0.0),
            result: ExecuteResult::ok("paused after retries"),
            transient_failures: 2,
        },
    );

    let report = harness
        .orchestrator
        .execute(pause_command("key_1"))
        .await
        .unwrap();
    assert_eq!(report.outcome, ExecuteOutcome::Executed);
    assert_eq!(harness.cartridge.executed().len(), 1);

    let envelope = harness
        .envelopes
        .get(&report.envelope_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(envelope.status, EnvelopeStatus::Executed);
}

#[tokio::test(flavor = "multi_thread")]
async fn retry_budget_exhaustion_fails_the_envelope() {
    let harness = Harness::new(config_with_reviewer()).await;
    seed_agent(&harness, &[]).await;
    harness.cartridge.script(
        "ads.campaign.pause",
        ScriptedAction {
            risk: low_risk(RiskCategory::Low, 0.0),
            result: ExecuteResult::ok("never reached"),
            transient_failures: 10,
        },
    );

    let err = harness
        .orchestrator
        .execute(pause_command("key_1"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Transient(_)));

    let entries = harness.audit.all_entries().await;
    let kinds: Vec<&str> = entries.iter().map(|e| e.event_type.as_str()).collect();
    assert!(kinds.contains(&"action.failed"));
}

#[tokio::test(flavor = "multi_thread")]
async fn patch_reissues_a_fresh_binding_hash() {
    let harness = Harness::new(config_with_reviewer()).await;
    seed_agent(
        &harness,
        &[
            (RiskCategory::High, ApprovalRequirement::Elevated),
            (RiskCategory::Medium, ApprovalRequirement::Standard),
        ],
    )
    .await;
    harness.cartridge.script(
        "ads.campaign.pause",
        ScriptedAction {
            risk: low_risk(RiskCategory::High, 10.0),
            result: ExecuteResult::ok("paused"),
            transient_failures: 0,
        },
    );

    let report = harness
        .orchestrator
        .execute(pause_command("key_1"))
        .await
        .unwrap();
    let first_approval = report.approval_id.unwrap();
    let first_hash = report.binding_hash.unwrap();

    let patched = harness
        .orchestrator
        .respond_to_approval(
            &first_approval,
            ApprovalResponse {
                action: ApprovalAction::Patch,
                responded_by: "reviewer_1".into(),
                binding_hash: Some(first_hash.clone()),
                patch_value: Some(json!({ "campaignId": "camp_1", "entityId": "camp_1", "note": "half budget" })),
            },
        )
        .await
        .unwrap();

    assert_eq!(patched.outcome, ExecuteOutcome::PendingApproval);
    let second_approval = patched.approval_id.unwrap();
    let second_hash = patched.binding_hash.unwrap();
    assert_ne!(second_approval, first_approval);
    assert_ne!(second_hash, first_hash);

    // The original request is terminal; the old hash no longer commits.
    let original_request = harness
        .approvals
        .get(&first_approval)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(original_request.status, ApprovalStatus::Patched);

    // Approving the fresh request with the fresh hash executes the patched
    // parameters.
    let outcome = harness
        .orchestrator
        .respond_to_approval(
            &second_approval,
            ApprovalResponse {
                action: ApprovalAction::Approve,
                responded_by: "reviewer_1".into(),
                binding_hash: Some(second_hash),
                patch_value: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome.outcome, ExecuteOutcome::Executed);
    let executed = harness.cartridge.executed();
    assert_eq!(executed.len(), 1);
    assert_eq!(executed[0].1["note"], "half budget");
}

#[tokio::test(flavor = "multi_thread")]
async fn expired_approval_applies_deny_behavior() {
    let harness = Harness::new(config_with_reviewer()).await;
    seed_agent(
        &harness,
        &[(RiskCategory::High, ApprovalRequirement::Elevated)],
    )
    .await;
    harness.cartridge.script(
        "ads.campaign.pause",
        ScriptedAction {
            risk: low_risk(RiskCategory::High, 10.0),
            ..Default::default()
        },
    );

    let report = harness
        .orchestrator
        .execute(pause_command("key_1"))
        .await
        .unwrap();
    assert_eq!(report.outcome, ExecuteOutcome::PendingApproval);

    // Jump past the approval TTL and sweep.
    harness.clock.advance(25 * 60 * 60 * 1000);
    let touched = harness.orchestrator.expire_approvals().await.unwrap();
    assert_eq!(touched, vec![report.envelope_id.clone()]);

    let envelope = harness
        .envelopes
        .get(&report.envelope_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(envelope.status, EnvelopeStatus::Denied);
    let entries = harness.audit.all_entries().await;
    assert!(entries
        .iter()
        .any(|e| e.event_type == "approval.expired"));
}

#[tokio::test(flavor = "multi_thread")]
async fn simulate_persists_nothing() {
    let harness = Harness::new(config_with_reviewer()).await;
    seed_agent(&harness, &[]).await;

    let trace = harness
        .orchestrator
        .simulate(pause_command("ignored"))
        .await
        .unwrap();
    assert!(!trace.checks.is_empty());

    assert!(harness.audit.all_entries().await.is_empty());
    assert!(harness.cartridge.executed().is_empty());
    assert!(harness
        .approvals
        .list_pending(None)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_principal_is_not_found() {
    let harness = Harness::new(config_with_reviewer()).await;
    let err = harness
        .orchestrator
        .execute(pause_command("key_1"))
        .await
        .unwrap_err();
    assert_eq!(err.http_status(), 404);
}

#[tokio::test(flavor = "multi_thread")]
async fn unroutable_action_needs_clarification() {
    let harness = Harness::new(config_with_reviewer()).await;
    seed_agent(&harness, &[]).await;
    let mut cmd = pause_command("key_1");
    cmd.action_type = "payments.transfer".into();
    let err = harness.orchestrator.execute(cmd).await.unwrap_err();
    assert_eq!(err.http_status(), 422);
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_executes_keep_the_audit_chain_linked() {
    let harness = std::sync::Arc::new(Harness::new(config_with_reviewer()).await);
    seed_agent(harness.as_ref(), &[]).await;

    let mut handles = Vec::new();
    for i in 0..8 {
        let harness = harness.clone();
        handles.push(tokio::spawn(async move {
            let mut cmd = pause_command(&format!("key_{}", i));
            cmd.parameters = json!({ "campaignId": format!("camp_{}", i) });
            harness.orchestrator.execute(cmd).await.unwrap()
        }));
    }
    for handle in handles {
        let report = handle.await.unwrap();
        assert_eq!(report.outcome, ExecuteOutcome::Executed);
    }

    let entries = harness.audit.all_entries().await;
    // Eight lifecycles, two entries each.
    assert_eq!(entries.len(), 16);
    assert!(AuditLedger::verify_deep(&entries).valid);
}

#[tokio::test(flavor = "multi_thread")]
async fn remind_resends_the_notification() {
    let harness = Harness::new(config_with_reviewer()).await;
    seed_agent(
        &harness,
        &[(RiskCategory::High, ApprovalRequirement::Elevated)],
    )
    .await;
    harness.cartridge.script(
        "ads.campaign.pause",
        ScriptedAction {
            risk: low_risk(RiskCategory::High, 10.0),
            ..Default::default()
        },
    );

    let report = harness
        .orchestrator
        .execute(pause_command("key_1"))
        .await
        .unwrap();
    let approval_id = report.approval_id.unwrap();

    harness
        .orchestrator
        .remind_approval(&approval_id)
        .await
        .unwrap();

    let seen = harness.notifier.seen();
    assert_eq!(seen.len(), 2);
    assert!(!seen[0].is_reminder);
    assert!(seen[1].is_reminder);
}

#[tokio::test(flavor = "multi_thread")]
async fn fallback_approver_can_commit_after_escalation_delay() {
    let harness = Harness::new(config_with_reviewer()).await;
    seed_agent(
        &harness,
        &[(RiskCategory::High, ApprovalRequirement::Elevated)],
    )
    .await;
    harness.cartridge.script(
        "ads.campaign.pause",
        ScriptedAction {
            risk: low_risk(RiskCategory::High, 10.0),
            result: ExecuteResult::ok("paused"),
            transient_failures: 0,
        },
    );

    let report = harness
        .orchestrator
        .execute(pause_command("key_1"))
        .await
        .unwrap();
    let approval_id = report.approval_id.unwrap();
    let binding_hash = report.binding_hash.unwrap();

    // Before the escalation delay the fallback is a stranger.
    let err = harness
        .orchestrator
        .respond_to_approval(
            &approval_id,
            ApprovalResponse {
                action: ApprovalAction::Approve,
                responded_by: "backup_1".into(),
                binding_hash: Some(binding_hash.clone()),
                patch_value: None,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.http_status(), 403);

    // Past the delay (default four hours) the fallback may respond.
    harness.clock.advance(4 * 60 * 60 * 1000 + 1);
    let outcome = harness
        .orchestrator
        .respond_to_approval(
            &approval_id,
            ApprovalResponse {
                action: ApprovalAction::Approve,
                responded_by: "backup_1".into(),
                binding_hash: Some(binding_hash),
                patch_value: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome.outcome, ExecuteOutcome::Executed);
}

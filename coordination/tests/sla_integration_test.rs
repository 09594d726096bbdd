//! SLA policy reconciliation, watch triggers and breach notifications

mod common;

use chrono::{Duration, TimeZone, Utc};
use common::{harness, show_version, DeviceReply, FakeChannel, Harness, RecordingBackend};
use nano_coordination::actions::names;
use nano_coordination::sla::{TriggerState, KICKER_NAME, POLICY_NAME};
use nano_coordination::store::{with_write, ConfigStore, TransactionExt};
use nano_coordination::{ActionInvocation, ErrorCategory, NodePath, Principal, ServiceId};

fn init_invocation() -> ActionInvocation {
    ActionInvocation::new(Principal::admin(), names::INIT_SLA_POLICY, NodePath::Sla)
}

#[tokio::test]
async fn test_timeout_edit_resyncs_policy_through_kicker() {
    let h = harness(FakeChannel::netsim(), RecordingBackend::new());
    assert!(h.app.call(&init_invocation()).await.result);
    assert_eq!(h.store.tree().policies[POLICY_NAME].jeopardy_timeout, 30 * 60);

    h.app.set_timeouts(5, 10).await.unwrap();
    let tree = h.store.tree();
    assert_eq!(tree.policies.len(), 1);
    assert_eq!(tree.policies[POLICY_NAME].jeopardy_timeout, 300);
    assert_eq!(tree.policies[POLICY_NAME].violation_timeout, 600);
    assert!(h.store.drain_kicks().is_empty(), "kicks are consumed by the application");

    h.app.set_timeouts(7, 20).await.unwrap();
    let tree = h.store.tree();
    assert_eq!(tree.policies.len(), 1);
    assert_eq!(tree.policies[POLICY_NAME].jeopardy_timeout, 420);
    assert_eq!(tree.kickers.len(), 1);
    assert!(tree.kickers.contains_key(KICKER_NAME));
}

#[tokio::test]
async fn test_failed_resync_fails_timeout_edit() {
    let h = harness(FakeChannel::netsim(), RecordingBackend::new());
    assert!(h.app.call(&init_invocation()).await.result);
    with_write(h.store.as_ref(), &Principal::admin(), |txn| {
        let mut kicker = txn.kicker(KICKER_NAME)?.unwrap();
        kicker.action_name = "unbound-action".to_string();
        txn.put_kicker(kicker)?;
        Ok(())
    })
    .unwrap();

    let err = h.app.set_timeouts(5, 10).await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Convergence);
    assert!(err.to_string().contains("unbound-action"), "{err}");
    assert_eq!(h.store.tree().policies[POLICY_NAME].jeopardy_timeout, 30 * 60);
}

#[tokio::test]
async fn test_repeated_setup_keeps_singletons() {
    let h = harness(FakeChannel::netsim(), RecordingBackend::new());
    for _ in 0..3 {
        let output = h.app.call(&init_invocation()).await;
        assert!(output.result);
        assert_eq!(output.msg, "OK");
    }
    let tree = h.store.tree();
    assert_eq!(tree.policies.len(), 1);
    assert_eq!(tree.kickers.len(), 1);
}

async fn stuck_service(h: &Harness, id: &ServiceId) -> chrono::DateTime<Utc> {
    assert!(h.app.call(&init_invocation()).await.result);
    h.app.set_timeouts(5, 10).await.unwrap();
    h.app.set_webex("%ENV{BOT_TOKEN}", "%ENV{ROOM_ID}").unwrap();
    h.app.create_service(id, "ios0", "10.0.0.53").unwrap();

    let t0 = Utc.with_ymd_and_hms(2021, 8, 19, 23, 2, 1).unwrap();
    let report = h.app.converge_at(id, t0).await.unwrap();
    assert!(report.failure.is_some(), "plan must be stuck at pre-test");
    t0
}

#[tokio::test]
async fn test_breach_renders_display_time() {
    let channel = FakeChannel::new(DeviceReply::Output(show_version("0x2142")));
    let h = harness(channel, RecordingBackend::new());
    let id = ServiceId::new("svc-7").unwrap();
    let t0 = stuck_service(&h, &id).await;
    let approvals = h.backend.messages().len();

    let outcomes = h.app.sweep(t0 + Duration::minutes(6)).await.unwrap();
    assert_eq!(outcomes.len(), 1);
    let (invocation, output) = &outcomes[0];
    assert_eq!(invocation.name, "timeout-breach");
    assert_eq!(invocation.path, NodePath::SlaTimeoutAction);
    assert!(output.result, "{}", output.msg);

    let messages = h.backend.messages();
    assert_eq!(messages.len(), approvals + 1);
    let (breach, _) = messages.last().unwrap();
    assert!(breach.markdown.contains("svc-7"), "{}", breach.markdown);
    assert!(breach.markdown.contains("jeopardized"), "{}", breach.markdown);
    assert!(breach.markdown.contains("23:07 19.08.2021"), "{}", breach.markdown);
    let card = serde_json::to_string(&breach.attachments).unwrap();
    assert!(card.contains("23:07 19.08.2021"));

    let trigger = &h.store.tree().services[&id].trigger_status["nano-spm-svc-7"];
    assert_eq!(trigger.status, TriggerState::Jeopardized);
}

#[tokio::test]
async fn test_violation_follows_jeopardy_once() {
    let channel = FakeChannel::new(DeviceReply::Output(show_version("0x2142")));
    let h = harness(channel, RecordingBackend::new());
    let id = ServiceId::new("svc-8").unwrap();
    let t0 = stuck_service(&h, &id).await;

    assert!(h.app.sweep(t0 + Duration::minutes(2)).await.unwrap().is_empty());
    assert_eq!(h.app.sweep(t0 + Duration::minutes(6)).await.unwrap().len(), 1);
    let violated = h.app.sweep(t0 + Duration::minutes(12)).await.unwrap();
    assert_eq!(violated.len(), 1);
    assert_eq!(violated[0].0.input["timeout"].to_string(), "violation");
    assert!(h.app.sweep(t0 + Duration::minutes(60)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_ready_plan_reports_success() {
    let h = harness(FakeChannel::netsim(), RecordingBackend::new());
    assert!(h.app.call(&init_invocation()).await.result);
    h.app.set_webex("%ENV{BOT_TOKEN}", "%ENV{ROOM_ID}").unwrap();
    let id = ServiceId::new("svc-9").unwrap();
    h.app.create_service(&id, "ios0", "10.0.0.53").unwrap();
    let t0 = Utc.with_ymd_and_hms(2021, 8, 19, 23, 2, 1).unwrap();
    assert!(h.app.converge_at(&id, t0).await.unwrap().ready);

    let outcomes = h.app.sweep(t0 + Duration::minutes(1)).await.unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].0.input["status"].to_string(), "successful");
    assert!(h.app.sweep(t0 + Duration::minutes(90)).await.unwrap().is_empty());
}

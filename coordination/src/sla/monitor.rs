//! Progress monitoring: per-service SLA triggers
//!
//! A trigger is started when the plan is created and carries absolute
//! jeopardy/violation deadlines taken from the active policy. Nothing here
//! waits: [`SlaMonitor::evaluate`] is called by an external tick, moves each
//! open trigger forward and returns the breach-action invocations to run.
//!
//! ```text
//! running ──condition met──► successful
//!    │                          ▲
//!    ├─now ≥ jeopardy─► jeopardized ──condition met──┘
//!    │                      │
//!    └────now ≥ violation───┴──► violated
//! ```

use super::policy::{SlaPolicy, POLICY_NAME};
use crate::actions::ActionInvocation;
use crate::error::NanoResult;
use crate::notify::params::ParamValue;
use crate::store::{NodePath, ServiceRecord, StoreResult, Transaction, TransactionExt};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp format used for trigger deadlines, e.g. `2021-08-19T23:07:01+00:00`
pub const SPM_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S+00:00";
/// Action name bound to the policy's breach action path
pub const BREACH_ACTION: &str = "timeout-breach";

const TRIGGER_PREFIX: &str = "nano-spm-";

pub fn trigger_name(service: &crate::store::ServiceId) -> String {
    format!("{TRIGGER_PREFIX}{service}")
}

pub fn format_spm_time(at: DateTime<Utc>) -> String {
    at.format(SPM_TIME_FORMAT).to_string()
}

pub fn parse_spm_time(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(raw, SPM_TIME_FORMAT).map(|naive| naive.and_utc())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerState {
    Running,
    Jeopardized,
    Violated,
    Successful,
}

impl TriggerState {
    fn is_open(self) -> bool {
        matches!(self, Self::Running | Self::Jeopardized)
    }

    /// Which deadline the transition into this state reports
    fn timeout_label(self) -> &'static str {
        match self {
            Self::Jeopardized => "jeopardy",
            Self::Violated => "violation",
            Self::Running | Self::Successful => "none",
        }
    }
}

impl fmt::Display for TriggerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Jeopardized => write!(f, "jeopardized"),
            Self::Violated => write!(f, "violated"),
            Self::Successful => write!(f, "successful"),
        }
    }
}

/// Deadlines recorded against one service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerStatus {
    pub policy: String,
    pub start_time: String,
    pub jeopardy_time: String,
    pub violation_time: String,
    pub status: TriggerState,
}

impl TriggerStatus {
    fn from_policy(policy: &SlaPolicy, start: DateTime<Utc>) -> Self {
        let secs = |s: u64| Duration::seconds(i64::try_from(s).unwrap_or(i64::MAX / 1000));
        Self {
            policy: policy.name.clone(),
            start_time: format_spm_time(start),
            jeopardy_time: format_spm_time(start + secs(policy.jeopardy_timeout)),
            violation_time: format_spm_time(start + secs(policy.violation_timeout)),
            status: TriggerState::Running,
        }
    }
}

/// Starts triggers and evaluates their deadlines
#[derive(Debug, Default, Clone, Copy)]
pub struct SlaMonitor;

impl SlaMonitor {
    /// Start the service's trigger from the singleton policy.
    ///
    /// Returns `false` without touching the record when no policy exists yet
    /// or the trigger is already running.
    pub fn start(
        txn: &dyn Transaction,
        record: &mut ServiceRecord,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let name = trigger_name(&record.id);
        if record.trigger_status.contains_key(&name) {
            return Ok(false);
        }
        let Some(policy) = txn.policy(POLICY_NAME)? else {
            tracing::warn!(
                service = %record.id,
                "No SLA policy configured, progress not monitored"
            );
            return Ok(false);
        };
        let status = TriggerStatus::from_policy(&policy, now);
        tracing::info!(
            service = %record.id,
            trigger = %name,
            jeopardy = %status.jeopardy_time,
            violation = %status.violation_time,
            "SLA trigger started"
        );
        record.trigger_status.insert(name, status);
        Ok(true)
    }

    /// Advance every open trigger and collect breach invocations
    pub fn evaluate(
        txn: &mut dyn Transaction,
        now: DateTime<Utc>,
    ) -> NanoResult<Vec<ActionInvocation>> {
        let mut invocations = Vec::new();
        let principal = txn.principal().clone();

        for id in txn.service_ids()? {
            let mut record = txn.service(&id)?;
            let mut changed = false;

            for (trigger, status) in record.trigger_status.iter_mut() {
                if !status.status.is_open() {
                    continue;
                }
                let Some(policy) = txn.policy(&status.policy)? else {
                    tracing::warn!(
                        trigger = %trigger,
                        policy = %status.policy,
                        "Trigger references a missing policy"
                    );
                    continue;
                };

                let next = next_state(&policy, &record.plan, status, now);
                let Some(next) = next else { continue };

                tracing::info!(
                    service = %id,
                    trigger = %trigger,
                    from = %status.status,
                    to = %next,
                    "SLA trigger transition"
                );
                status.status = next;
                changed = true;

                if next != TriggerState::Successful || policy.action.always_call {
                    let path = policy
                        .action
                        .action_path
                        .parse::<NodePath>()
                        .unwrap_or(NodePath::SlaTimeoutAction);
                    let service_ref = NodePath::Service(id.clone())
                        .xpath()
                        .unwrap_or_default();
                    invocations.push(
                        ActionInvocation::new(principal.clone(), BREACH_ACTION, path)
                            .with_input("policy", policy.name.as_str())
                            .with_input("service", service_ref)
                            .with_input("status", ParamValue::Enumeration(next.to_string()))
                            .with_input(
                                "timeout",
                                ParamValue::Enumeration(next.timeout_label().to_string()),
                            )
                            .with_input("trigger", trigger.as_str()),
                    );
                }
            }

            if changed {
                txn.put_service(record)?;
            }
        }
        Ok(invocations)
    }
}

fn next_state(
    policy: &SlaPolicy,
    plan: &crate::plan::types::Plan,
    status: &TriggerStatus,
    now: DateTime<Utc>,
) -> Option<TriggerState> {
    if policy.is_satisfied(plan) {
        return Some(TriggerState::Successful);
    }
    let passed = |raw: &str| match parse_spm_time(raw) {
        Ok(deadline) => now >= deadline,
        Err(e) => {
            tracing::warn!(value = raw, error = %e, "Unparseable trigger deadline");
            false
        }
    };
    if passed(&status.violation_time) {
        return Some(TriggerState::Violated);
    }
    if status.status == TriggerState::Running && passed(&status.jeopardy_time) {
        return Some(TriggerState::Jeopardized);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::types::{states, ComponentKey, StateStatus};
    use crate::sla::policy::reconcile_policy;
    use crate::store::{
        with_write, ConfigStore, MemoryStore, Node, Principal, ServiceId, SlaTimeouts, TxnMode,
    };
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 8, 19, 23, 2, 1).unwrap()
    }

    fn store_with_service() -> (MemoryStore, ServiceId) {
        let store = MemoryStore::new();
        let id = ServiceId::new("svc-7").unwrap();
        with_write(&store, &Principal::admin(), |txn| {
            txn.set(
                &NodePath::SlaTimeouts,
                Node::Timeouts(SlaTimeouts {
                    jeopardy: 5,
                    violation: 10,
                }),
            )?;
            reconcile_policy(txn)?;
            let mut record = ServiceRecord::new(id.clone(), "ios0", "10.0.0.53");
            SlaMonitor::start(txn, &mut record, t0())?;
            txn.put_service(record)?;
            Ok(())
        })
        .unwrap();
        (store, id)
    }

    fn evaluate(store: &MemoryStore, at: DateTime<Utc>) -> Vec<ActionInvocation> {
        with_write(store, &Principal::admin(), |txn| SlaMonitor::evaluate(txn, at)).unwrap()
    }

    #[test]
    fn test_time_format_round_trip() {
        let parsed = parse_spm_time("2021-08-19T23:07:01+00:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2021, 8, 19, 23, 7, 1).unwrap());
        assert_eq!(format_spm_time(parsed), "2021-08-19T23:07:01+00:00");
        assert!(parse_spm_time("19.08.2021").is_err());
    }

    #[test]
    fn test_start_records_deadlines() {
        let (store, id) = store_with_service();
        let record = &store.tree().services[&id];
        let status = &record.trigger_status["nano-spm-svc-7"];
        assert_eq!(status.jeopardy_time, "2021-08-19T23:07:01+00:00");
        assert_eq!(status.violation_time, "2021-08-19T23:12:01+00:00");
        assert_eq!(status.status, TriggerState::Running);
    }

    #[test]
    fn test_start_without_policy_is_noop() {
        let store = MemoryStore::new();
        let mut record = ServiceRecord::new(ServiceId::new("a").unwrap(), "d", "ns");
        let txn = store
            .begin(TxnMode::Read, &Principal::admin())
            .unwrap();
        assert!(!SlaMonitor::start(txn.as_ref(), &mut record, t0()).unwrap());
        assert!(record.trigger_status.is_empty());
    }

    #[test]
    fn test_jeopardy_then_violation_fire_once_each() {
        let (store, _) = store_with_service();

        assert!(evaluate(&store, t0() + Duration::minutes(1)).is_empty());

        let fired = evaluate(&store, t0() + Duration::minutes(6));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].name, BREACH_ACTION);
        assert_eq!(fired[0].path, NodePath::SlaTimeoutAction);
        assert_eq!(fired[0].input["status"].to_string(), "jeopardized");
        assert_eq!(
            fired[0].input["service"].to_string(),
            "/nano:nano/nano:nano[nano:id='svc-7']"
        );

        assert!(evaluate(&store, t0() + Duration::minutes(7)).is_empty());

        let fired = evaluate(&store, t0() + Duration::minutes(11));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].input["timeout"].to_string(), "violation");
        assert!(evaluate(&store, t0() + Duration::minutes(30)).is_empty());
    }

    #[test]
    fn test_success_reported_with_always_call() {
        let (store, id) = store_with_service();
        with_write(&store, &Principal::admin(), |txn| {
            let mut record = txn.service(&id)?;
            record
                .plan
                .state_mut(&ComponentKey::self_component(), states::READY)
                .unwrap()
                .status = StateStatus::Reached;
            txn.put_service(record)?;
            Ok(())
        })
        .unwrap();

        let fired = evaluate(&store, t0() + Duration::minutes(1));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].input["status"].to_string(), "successful");
        assert_eq!(
            store.tree().services[&id].trigger_status["nano-spm-svc-7"].status,
            TriggerState::Successful
        );
    }
}

//! SLA policy: singleton escalation policy derived from operator timeouts

use crate::error::NanoResult;
use crate::plan::types::{Plan, StateStatus};
use crate::store::{NodePath, Transaction, TransactionExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name of the singleton policy
pub const POLICY_NAME: &str = "nano-sla-policy";
/// Condition arming the policy: `self` reached `ready`
pub const CONDITION_NAME: &str = "self-ready";

const SECONDS_PER_MINUTE: u64 = 60;

/// How many matching components must satisfy a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quantifier {
    All,
    Any,
}

/// Requirement on the components of one type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentCondition {
    /// Component type short name, e.g. `self`
    pub component_type: String,
    pub plan_state: String,
    pub status: StateStatus,
    pub what: Quantifier,
}

impl ComponentCondition {
    pub fn is_satisfied(&self, plan: &Plan) -> bool {
        let mut matches = plan
            .components
            .iter()
            .filter(|c| c.key.kind.short_name() == self.component_type)
            .map(|c| {
                c.state(&self.plan_state)
                    .is_some_and(|s| s.status == self.status)
            })
            .peekable();

        if matches.peek().is_none() {
            return false;
        }
        match self.what {
            Quantifier::All => matches.all(|ok| ok),
            Quantifier::Any => matches.any(|ok| ok),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyCondition {
    pub name: String,
    pub component_types: BTreeMap<String, ComponentCondition>,
}

/// Action invoked when a trigger changes state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyAction {
    /// Invoke on every transition, not only on breaches
    pub always_call: bool,
    /// Keypath of the action point
    pub action_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaPolicy {
    pub name: String,
    /// Seconds from trigger start until jeopardy
    pub jeopardy_timeout: u64,
    /// Seconds from trigger start until violation
    pub violation_timeout: u64,
    pub conditions: BTreeMap<String, PolicyCondition>,
    pub action: PolicyAction,
}

impl SlaPolicy {
    fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            jeopardy_timeout: 0,
            violation_timeout: 0,
            conditions: BTreeMap::new(),
            action: PolicyAction {
                always_call: false,
                action_path: String::new(),
            },
        }
    }

    /// Every condition holds for the plan
    pub fn is_satisfied(&self, plan: &Plan) -> bool {
        self.conditions.values().all(|condition| {
            condition
                .component_types
                .values()
                .all(|ct| ct.is_satisfied(plan))
        })
    }
}

/// Upsert the singleton policy from the operator timeouts.
///
/// There is no separate create path: the stored policy (or an empty one) is
/// loaded, every managed field is overwritten, and the whole node is written
/// back in one `set`.
pub fn reconcile_policy(txn: &mut dyn Transaction) -> NanoResult<SlaPolicy> {
    let timeouts = txn.timeouts()?;
    let mut policy = txn
        .policy(POLICY_NAME)?
        .unwrap_or_else(|| SlaPolicy::empty(POLICY_NAME));

    policy.jeopardy_timeout = u64::from(timeouts.jeopardy) * SECONDS_PER_MINUTE;
    policy.violation_timeout = u64::from(timeouts.violation) * SECONDS_PER_MINUTE;
    policy.action.always_call = true;
    policy.action.action_path = NodePath::SlaTimeoutAction.to_string();

    let condition = policy
        .conditions
        .entry(CONDITION_NAME.to_string())
        .or_insert_with(|| PolicyCondition {
            name: CONDITION_NAME.to_string(),
            component_types: BTreeMap::new(),
        });
    let component = condition
        .component_types
        .entry("self".to_string())
        .or_insert_with(|| ComponentCondition {
            component_type: "self".to_string(),
            plan_state: String::new(),
            status: StateStatus::Reached,
            what: Quantifier::All,
        });
    component.status = StateStatus::Reached;
    component.plan_state = "ready".to_string();
    component.what = Quantifier::All;

    if policy.violation_timeout < policy.jeopardy_timeout {
        tracing::warn!(
            jeopardy_secs = policy.jeopardy_timeout,
            violation_secs = policy.violation_timeout,
            "Violation timeout is shorter than jeopardy timeout"
        );
    }

    txn.put_policy(policy.clone())?;
    tracing::info!(
        policy = %policy.name,
        jeopardy_secs = policy.jeopardy_timeout,
        violation_secs = policy.violation_timeout,
        "SLA policy reconciled"
    );
    Ok(policy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::types::{states, ComponentKey};
    use crate::store::{with_write, MemoryStore, Node, Principal, SlaTimeouts};

    fn set_timeouts(store: &MemoryStore, jeopardy: u32, violation: u32) {
        with_write(store, &Principal::admin(), |txn| {
            txn.set(
                &NodePath::SlaTimeouts,
                Node::Timeouts(SlaTimeouts {
                    jeopardy,
                    violation,
                }),
            )?;
            Ok(())
        })
        .unwrap();
    }

    fn reconcile(store: &MemoryStore) -> SlaPolicy {
        with_write(store, &Principal::admin(), reconcile_policy).unwrap()
    }

    #[test]
    fn test_creates_single_policy_in_seconds() {
        let store = MemoryStore::new();
        set_timeouts(&store, 5, 10);
        let policy = reconcile(&store);

        assert_eq!(policy.jeopardy_timeout, 300);
        assert_eq!(policy.violation_timeout, 600);
        assert!(policy.action.always_call);
        assert_eq!(
            policy.action.action_path,
            "/nano:nano/nano:sla/nano:timeouts/nano:timeout"
        );
        let tree = store.tree();
        assert_eq!(tree.policies.len(), 1);
        assert!(tree.policies.contains_key(POLICY_NAME));
    }

    #[test]
    fn test_update_in_place() {
        let store = MemoryStore::new();
        set_timeouts(&store, 5, 10);
        reconcile(&store);
        set_timeouts(&store, 7, 20);
        reconcile(&store);

        let tree = store.tree();
        assert_eq!(tree.policies.len(), 1);
        let policy = &tree.policies[POLICY_NAME];
        assert_eq!(policy.jeopardy_timeout, 7 * 60);
        assert_eq!(policy.violation_timeout, 20 * 60);
        assert_eq!(policy.conditions.len(), 1);
        assert_eq!(policy.conditions[CONDITION_NAME].component_types.len(), 1);
    }

    #[test]
    fn test_condition_repairs_drifted_fields() {
        let store = MemoryStore::new();
        reconcile(&store);
        with_write(&store, &Principal::admin(), |txn| {
            let mut policy = txn.policy(POLICY_NAME)?.unwrap();
            let ct = policy
                .conditions
                .get_mut(CONDITION_NAME)
                .unwrap()
                .component_types
                .get_mut("self")
                .unwrap();
            ct.what = Quantifier::Any;
            ct.plan_state = "init".to_string();
            policy.action.always_call = false;
            txn.put_policy(policy)?;
            Ok(())
        })
        .unwrap();

        let policy = reconcile(&store);
        let ct = &policy.conditions[CONDITION_NAME].component_types["self"];
        assert_eq!(ct.what, Quantifier::All);
        assert_eq!(ct.plan_state, "ready");
        assert_eq!(ct.status, StateStatus::Reached);
        assert!(policy.action.always_call);
    }

    #[test]
    fn test_condition_requires_self_ready() {
        let store = MemoryStore::new();
        let policy = reconcile(&store);
        let mut plan = Plan::nano();
        assert!(!policy.is_satisfied(&plan));

        plan.state_mut(&ComponentKey::self_component(), states::READY)
            .unwrap()
            .status = StateStatus::Reached;
        assert!(policy.is_satisfied(&plan));
    }

    #[test]
    fn test_quantifier_any_versus_all() {
        let mut plan = Plan::nano();
        plan.state_mut(&ComponentKey::name_server(), states::READY)
            .unwrap()
            .status = StateStatus::Reached;
        let mut second = plan.components[1].clone();
        second.key.name = "secondary".to_string();
        second.states.iter_mut().for_each(|s| s.status = StateStatus::NotReached);
        plan.components.push(second);

        let mut condition = ComponentCondition {
            component_type: "cfg-com-type".to_string(),
            plan_state: states::READY.to_string(),
            status: StateStatus::Reached,
            what: Quantifier::All,
        };
        assert!(!condition.is_satisfied(&plan));
        condition.what = Quantifier::Any;
        assert!(condition.is_satisfied(&plan));
    }
}

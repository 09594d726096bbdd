//! Plan model: components, states and the fixed nano topology

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Component types known to the nano service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ComponentType {
    /// `ncs:self`: the service as a whole
    #[serde(rename = "ncs:self")]
    SelfComponent,
    /// `nano:cfg-com-type`: the configuration pushed to the device
    #[serde(rename = "nano:cfg-com-type")]
    CfgCom,
}

impl ComponentType {
    /// Short name used by SLA conditions (`self`, `cfg-com-type`)
    pub fn short_name(self) -> &'static str {
        match self {
            Self::SelfComponent => "self",
            Self::CfgCom => "cfg-com-type",
        }
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SelfComponent => write!(f, "ncs:self"),
            Self::CfgCom => write!(f, "nano:cfg-com-type"),
        }
    }
}

/// (component-type, component-name) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentKey {
    pub kind: ComponentType,
    pub name: String,
}

impl ComponentKey {
    pub fn new(kind: ComponentType, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    pub fn self_component() -> Self {
        Self::new(ComponentType::SelfComponent, "self")
    }

    pub fn name_server() -> Self {
        Self::new(ComponentType::CfgCom, "name-server")
    }
}

impl fmt::Display for ComponentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// Plan state names
pub mod states {
    pub const INIT: &str = "init";
    pub const READY: &str = "ready";
    pub const NAME_SERVER_CFG: &str = "name-server-cfg";
}

/// Status of a single plan state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StateStatus {
    NotReached,
    Reached,
    Failed,
}

impl fmt::Display for StateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReached => write!(f, "not-reached"),
            Self::Reached => write!(f, "reached"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of an action run when a state was entered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostActionStatus {
    pub action: String,
    pub result: bool,
    pub msg: String,
}

/// One node of a component's state graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanState {
    pub name: String,
    pub status: StateStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<DateTime<Utc>>,
    /// Failure reason when `status` is `failed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_action: Option<PostActionStatus>,
}

impl PlanState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: StateStatus::NotReached,
            when: None,
            error: None,
            post_action: None,
        }
    }

    pub fn is_reached(&self) -> bool {
        self.status == StateStatus::Reached
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanComponent {
    pub key: ComponentKey,
    pub states: Vec<PlanState>,
}

impl PlanComponent {
    pub fn state(&self, name: &str) -> Option<&PlanState> {
        self.states.iter().find(|s| s.name == name)
    }
}

/// A service's plan: components fixed at creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub components: Vec<PlanComponent>,
}

impl Plan {
    /// Unreached plan for the nano service type
    pub fn nano() -> Self {
        let topology = Topology::nano();
        Self {
            components: topology
                .components
                .iter()
                .map(|(key, names)| PlanComponent {
                    key: key.clone(),
                    states: names.iter().map(|n| PlanState::new(*n)).collect(),
                })
                .collect(),
        }
    }

    pub fn component(&self, key: &ComponentKey) -> Option<&PlanComponent> {
        self.components.iter().find(|c| &c.key == key)
    }

    pub fn state(&self, key: &ComponentKey, state: &str) -> Option<&PlanState> {
        self.component(key).and_then(|c| c.state(state))
    }

    pub fn state_mut(&mut self, key: &ComponentKey, state: &str) -> Option<&mut PlanState> {
        self.components
            .iter_mut()
            .find(|c| &c.key == key)
            .and_then(|c| c.states.iter_mut().find(|s| s.name == state))
    }

    /// Whether the `self` component has reached `ready`
    pub fn is_ready(&self) -> bool {
        self.state(&ComponentKey::self_component(), states::READY)
            .is_some_and(PlanState::is_reached)
    }
}

/// What happens around a state entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepWiring {
    /// Action that must pass before the state's callback runs
    pub pre_condition: Option<&'static str>,
    /// Whether a registered convergence callback runs for this state
    pub create_callback: bool,
    /// Action that must pass after the callback, before the state is reached
    pub post_condition: Option<&'static str>,
    /// Start SLA progress monitoring once the state is reached
    pub starts_sla: bool,
    /// Action invoked once the state is reached; its outcome never fails the state
    pub post_action: Option<&'static str>,
}

impl StepWiring {
    const fn plain() -> Self {
        Self {
            pre_condition: None,
            create_callback: false,
            post_condition: None,
            starts_sla: false,
            post_action: None,
        }
    }
}

/// A (component, state) pair in driver order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanStep {
    pub component: ComponentKey,
    pub state: &'static str,
    pub wiring: StepWiring,
}

/// Fixed plan topology for a service type
#[derive(Debug, Clone)]
pub struct Topology {
    /// Components and their local state order
    pub components: Vec<(ComponentKey, Vec<&'static str>)>,
    /// Global step order honoured by the plan driver
    pub steps: Vec<PlanStep>,
}

impl Topology {
    /// ```text
    /// self/init ──► name-server/init ──► name-server/name-server-cfg ──► name-server/ready ──► self/ready
    ///   │ start SLA trigger                 │ pre-test, callback, post-test
    ///   └ approval-requested
    /// ```
    pub fn nano() -> Self {
        let this = ComponentKey::self_component();
        let ns = ComponentKey::name_server();
        Self {
            components: vec![
                (this.clone(), vec![states::INIT, states::READY]),
                (
                    ns.clone(),
                    vec![states::INIT, states::NAME_SERVER_CFG, states::READY],
                ),
            ],
            steps: vec![
                PlanStep {
                    component: this.clone(),
                    state: states::INIT,
                    wiring: StepWiring {
                        starts_sla: true,
                        post_action: Some("approval-requested"),
                        ..StepWiring::plain()
                    },
                },
                PlanStep {
                    component: ns.clone(),
                    state: states::INIT,
                    wiring: StepWiring::plain(),
                },
                PlanStep {
                    component: ns.clone(),
                    state: states::NAME_SERVER_CFG,
                    wiring: StepWiring {
                        pre_condition: Some("pre-test"),
                        create_callback: true,
                        post_condition: Some("post-test"),
                        ..StepWiring::plain()
                    },
                },
                PlanStep {
                    component: ns,
                    state: states::READY,
                    wiring: StepWiring::plain(),
                },
                PlanStep {
                    component: this,
                    state: states::READY,
                    wiring: StepWiring::plain(),
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nano_plan_matches_topology() {
        let plan = Plan::nano();
        assert_eq!(plan.components.len(), 2);
        let ns = plan.component(&ComponentKey::name_server()).unwrap();
        let names: Vec<_> = ns.states.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["init", "name-server-cfg", "ready"]);
        assert!(ns.states.iter().all(|s| s.status == StateStatus::NotReached));
    }

    #[test]
    fn test_steps_respect_local_state_order() {
        let topology = Topology::nano();
        for (key, order) in &topology.components {
            let seen: Vec<_> = topology
                .steps
                .iter()
                .filter(|s| &s.component == key)
                .map(|s| s.state)
                .collect();
            assert_eq!(&seen, order, "component {key}");
        }
        let last = topology.steps.last().unwrap();
        assert_eq!(last.component, ComponentKey::self_component());
        assert_eq!(last.state, states::READY);
    }

    #[test]
    fn test_component_type_serialization() {
        let json = serde_json::to_string(&ComponentType::CfgCom).unwrap();
        assert_eq!(json, "\"nano:cfg-com-type\"");
        assert_eq!(ComponentType::SelfComponent.short_name(), "self");
    }
}

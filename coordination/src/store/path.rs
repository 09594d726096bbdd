//! Typed node addressing
//!
//! Inside the crate every node is addressed by a [`NodePath`]. String paths
//! only appear at the boundary: keypaths such as `/nano:nano/nano{svc-7}` or
//! the xpath form `/nano:nano/nano:nano[nano:id='svc-7']` that progress
//! monitoring passes to breach actions.

use super::StoreError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static SERVICE_KEYPATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/nano:nano/nano\{(?P<id>[a-zA-Z0-9_-]+)\}(?:/(?:nano:)?(?P<action>[a-zA-Z0-9_-]+))?$")
        .expect("SERVICE_KEYPATH regex should compile")
});

static SERVICE_XPATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/nano:nano/nano:nano\[nano:id='(?P<id>[a-zA-Z0-9_-]+)'\]$")
        .expect("SERVICE_XPATH regex should compile")
});

static POLICY_KEYPATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/ncs:service-progress-monitoring/policy\{(?P<name>[^{}/]+)\}$")
        .expect("POLICY_KEYPATH regex should compile")
});

static KICKER_KEYPATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/kicker:kickers/data-kicker\{(?P<name>[^{}/]+)\}$")
        .expect("KICKER_KEYPATH regex should compile")
});

const SLA: &str = "/nano:nano/nano:sla";
const SLA_TIMEOUTS: &str = "/nano:nano/nano:sla/nano:timeouts";
const SLA_TIMEOUT_ACTION: &str = "/nano:nano/nano:sla/nano:timeouts/nano:timeout";
const SLA_WEBEX: &str = "/nano:nano/nano:sla/nano:webex";

/// Key of a nano service instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServiceId(String);

impl ServiceId {
    pub fn new(id: impl Into<String>) -> Result<Self, StoreError> {
        let id = id.into();
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if valid {
            Ok(Self(id))
        } else {
            Err(StoreError::InvalidPath(format!("service id '{id}'")))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ServiceId {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ServiceId> for String {
    fn from(id: ServiceId) -> Self {
        id.0
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Address of a node (or action point) in the configuration store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum NodePath {
    /// `/nano:nano/nano{id}`
    Service(ServiceId),
    /// An action defined on a service entry, e.g. `/nano:nano/nano{id}/pre-test`
    ServiceAction { service: ServiceId, action: String },
    /// `/nano:nano/nano:sla` container
    Sla,
    /// Operator-set jeopardy/violation minutes
    SlaTimeouts,
    /// Breach action point referenced by the SLA policy
    SlaTimeoutAction,
    /// Bot token and room id
    Webex,
    /// `/ncs:service-progress-monitoring/policy{name}`
    Policy(String),
    /// `/kicker:kickers/data-kicker{name}`
    Kicker(String),
}

impl NodePath {
    /// Service entry owning this path, if any
    pub fn service_id(&self) -> Option<&ServiceId> {
        match self {
            Self::Service(id) | Self::ServiceAction { service: id, .. } => Some(id),
            _ => None,
        }
    }

    pub fn parent(&self) -> Option<NodePath> {
        match self {
            Self::ServiceAction { service, .. } => Some(Self::Service(service.clone())),
            Self::SlaTimeouts | Self::Webex => Some(Self::Sla),
            Self::SlaTimeoutAction => Some(Self::SlaTimeouts),
            Self::Service(_) | Self::Sla | Self::Policy(_) | Self::Kicker(_) => None,
        }
    }

    /// Whether `other` is this node or lies beneath it
    pub fn contains(&self, other: &NodePath) -> bool {
        let mut cursor = Some(other.clone());
        while let Some(path) = cursor {
            if &path == self {
                return true;
            }
            cursor = path.parent();
        }
        false
    }

    /// Xpath form used in progress-monitoring notifications
    pub fn xpath(&self) -> Option<String> {
        match self {
            Self::Service(id) => Some(format!("/nano:nano/nano:nano[nano:id='{id}']")),
            _ => None,
        }
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Service(id) => write!(f, "/nano:nano/nano{{{id}}}"),
            Self::ServiceAction { service, action } => {
                write!(f, "/nano:nano/nano{{{service}}}/{action}")
            }
            Self::Sla => f.write_str(SLA),
            Self::SlaTimeouts => f.write_str(SLA_TIMEOUTS),
            Self::SlaTimeoutAction => f.write_str(SLA_TIMEOUT_ACTION),
            Self::Webex => f.write_str(SLA_WEBEX),
            Self::Policy(name) => write!(f, "/ncs:service-progress-monitoring/policy{{{name}}}"),
            Self::Kicker(name) => write!(f, "/kicker:kickers/data-kicker{{{name}}}"),
        }
    }
}

impl FromStr for NodePath {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            SLA => return Ok(Self::Sla),
            SLA_TIMEOUTS => return Ok(Self::SlaTimeouts),
            SLA_TIMEOUT_ACTION => return Ok(Self::SlaTimeoutAction),
            SLA_WEBEX => return Ok(Self::Webex),
            _ => {}
        }

        if let Some(caps) = SERVICE_KEYPATH.captures(s) {
            let service = ServiceId::new(&caps["id"])?;
            return Ok(match caps.name("action") {
                Some(action) => Self::ServiceAction {
                    service,
                    action: action.as_str().to_string(),
                },
                None => Self::Service(service),
            });
        }
        if let Some(caps) = SERVICE_XPATH.captures(s) {
            return Ok(Self::Service(ServiceId::new(&caps["id"])?));
        }
        if let Some(caps) = POLICY_KEYPATH.captures(s) {
            return Ok(Self::Policy(caps["name"].to_string()));
        }
        if let Some(caps) = KICKER_KEYPATH.captures(s) {
            return Ok(Self::Kicker(caps["name"].to_string()));
        }

        Err(StoreError::InvalidPath(s.to_string()))
    }
}

impl TryFrom<String> for NodePath {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NodePath> for String {
    fn from(path: NodePath) -> Self {
        path.to_string()
    }
}

//! Notification parameters built from an action invocation

use crate::error::{NanoError, NanoResult};
use crate::sla::monitor::{parse_spm_time, trigger_name};
use crate::store::{NodePath, ServiceId, StoreError, Transaction, TransactionExt};
use std::collections::BTreeMap;
use std::fmt;

/// Display format for deadlines in rendered messages, e.g. `23:07 19.08.2021`
pub const AC_TIME_FORMAT: &str = "%H:%M %d.%m.%Y";

/// Typed action input value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Text(String),
    Bool(bool),
    Integer(i64),
    /// Enumeration leaf, carried by its label
    Enumeration(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) | Self::Enumeration(s) => f.write_str(s),
            Self::Bool(b) => write!(f, "{}", if *b { "true" } else { "false" }),
            Self::Integer(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

/// Action input keyed by leaf name
pub type ParamMap = BTreeMap<String, ParamValue>;

/// Events whose parameters carry the service id and SLA deadlines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A new service plan waits for approval
    ApprovalRequested,
    /// An SLA trigger changed state
    TimeoutBreach,
}

impl EventKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "approval-requested" => Some(Self::ApprovalRequested),
            "timeout-breach" => Some(Self::TimeoutBreach),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ApprovalRequested => "approval-requested",
            Self::TimeoutBreach => "timeout-breach",
        }
    }
}

/// Markdown body template of an event
pub fn markdown_template(event: &str) -> String {
    format!("{event}.md")
}

/// Adaptive-card template of an event
pub fn card_template(event: &str) -> String {
    format!("{event}-ac.json")
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Convert a trigger deadline to the message display format
pub fn reformat_spm_time(raw: &str) -> NanoResult<String> {
    parse_spm_time(raw)
        .map(|at| at.format(AC_TIME_FORMAT).to_string())
        .map_err(|e| NanoError::invalid_input(format!("bad trigger timestamp '{raw}': {e}")))
}

fn strip_prefix(key: &str) -> &str {
    key.split_once(':').map_or(key, |(_, leaf)| leaf)
}

fn service_for(event: EventKind, path: &NodePath, params: &ParamMap) -> NanoResult<ServiceId> {
    match event {
        EventKind::ApprovalRequested => path
            .parent()
            .as_ref()
            .and_then(NodePath::service_id)
            .cloned()
            .ok_or_else(|| {
                NanoError::invalid_input(format!("{path} is not beneath a nano service"))
            }),
        EventKind::TimeoutBreach => {
            let service = params
                .get("service")
                .ok_or_else(|| NanoError::invalid_input("missing 'service' input"))?
                .to_string();
            service
                .parse::<NodePath>()
                .ok()
                .and_then(|p| p.service_id().cloned())
                .ok_or_else(|| {
                    NanoError::invalid_input(format!(
                        "'{service}' does not reference a nano service"
                    ))
                })
        }
    }
}

/// Assemble the parameter bag for one notification.
///
/// Input keys lose their `module:` prefix and `name` is added. For an
/// [`EventKind`] event the service `id` and its trigger deadlines, in display
/// format, are attached as well.
pub fn build_params(
    txn: &dyn Transaction,
    name: &str,
    path: &NodePath,
    input: &ParamMap,
) -> NanoResult<ParamMap> {
    let mut params: ParamMap = input
        .iter()
        .map(|(k, v)| (strip_prefix(k).to_string(), v.clone()))
        .collect();
    params.insert("name".to_string(), name.into());

    let Some(event) = EventKind::from_name(name) else {
        return Ok(params);
    };
    let id = service_for(event, path, &params)?;
    params.insert("id".to_string(), id.as_str().into());

    let record = txn.service(&id)?;
    let key = trigger_name(&id);
    let status = record
        .trigger_status
        .get(&key)
        .ok_or_else(|| StoreError::NotFound {
            path: format!("{}/trigger-status{{{key}}}", NodePath::Service(id.clone())),
        })?;
    params.insert(
        "jeopardy_time".to_string(),
        reformat_spm_time(&status.jeopardy_time)?.into(),
    );
    params.insert(
        "violation_time".to_string(),
        reformat_spm_time(&status.violation_time)?.into(),
    );
    Ok(params)
}

/// Text form of every parameter
pub fn normalize(params: &ParamMap) -> BTreeMap<String, String> {
    params
        .iter()
        .map(|(k, v)| (k.clone(), v.to_string()))
        .collect()
}

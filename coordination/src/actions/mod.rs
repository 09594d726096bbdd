//! Action surface: named entry points invoked by the runtime
//!
//! Actions are registered under an *actionpoint* (`send-msg-action`,
//! `pre-test-action`, ...) and bound to one or more action *names*
//! (`approval-requested`, `timeout-breach`, ...). The registry is the only
//! place errors become outputs: whatever an action returns, the caller gets
//! `{result, msg}` back.
//!
//! ```text
//! invocation(name) ──► bindings[name] ──► actionpoint ──► Action::invoke
//!                                                              │
//!                     ActionOutput { result, msg } ◄───────────┘
//! ```

pub mod handlers;

pub use handlers::{GateAction, GateStage, InitSlaAction, SendMsgAction};

use crate::error::{NanoError, NanoResult};
use crate::notify::params::{ParamMap, ParamValue};
use crate::store::{NodePath, Principal};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Actionpoint names
pub mod points {
    pub const SEND_MSG: &str = "send-msg-action";
    pub const PRE_TEST: &str = "pre-test-action";
    pub const POST_TEST: &str = "post-test-action";
    pub const INIT_SPM: &str = "init-spm-action";
}

/// Action names
pub mod names {
    pub const APPROVAL_REQUESTED: &str = "approval-requested";
    pub const TIMEOUT_BREACH: &str = "timeout-breach";
    pub const PRE_TEST: &str = "pre-test";
    pub const POST_TEST: &str = "post-test";
    pub const INIT_SLA_POLICY: &str = "init-sla-policy";
}

/// (user, name, path, input) as delivered by the runtime
#[derive(Debug, Clone, PartialEq)]
pub struct ActionInvocation {
    pub user: Principal,
    pub name: String,
    /// Keypath of the invoked action
    pub path: NodePath,
    pub input: ParamMap,
}

impl ActionInvocation {
    pub fn new(user: Principal, name: impl Into<String>, path: NodePath) -> Self {
        Self {
            user,
            name: name.into(),
            path,
            input: ParamMap::new(),
        }
    }

    pub fn with_input(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.input.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Ok,
    Err,
}

/// What every action reports back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutput {
    pub status: ActionStatus,
    pub result: bool,
    pub msg: String,
}

impl ActionOutput {
    pub fn passed(msg: impl Into<String>) -> Self {
        Self {
            status: ActionStatus::Ok,
            result: true,
            msg: msg.into(),
        }
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        Self {
            status: ActionStatus::Err,
            result: false,
            msg: msg.into(),
        }
    }

    pub fn from_error(err: &NanoError) -> Self {
        Self::failed(err.to_action_message())
    }
}

#[async_trait]
pub trait Action: Send + Sync {
    async fn invoke(&self, invocation: &ActionInvocation) -> NanoResult<ActionOutput>;
}

/// Explicit dispatch table from action names to implementations
#[derive(Default, Clone)]
pub struct ActionRegistry {
    points: BTreeMap<String, Arc<dyn Action>>,
    bindings: BTreeMap<String, String>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an implementation under an actionpoint
    pub fn register(&mut self, actionpoint: impl Into<String>, action: Arc<dyn Action>) {
        let actionpoint = actionpoint.into();
        tracing::debug!(actionpoint = %actionpoint, "Actionpoint registered");
        self.points.insert(actionpoint, action);
    }

    /// Route an action name to a registered actionpoint
    pub fn bind(&mut self, name: impl Into<String>, actionpoint: impl Into<String>) {
        self.bindings.insert(name.into(), actionpoint.into());
    }

    /// Bound action names with their actionpoints
    pub fn bindings(&self) -> impl Iterator<Item = (&str, &str)> {
        self.bindings.iter().map(|(n, p)| (n.as_str(), p.as_str()))
    }

    /// Drop every binding and actionpoint
    pub fn clear(&mut self) {
        self.points.clear();
        self.bindings.clear();
    }

    /// Invoke the action bound to `invocation.name`
    pub async fn call(&self, invocation: &ActionInvocation) -> ActionOutput {
        let action = self
            .bindings
            .get(&invocation.name)
            .and_then(|point| self.points.get(point));
        let Some(action) = action else {
            let err = NanoError::invalid_input(format!(
                "no action bound to '{}'",
                invocation.name
            ));
            tracing::warn!(action = %invocation.name, "Unbound action invoked");
            return ActionOutput::from_error(&err);
        };

        tracing::info!(
            action = %invocation.name,
            path = %invocation.path,
            user = %invocation.user,
            "Actionpoint invoked"
        );
        match action.invoke(invocation).await {
            Ok(output) => {
                tracing::info!(
                    action = %invocation.name,
                    result = output.result,
                    msg = %output.msg,
                    "Action finished"
                );
                output
            }
            Err(e) => {
                tracing::warn!(action = %invocation.name, error = %e, "Action failed");
                ActionOutput::from_error(&e)
            }
        }
    }
}

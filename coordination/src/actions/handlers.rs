//! Action implementations behind the registered actionpoints

use super::{Action, ActionInvocation, ActionOutput};
use crate::error::{NanoError, NanoResult};
use crate::notify::Dispatcher;
use crate::sla::{reconcile_policy, reconcile_watch};
use crate::store::{with_read, with_write, ConfigStore, TransactionExt};
use crate::verifier::{Verdict, VerificationGate};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// `send-msg-action`: render and deliver the event's message
pub struct SendMsgAction {
    dispatcher: Arc<Dispatcher>,
}

impl SendMsgAction {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl Action for SendMsgAction {
    async fn invoke(&self, invocation: &ActionInvocation) -> NanoResult<ActionOutput> {
        self.dispatcher.dispatch(invocation).await?;
        Ok(ActionOutput::passed("OK"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStage {
    Pre,
    Post,
}

impl fmt::Display for GateStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pre => write!(f, "pre-test"),
            Self::Post => write!(f, "post-test"),
        }
    }
}

/// `pre-test-action` / `post-test-action`: verify the service's device
pub struct GateAction {
    store: Arc<dyn ConfigStore>,
    gate: Arc<VerificationGate>,
    stage: GateStage,
}

impl GateAction {
    pub fn new(store: Arc<dyn ConfigStore>, gate: Arc<VerificationGate>, stage: GateStage) -> Self {
        Self { store, gate, stage }
    }
}

#[async_trait]
impl Action for GateAction {
    async fn invoke(&self, invocation: &ActionInvocation) -> NanoResult<ActionOutput> {
        let service = invocation.path.service_id().cloned().ok_or_else(|| {
            NanoError::invalid_input(format!("{} is not beneath a nano service", invocation.path))
        })?;
        let device = with_read(self.store.as_ref(), &invocation.user, |txn| {
            Ok(txn.service(&service)?.device)
        })?;

        tracing::info!(
            stage = %self.stage,
            service = %service,
            device = %device,
            "Running device checks"
        );
        let result = self.gate.verify(&device).await;
        if let Verdict::Error { reason } = result.verdict {
            return Err(NanoError::Verification(reason));
        }
        Ok(if result.passed {
            ActionOutput::passed(result.message)
        } else {
            ActionOutput::failed(result.message)
        })
    }
}

/// `init-spm-action`: reconcile the SLA policy and its watch trigger
pub struct InitSlaAction {
    store: Arc<dyn ConfigStore>,
}

impl InitSlaAction {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Action for InitSlaAction {
    async fn invoke(&self, invocation: &ActionInvocation) -> NanoResult<ActionOutput> {
        with_write(self.store.as_ref(), &invocation.user, |txn| {
            reconcile_policy(txn)?;
            reconcile_watch(txn)?;
            Ok(())
        })?;
        Ok(ActionOutput::passed("OK"))
    }
}

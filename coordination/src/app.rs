//! Application: wires actions, callbacks and adapters into one runtime
//!
//! [`Application::setup`] builds the action dispatch table and registers the
//! `name-server-cfg` convergence callback; [`Application::teardown`] drops
//! them. Every entry point runs to completion and then drains the watch
//! triggers fired by its commits.

use crate::actions::{
    names, points, ActionInvocation, ActionOutput, ActionRegistry, GateAction, GateStage,
    InitSlaAction, SendMsgAction,
};
use crate::error::{NanoError, NanoResult};
use crate::notify::{Dispatcher, MessagingBackend, SecretResolver, TemplateRenderer};
use crate::plan::{
    states, ComponentType, ConfigTemplates, ConvergeReport, NameServerConvergence, PlanDriver,
    Topology,
};
use crate::sla::SlaMonitor;
use crate::store::{
    with_write, ConfigStore, Kick, Node, NodePath, Principal, ServiceId, ServiceRecord,
    SlaTimeouts, TransactionExt, WebexSettings,
};
use crate::verifier::{CommandChannel, FactsParser, VerificationGate};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// Kick processing stops after this many rounds of commits firing kickers
const MAX_KICK_ROUNDS: usize = 8;

/// Adapters the application runs against
pub struct AppDeps {
    pub store: Arc<dyn ConfigStore>,
    /// User the plan driver and sweeps act as
    pub principal: Principal,
    pub config_templates: Arc<dyn ConfigTemplates>,
    pub renderer: Arc<dyn TemplateRenderer>,
    pub backend: Arc<dyn MessagingBackend>,
    pub secrets: SecretResolver,
    pub channel: Arc<dyn CommandChannel>,
    pub parser: Arc<dyn FactsParser>,
    /// Bound on each verification command
    pub verify_timeout: Duration,
}

pub struct Application {
    store: Arc<dyn ConfigStore>,
    principal: Principal,
    actions: Arc<ActionRegistry>,
    driver: PlanDriver,
}

impl Application {
    pub fn setup(deps: AppDeps) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(
            deps.store.clone(),
            deps.renderer,
            deps.backend,
            deps.secrets,
        ));
        let gate = Arc::new(VerificationGate::new(
            deps.channel,
            deps.parser,
            deps.verify_timeout,
        ));

        let mut actions = ActionRegistry::new();
        actions.register(points::SEND_MSG, Arc::new(SendMsgAction::new(dispatcher)));
        actions.register(
            points::PRE_TEST,
            Arc::new(GateAction::new(deps.store.clone(), gate.clone(), GateStage::Pre)),
        );
        actions.register(
            points::POST_TEST,
            Arc::new(GateAction::new(deps.store.clone(), gate, GateStage::Post)),
        );
        actions.register(points::INIT_SPM, Arc::new(InitSlaAction::new(deps.store.clone())));
        actions.bind(names::APPROVAL_REQUESTED, points::SEND_MSG);
        actions.bind(names::TIMEOUT_BREACH, points::SEND_MSG);
        actions.bind(names::PRE_TEST, points::PRE_TEST);
        actions.bind(names::POST_TEST, points::POST_TEST);
        actions.bind(names::INIT_SLA_POLICY, points::INIT_SPM);
        let actions = Arc::new(actions);

        let mut driver = PlanDriver::new(
            deps.store.clone(),
            deps.principal.clone(),
            Topology::nano(),
            actions.clone(),
        );
        driver.register_callback(
            ComponentType::CfgCom,
            states::NAME_SERVER_CFG,
            Arc::new(NameServerConvergence::new(deps.config_templates)),
        );

        tracing::info!(
            bindings = actions.bindings().count(),
            principal = %deps.principal,
            "Nano application started"
        );
        Self {
            store: deps.store,
            principal: deps.principal,
            actions,
            driver,
        }
    }

    /// Unregister every action; returns how many bindings were removed
    pub fn teardown(self) -> usize {
        let Self {
            driver,
            mut actions,
            ..
        } = self;
        drop(driver);
        let removed = match Arc::get_mut(&mut actions) {
            Some(registry) => {
                let bindings = registry.bindings().count();
                registry.clear();
                bindings
            }
            None => {
                tracing::warn!("Action registry still shared, leaving bindings in place");
                0
            }
        };
        tracing::info!(bindings = removed, "Nano application stopped");
        removed
    }

    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        &self.store
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn actions(&self) -> &ActionRegistry {
        &self.actions
    }

    /// Invoke an action by name, then process fired kicks. A failed kicked
    /// action turns a passing output into a failed one.
    pub async fn call(&self, invocation: &ActionInvocation) -> ActionOutput {
        let output = self.actions.call(invocation).await;
        match self.settle_kicks().await {
            Err(e) if output.result => ActionOutput::from_error(&e),
            _ => output,
        }
    }

    /// Declare a service with a fresh plan
    pub fn create_service(
        &self,
        id: &ServiceId,
        device: &str,
        name_server: &str,
    ) -> NanoResult<ServiceRecord> {
        let record = with_write(self.store.as_ref(), &self.principal, |txn| {
            if txn.get(&NodePath::Service(id.clone()))?.is_some() {
                return Err(NanoError::invalid_input(format!("service '{id}' already exists")));
            }
            let record = ServiceRecord::new(id.clone(), device, name_server);
            txn.put_service(record.clone())?;
            Ok(record)
        })?;
        tracing::info!(service = %id, device, "Service created");
        Ok(record)
    }

    /// Remove a service together with its plan and trigger status
    pub fn delete_service(&self, id: &ServiceId) -> NanoResult<bool> {
        let removed = with_write(self.store.as_ref(), &self.principal, |txn| {
            Ok(txn.delete(&NodePath::Service(id.clone()))?)
        })?;
        tracing::info!(service = %id, removed, "Service deleted");
        Ok(removed)
    }

    pub async fn converge(&self, id: &ServiceId) -> NanoResult<ConvergeReport> {
        self.converge_at(id, Utc::now()).await
    }

    pub async fn converge_at(
        &self,
        id: &ServiceId,
        now: DateTime<Utc>,
    ) -> NanoResult<ConvergeReport> {
        let report = self.driver.converge_at(id, now).await;
        let settled = self.settle_kicks().await;
        let report = report?;
        settled?;
        Ok(report)
    }

    /// Operator edit of the SLA timeouts, in minutes
    pub async fn set_timeouts(&self, jeopardy: u32, violation: u32) -> NanoResult<()> {
        with_write(self.store.as_ref(), &self.principal, |txn| {
            txn.set(
                &NodePath::SlaTimeouts,
                Node::Timeouts(SlaTimeouts {
                    jeopardy,
                    violation,
                }),
            )?;
            Ok(())
        })?;
        tracing::info!(jeopardy, violation, "SLA timeouts updated");
        self.settle_kicks().await
    }

    /// Store bot credentials; values may be `%ENV{NAME}` placeholders
    pub fn set_webex(&self, bot_token: &str, room_id: &str) -> NanoResult<()> {
        with_write(self.store.as_ref(), &self.principal, |txn| {
            txn.set(
                &NodePath::Webex,
                Node::Webex(WebexSettings {
                    bot_token: bot_token.to_string(),
                    room_id: room_id.to_string(),
                }),
            )?;
            Ok(())
        })
    }

    /// Evaluate SLA triggers at `now` and run the resulting breach actions
    pub async fn sweep(
        &self,
        now: DateTime<Utc>,
    ) -> NanoResult<Vec<(ActionInvocation, ActionOutput)>> {
        let invocations = with_write(self.store.as_ref(), &self.principal, |txn| {
            SlaMonitor::evaluate(txn, now)
        })?;
        let mut outcomes = Vec::with_capacity(invocations.len());
        for invocation in invocations {
            let output = self.actions.call(&invocation).await;
            outcomes.push((invocation, output));
        }
        self.settle_kicks().await?;
        Ok(outcomes)
    }

    /// Process fired kicks; the first failed kicked action becomes an error
    async fn settle_kicks(&self) -> NanoResult<()> {
        let handled = self.process_kicks().await;
        match handled.into_iter().find(|(_, output)| !output.result) {
            Some((kick, output)) => Err(NanoError::Convergence {
                component: kick.kicker,
                state: kick.action_name,
                message: output.msg,
            }),
            None => Ok(()),
        }
    }

    /// Invoke the actions of every kicker fired since the last drain
    pub async fn process_kicks(&self) -> Vec<(Kick, ActionOutput)> {
        let mut handled = Vec::new();
        for _ in 0..MAX_KICK_ROUNDS {
            let kicks = self.store.drain_kicks();
            if kicks.is_empty() {
                return handled;
            }
            for kick in kicks {
                let invocation = ActionInvocation::new(
                    self.principal.clone(),
                    kick.action_name.clone(),
                    kick.kick_node.clone(),
                );
                let output = self.actions.call(&invocation).await;
                if !output.result {
                    tracing::warn!(
                        kicker = %kick.kicker,
                        msg = %output.msg,
                        "Kicked action failed"
                    );
                }
                handled.push((kick, output));
            }
        }
        tracing::warn!(rounds = MAX_KICK_ROUNDS, "Kick processing did not settle");
        handled
    }
}

//! Plan driver: walks a service's plan in topology order
//!
//! Each step is entered at most once per walk:
//!
//! ```text
//! reached? ──yes──► skip
//!    │no
//!    ▼
//! pre-condition ─► callback (write txn) ─► post-condition ─► mark reached (+ SLA start)
//!    │ fail            │ fail                 │ fail                 │
//!    └─────────────────┴──────────────────────┴─► mark failed, stop   ▼
//!                                                          post-action, outcome recorded
//! ```
//!
//! A failed state is retried from the same step on the next `converge`.

use super::convergence::{CallbackContext, NanoCallback};
use super::types::{ComponentType, PlanStep, PostActionStatus, StateStatus, Topology};
use crate::actions::{ActionInvocation, ActionRegistry};
use crate::error::{NanoError, NanoResult};
use crate::sla::SlaMonitor;
use crate::store::{
    with_read, with_write, ConfigStore, NodePath, Principal, ServiceId, TransactionExt,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Where a walk stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepFailure {
    /// `<component>/<state>`
    pub step: String,
    pub message: String,
}

/// Outcome of one `converge` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConvergeReport {
    pub service: ServiceId,
    /// Steps newly reached in this walk
    pub reached: Vec<String>,
    pub failure: Option<StepFailure>,
    /// `self` reached `ready`
    pub ready: bool,
}

fn step_label(step: &PlanStep) -> String {
    format!("{}/{}", step.component.name, step.state)
}

pub struct PlanDriver {
    store: Arc<dyn ConfigStore>,
    principal: Principal,
    topology: Topology,
    callbacks: HashMap<(ComponentType, &'static str), Arc<dyn NanoCallback>>,
    actions: Arc<ActionRegistry>,
}

impl PlanDriver {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        principal: Principal,
        topology: Topology,
        actions: Arc<ActionRegistry>,
    ) -> Self {
        Self {
            store,
            principal,
            topology,
            callbacks: HashMap::new(),
            actions,
        }
    }

    /// Register the convergence callback for a (component type, state)
    pub fn register_callback(
        &mut self,
        kind: ComponentType,
        state: &'static str,
        callback: Arc<dyn NanoCallback>,
    ) {
        tracing::debug!(component_type = %kind, state, "Nano service callback registered");
        self.callbacks.insert((kind, state), callback);
    }

    pub async fn converge(&self, service: &ServiceId) -> NanoResult<ConvergeReport> {
        self.converge_at(service, Utc::now()).await
    }

    /// Walk the plan with `now` as the state-entry time
    pub async fn converge_at(
        &self,
        service: &ServiceId,
        now: DateTime<Utc>,
    ) -> NanoResult<ConvergeReport> {
        let mut report = ConvergeReport {
            service: service.clone(),
            reached: Vec::new(),
            failure: None,
            ready: false,
        };

        for step in &self.topology.steps {
            let status = with_read(self.store.as_ref(), &self.principal, |txn| {
                let record = txn.service(service)?;
                Ok(record
                    .plan
                    .state(&step.component, step.state)
                    .map(|s| s.status))
            })?;
            let Some(status) = status else {
                return Err(NanoError::Convergence {
                    component: step.component.to_string(),
                    state: step.state.to_string(),
                    message: "state missing from the service plan".to_string(),
                });
            };
            if status == StateStatus::Reached {
                continue;
            }

            if let Err(message) = self.enter(service, step, status, now).await {
                let label = step_label(step);
                tracing::warn!(
                    service = %service,
                    step = %label,
                    error = %message,
                    "Plan state failed"
                );
                self.mark_failed(service, step, &message, now)?;
                report.failure = Some(StepFailure {
                    step: label,
                    message,
                });
                return Ok(report);
            }
            report.reached.push(step_label(step));
            self.run_post_action(service, step).await;
        }

        report.ready = with_read(self.store.as_ref(), &self.principal, |txn| {
            Ok(txn.service(service)?.plan.is_ready())
        })?;
        if report.ready {
            tracing::info!(service = %service, "Plan ready");
        }
        Ok(report)
    }

    /// Pre-condition, callback, post-condition and the reached mark
    async fn enter(
        &self,
        service: &ServiceId,
        step: &PlanStep,
        status: StateStatus,
        now: DateTime<Utc>,
    ) -> Result<(), String> {
        if let Some(name) = step.wiring.pre_condition {
            self.condition(service, name).await?;
        }

        if step.wiring.create_callback {
            let callback = self
                .callbacks
                .get(&(step.component.kind, step.state))
                .ok_or_else(|| format!("no callback registered for {}", step_label(step)))?;
            with_write(self.store.as_ref(), &self.principal, |txn| {
                callback.create(
                    txn,
                    &CallbackContext {
                        service,
                        component: &step.component,
                        state: step.state,
                        status,
                    },
                )
            })
            .map_err(|e| e.to_action_message())?;
        }

        if let Some(name) = step.wiring.post_condition {
            self.condition(service, name).await?;
        }

        with_write(self.store.as_ref(), &self.principal, |txn| {
            let mut record = txn.service(service)?;
            if let Some(state) = record.plan.state_mut(&step.component, step.state) {
                state.status = StateStatus::Reached;
                state.when = Some(now);
                state.error = None;
            }
            if step.wiring.starts_sla {
                SlaMonitor::start(txn, &mut record, now)?;
            }
            txn.put_service(record)?;
            Ok(())
        })
        .map_err(|e| e.to_action_message())?;

        tracing::info!(
            service = %service,
            component = %step.component,
            state = step.state,
            "Plan state reached"
        );
        Ok(())
    }

    async fn condition(&self, service: &ServiceId, name: &str) -> Result<(), String> {
        let output = self.actions.call(&self.invocation(service, name)).await;
        if output.result {
            Ok(())
        } else {
            Err(format!("{name}: {}", output.msg))
        }
    }

    /// Run the step's post-action; its outcome is recorded, never fatal
    async fn run_post_action(&self, service: &ServiceId, step: &PlanStep) {
        let Some(name) = step.wiring.post_action else {
            return;
        };
        let output = self.actions.call(&self.invocation(service, name)).await;
        if !output.result {
            tracing::warn!(
                service = %service,
                action = name,
                msg = %output.msg,
                "Post-action failed"
            );
        }
        let recorded = with_write(self.store.as_ref(), &self.principal, |txn| {
            let mut record = txn.service(service)?;
            if let Some(state) = record.plan.state_mut(&step.component, step.state) {
                state.post_action = Some(PostActionStatus {
                    action: name.to_string(),
                    result: output.result,
                    msg: output.msg.clone(),
                });
            }
            txn.put_service(record)?;
            Ok(())
        });
        if let Err(e) = recorded {
            tracing::warn!(
                service = %service,
                action = name,
                error = %e,
                "Could not record post-action outcome"
            );
        }
    }

    fn mark_failed(
        &self,
        service: &ServiceId,
        step: &PlanStep,
        message: &str,
        now: DateTime<Utc>,
    ) -> NanoResult<()> {
        with_write(self.store.as_ref(), &self.principal, |txn| {
            let mut record = txn.service(service)?;
            if let Some(state) = record.plan.state_mut(&step.component, step.state) {
                state.status = StateStatus::Failed;
                state.when = Some(now);
                state.error = Some(message.to_string());
            }
            txn.put_service(record)?;
            Ok(())
        })
    }

    fn invocation(&self, service: &ServiceId, name: &str) -> ActionInvocation {
        ActionInvocation::new(
            self.principal.clone(),
            name,
            NodePath::ServiceAction {
                service: service.clone(),
                action: name.to_string(),
            },
        )
    }
}

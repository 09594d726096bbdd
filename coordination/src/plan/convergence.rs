//! Convergence callbacks: idempotent per-state configuration
//!
//! A callback is registered for a (component type, state) pair and applies a
//! config template against the service node. Running it again with the same
//! inputs reasserts the same desired state; template application merges
//! list entries instead of appending them.

use crate::error::{NanoError, NanoResult};
use crate::plan::types::{ComponentKey, StateStatus};
use crate::store::{NodePath, ServiceId, StoreError, Transaction, TransactionExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Template that renders the DNS resolver configuration
pub const NAME_SERVER_TEMPLATE: &str = "nano-name-server";

/// Errors raised while applying a config template
#[derive(Error, Debug)]
pub enum ApplyError {
    #[error("unknown config template '{0}'")]
    UnknownTemplate(String),

    #[error("template '{template}' requires variable '{name}'")]
    MissingVariable { template: String, name: String },

    #[error("template '{template}' got invalid value '{value}' for '{name}'")]
    InvalidValue {
        template: String,
        name: String,
        value: String,
    },

    #[error("template target {0} is not a service")]
    UnsupportedTarget(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Ordered template variables
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateVars(BTreeMap<String, String>);

impl TemplateVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    fn require(&self, template: &str, name: &str) -> Result<&str, ApplyError> {
        self.get(name).ok_or_else(|| ApplyError::MissingVariable {
            template: template.to_string(),
            name: name.to_string(),
        })
    }
}

/// Config-template engine applying named templates to a node
pub trait ConfigTemplates: Send + Sync {
    fn apply(
        &self,
        txn: &mut dyn Transaction,
        target: &NodePath,
        template: &str,
        vars: &TemplateVars,
    ) -> Result<(), ApplyError>;
}

/// Templates compiled into the crate
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinTemplates;

impl BuiltinTemplates {
    fn apply_name_server(
        txn: &mut dyn Transaction,
        service: &ServiceId,
        vars: &TemplateVars,
    ) -> Result<(), ApplyError> {
        let t = NAME_SERVER_TEMPLATE;
        let name_server = vars.require(t, "name-server")?;
        let domain_list = vars.require(t, "domain-list")?;
        let domain_name = vars.require(t, "domain-name")?;
        let lookup_raw = vars.require(t, "domain-name-lookup")?;
        let domain_lookup = match lookup_raw {
            "true" => true,
            "false" => false,
            other => {
                return Err(ApplyError::InvalidValue {
                    template: t.to_string(),
                    name: "domain-name-lookup".to_string(),
                    value: other.to_string(),
                })
            }
        };

        let mut record = txn.service(service)?;
        let resolver = record.resolver.get_or_insert_with(Default::default);
        if !resolver.name_servers.iter().any(|s| s == name_server) {
            resolver.name_servers.push(name_server.to_string());
        }
        if !resolver.domain_list.iter().any(|d| d == domain_list) {
            resolver.domain_list.push(domain_list.to_string());
        }
        resolver.domain_name = domain_name.to_string();
        resolver.domain_lookup = domain_lookup;
        txn.put_service(record)?;
        Ok(())
    }
}

impl ConfigTemplates for BuiltinTemplates {
    fn apply(
        &self,
        txn: &mut dyn Transaction,
        target: &NodePath,
        template: &str,
        vars: &TemplateVars,
    ) -> Result<(), ApplyError> {
        let NodePath::Service(service) = target else {
            return Err(ApplyError::UnsupportedTarget(target.to_string()));
        };
        match template {
            NAME_SERVER_TEMPLATE => Self::apply_name_server(txn, service, vars),
            other => Err(ApplyError::UnknownTemplate(other.to_string())),
        }
    }
}

/// What a callback sees of the state being entered
#[derive(Debug, Clone)]
pub struct CallbackContext<'a> {
    pub service: &'a ServiceId,
    pub component: &'a ComponentKey,
    pub state: &'a str,
    /// Status of the state before this attempt
    pub status: StateStatus,
}

/// Convergence action for one (component type, state)
pub trait NanoCallback: Send + Sync {
    fn create(&self, txn: &mut dyn Transaction, ctx: &CallbackContext<'_>) -> NanoResult<()>;
}

/// Pushes the resolver configuration for `name-server-cfg`
pub struct NameServerConvergence {
    templates: Arc<dyn ConfigTemplates>,
}

impl NameServerConvergence {
    pub fn new(templates: Arc<dyn ConfigTemplates>) -> Self {
        Self { templates }
    }
}

impl NanoCallback for NameServerConvergence {
    fn create(&self, txn: &mut dyn Transaction, ctx: &CallbackContext<'_>) -> NanoResult<()> {
        tracing::info!(
            service = %ctx.service,
            component = %ctx.component,
            state = ctx.state,
            status = %ctx.status,
            "Nano service callback invoked"
        );

        let fail = |message: String| NanoError::Convergence {
            component: ctx.component.to_string(),
            state: ctx.state.to_string(),
            message,
        };

        let record = txn.service(ctx.service).map_err(|e| fail(e.to_string()))?;
        let vars = TemplateVars::new()
            .with("name-server", record.name_server)
            .with("domain-list", "example.com")
            .with("domain-name", "example.com")
            .with("domain-name-lookup", "true");

        self.templates
            .apply(
                txn,
                &NodePath::Service(ctx.service.clone()),
                NAME_SERVER_TEMPLATE,
                &vars,
            )
            .map_err(|e| fail(e.to_string()))
    }
}

//! Plan Module: nano service plan state machine
//!
//! A service's plan is fixed at creation by [`types::Topology::nano`]. The
//! [`driver::PlanDriver`] walks it in order, calling convergence callbacks
//! from [`convergence`] and the gate/notification actions wired to each step.

pub mod convergence;
pub mod driver;
pub mod types;

pub use convergence::{
    ApplyError, BuiltinTemplates, CallbackContext, ConfigTemplates, NameServerConvergence,
    NanoCallback, TemplateVars, NAME_SERVER_TEMPLATE,
};
pub use driver::{ConvergeReport, PlanDriver, StepFailure};
pub use types::{
    states, ComponentKey, ComponentType, Plan, PlanComponent, PlanState, PlanStep,
    PostActionStatus, StateStatus, StepWiring, Topology,
};

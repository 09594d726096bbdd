//! Nano Service Coordination Library
//!
//! This library provides:
//! - A plan-driven state machine advancing a DNS resolver service through
//!   fixed components and states with idempotent convergence callbacks
//! - SLA progress monitoring: a singleton escalation policy kept in sync with
//!   operator timeouts by a watch trigger, plus per-service deadline tracking
//! - A verification gate running `show version` on the device before and
//!   after provisioning
//! - A notification dispatcher delivering Webex messages for plan and SLA
//!   events
//!
//! # Actions
//!
//! - `send-msg-action`: bound to `approval-requested` and `timeout-breach`
//! - `pre-test-action` / `post-test-action`: bound to `pre-test` / `post-test`
//! - `init-spm-action`: bound to `init-sla-policy`
//!
//! # Usage
//!
//! ```rust,ignore
//! use nano_coordination::{AppDeps, Application};
//!
//! let app = Application::setup(deps);
//! let id = ServiceId::new("svc-7")?;
//! app.create_service(&id, "ios0", "10.0.0.53")?;
//! let report = app.converge(&id).await?;
//! ```

pub mod actions;
pub mod app;
pub mod error;
pub mod notify;
pub mod plan;
pub mod sla;
pub mod store;
pub mod verifier;

pub use actions::{ActionInvocation, ActionOutput, ActionRegistry, ActionStatus};
pub use app::{AppDeps, Application};
pub use error::{ErrorCategory, NanoError, NanoResult};
pub use plan::{ConvergeReport, PlanDriver};
pub use store::{ConfigStore, MemoryStore, NodePath, Principal, ServiceId};
